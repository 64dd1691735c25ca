//! Tests for JSON queries and atomic transactions.

use serde_json::json;
use sqlite3_toolkit::{DatabaseWrapper, Error};
use tempfile::TempDir;

fn create_test_db(name: &str) -> (DatabaseWrapper, TempDir) {
   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let db_path = temp_dir.path().join(name);
   let wrapper = DatabaseWrapper::open(&db_path, None).expect("Failed to open test database");

   wrapper
      .execute(
         "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT UNIQUE, balance INTEGER)",
         vec![],
      )
      .unwrap();

   (wrapper, temp_dir)
}

fn balances(db: &DatabaseWrapper) -> Vec<(String, i64)> {
   db.fetch_all("SELECT owner, balance FROM accounts ORDER BY id", vec![])
      .unwrap()
      .into_iter()
      .map(|row| {
         (
            row["owner"].as_str().unwrap().to_string(),
            row["balance"].as_i64().unwrap(),
         )
      })
      .collect()
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn test_transaction_commits_all_statements() {
   let (db, _temp) = create_test_db("commit.db");

   let results = db
      .execute_transaction(vec![
         ("INSERT INTO accounts (owner, balance) VALUES (?, ?)", vec![json!("ann"), json!(10)]),
         ("INSERT INTO accounts (owner, balance) VALUES (?, ?)", vec![json!("ben"), json!(5)]),
         ("UPDATE accounts SET balance = balance + 1", vec![]),
      ])
      .unwrap();

   let affected: Vec<_> = results.iter().map(|r| r.rows_affected).collect();
   assert_eq!(affected, vec![1, 1, 2]);
   assert_eq!(results[1].last_insert_id, 2);
   assert_eq!(balances(&db), vec![("ann".to_string(), 11), ("ben".to_string(), 6)]);
   assert!(db.connection().is_autocommit().unwrap());
}

#[test]
fn test_transaction_rolls_back_on_failure() {
   let (db, _temp) = create_test_db("rollback.db");
   db.execute(
      "INSERT INTO accounts (owner, balance) VALUES ('ann', 10)",
      vec![],
   )
   .unwrap();

   let err = db
      .execute_transaction(vec![
         ("UPDATE accounts SET balance = 0", vec![]),
         ("INSERT INTO accounts (owner, balance) VALUES ('ann', 1)", vec![]),
      ])
      .unwrap_err();

   assert!(matches!(err, Error::Database(_)));
   assert!(err.error_code().starts_with("SQLITE_CONSTRAINT"));
   assert_eq!(balances(&db), vec![("ann".to_string(), 10)]);
   assert!(db.connection().is_autocommit().unwrap());
}

#[test]
fn test_transaction_inside_open_transaction_fails_cleanly() {
   let (db, _temp) = create_test_db("nested.db");
   db.connection().begin().unwrap();

   let err = db
      .execute_transaction(vec![("INSERT INTO accounts (owner) VALUES ('x')", vec![])])
      .unwrap_err();
   assert_eq!(err.error_code(), "SQLITE_ERROR");

   // The outer transaction is untouched
   assert!(!db.connection().is_autocommit().unwrap());
   db.connection().rollback().unwrap();
}

// ============================================================================
// Fetching
// ============================================================================

#[test]
fn test_fetch_one() {
   let (db, _temp) = create_test_db("fetch.db");
   db.execute(
      "INSERT INTO accounts (owner, balance) VALUES ('ann', 1), ('ben', 2)",
      vec![],
   )
   .unwrap();

   let row = db
      .fetch_one("SELECT owner FROM accounts WHERE balance = ?", vec![json!(2)])
      .unwrap()
      .unwrap();
   assert_eq!(row["owner"], json!("ben"));

   let none = db
      .fetch_one("SELECT owner FROM accounts WHERE balance = ?", vec![json!(3)])
      .unwrap();
   assert!(none.is_none());

   let err = db
      .fetch_one("SELECT owner FROM accounts", vec![])
      .unwrap_err();
   assert!(matches!(err, Error::MultipleRowsReturned(2)));
}

#[test]
fn test_rows_keep_column_order() {
   let (db, _temp) = create_test_db("order.db");
   db.execute(
      "INSERT INTO accounts (owner, balance) VALUES ('ann', 1)",
      vec![],
   )
   .unwrap();

   let rows = db
      .fetch_all("SELECT balance, owner, id FROM accounts", vec![])
      .unwrap();
   let keys: Vec<_> = rows[0].keys().cloned().collect();
   assert_eq!(keys, vec!["balance", "owner", "id"]);
}

#[test]
fn test_remove_deletes_database_file() {
   let (db, temp) = create_test_db("remove.db");
   let path = temp.path().join("remove.db");
   assert!(path.exists());

   db.remove().unwrap();
   assert!(!path.exists());
}
