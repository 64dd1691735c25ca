use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlite3_conn::{Connection, ConnectionConfig, Statement, Value};
use tracing::{debug, error};

use crate::Error;

/// A decoded result row: column name to JSON value, in column order.
pub type Row = IndexMap<String, JsonValue>;

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   ///
   /// Zero for statements that change no rows, including DDL.
   pub rows_affected: u64,
   /// The last inserted row ID (SQLite ROWID).
   ///
   /// Only set for INSERT operations on tables with a ROWID.
   /// Tables created with `WITHOUT ROWID` will not set this value.
   pub last_insert_id: i64,
}

/// Wrapper around a [`Connection`] that speaks JSON.
///
/// Parameters are bound from `serde_json` values and rows come back as ordered
/// maps of column name to JSON value.
#[derive(Debug)]
pub struct DatabaseWrapper {
   conn: Connection,
   path: PathBuf,
}

impl DatabaseWrapper {
   /// Open (creating if needed) the database at `path`.
   ///
   /// # Examples
   ///
   /// ```no_run
   /// use sqlite3_toolkit::DatabaseWrapper;
   ///
   /// # fn example() -> sqlite3_toolkit::Result<()> {
   /// let db = DatabaseWrapper::open("app.db", None)?;
   /// # Ok(())
   /// # }
   /// ```
   pub fn open(path: impl AsRef<Path>, custom_config: Option<ConnectionConfig>) -> Result<Self, Error> {
      let path = path.as_ref().to_path_buf();
      let config = custom_config.unwrap_or_default();
      let conn = Connection::open_with_config(&path, &config)?;
      Ok(Self { conn, path })
   }

   pub fn open_in_memory() -> Result<Self, Error> {
      Self::open(":memory:", None)
   }

   /// The underlying connection, for statement-level work.
   pub fn connection(&self) -> &Connection {
      &self.conn
   }

   /// Execute a write query (INSERT, UPDATE, DELETE, DDL).
   ///
   /// Result rows, if any, are stepped through and discarded.
   ///
   /// # Examples
   ///
   /// ```no_run
   /// # fn example(db: &sqlite3_toolkit::DatabaseWrapper) -> sqlite3_toolkit::Result<()> {
   /// use serde_json::json;
   ///
   /// let result = db.execute("INSERT INTO users (name) VALUES (?)", vec![json!("Alice")])?;
   /// println!("Inserted row {}", result.last_insert_id);
   /// # Ok(())
   /// # }
   /// ```
   pub fn execute(&self, query: &str, values: Vec<JsonValue>) -> Result<WriteQueryResult, Error> {
      let before = self.conn.total_changes()?;

      let mut stmt = self.prepare_bound(query, values)?;
      while stmt.step()? {}
      stmt.finalize()?;

      // changes() keeps the count of the last DML statement, so a statement
      // that changed nothing has to be detected through the running total.
      let rows_affected = if self.conn.total_changes()? == before {
         0
      } else {
         self.conn.changes()?.max(0) as u64
      };

      Ok(WriteQueryResult {
         rows_affected,
         last_insert_id: self.conn.last_insert_rowid()?,
      })
   }

   /// Execute multiple statements atomically within a transaction.
   ///
   /// The transaction starts with `BEGIN IMMEDIATE`. All statements either
   /// succeed together or fail together.
   ///
   /// # Examples
   ///
   /// ```no_run
   /// # fn example(db: &sqlite3_toolkit::DatabaseWrapper) -> sqlite3_toolkit::Result<()> {
   /// use serde_json::json;
   ///
   /// let results = db.execute_transaction(vec![
   ///     ("INSERT INTO users (name) VALUES (?)", vec![json!("Alice")]),
   ///     ("INSERT INTO users (name) VALUES (?)", vec![json!("Bob")]),
   /// ])?;
   ///
   /// println!("Inserted {} rows total", results.len());
   /// # Ok(())
   /// # }
   /// ```
   pub fn execute_transaction(
      &self,
      statements: Vec<(&str, Vec<JsonValue>)>,
   ) -> Result<Vec<WriteQueryResult>, Error> {
      self.conn.exec("BEGIN IMMEDIATE")?;

      let exec_result = statements
         .into_iter()
         .map(|(query, values)| self.execute(query, values))
         .collect::<Result<Vec<_>, Error>>()
         .and_then(|results| {
            self.conn.commit()?;
            Ok(results)
         });

      match exec_result {
         Ok(results) => {
            debug!(statements = results.len(), "Transaction committed");
            Ok(results)
         }
         Err(e) => {
            // A failed COMMIT can leave the transaction open; a failed
            // statement always does.
            if self.conn.is_autocommit()? {
               return Err(e);
            }
            if let Err(rollback_err) = self.conn.rollback() {
               error!("rollback failed after transaction error: {}", rollback_err);
               return Err(Error::TransactionRollbackFailed {
                  transaction_error: e.to_string(),
                  rollback_error: rollback_err.to_string(),
               });
            }
            Err(e)
         }
      }
   }

   /// Run a SELECT query and decode every row.
   ///
   /// # Examples
   ///
   /// ```no_run
   /// # fn example(db: &sqlite3_toolkit::DatabaseWrapper) -> sqlite3_toolkit::Result<()> {
   /// let rows = db.fetch_all(
   ///     "SELECT name, age FROM users WHERE age > ?",
   ///     vec![serde_json::json!(21)],
   /// )?;
   ///
   /// for row in &rows {
   ///     println!("{}: {}", row["name"], row["age"]);
   /// }
   /// # Ok(())
   /// # }
   /// ```
   pub fn fetch_all(&self, query: &str, values: Vec<JsonValue>) -> Result<Vec<Row>, Error> {
      let mut stmt = self.prepare_bound(query, values)?;

      let mut results = Vec::new();
      while stmt.step()? {
         let mut row = Row::default();
         for (i, column) in stmt.columns().iter().enumerate() {
            let v = crate::decode::to_json(&stmt, i)?;
            row.insert(column.clone(), v);
         }
         results.push(row);
      }

      Ok(results)
   }

   /// Run a SELECT query expected to return zero or one row.
   ///
   /// Fails with [`Error::MultipleRowsReturned`] if more than one row comes back.
   pub fn fetch_one(&self, query: &str, values: Vec<JsonValue>) -> Result<Option<Row>, Error> {
      let mut rows = self.fetch_all(query, values)?;
      match rows.len() {
         0 | 1 => Ok(rows.pop()),
         n => Err(Error::MultipleRowsReturned(n)),
      }
   }

   fn prepare_bound(&self, query: &str, values: Vec<JsonValue>) -> Result<Statement, Error> {
      let mut stmt = self.conn.prepare(query)?;
      let values: Vec<Option<Value>> = values.into_iter().map(json_to_value).collect();
      stmt.bind_all(&values)?;
      Ok(stmt)
   }

   /// Close the connection.
   pub fn close(self) -> Result<(), Error> {
      self.conn.close()?;
      Ok(())
   }

   /// Close the connection and delete the database file with its journal,
   /// WAL and shared-memory files.
   pub fn remove(self) -> Result<(), Error> {
      self.conn.close()?;

      for suffix in ["", "-journal", "-wal", "-shm"] {
         let mut file = self.path.clone().into_os_string();
         file.push(suffix);
         match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
         }
      }
      Ok(())
   }
}

/// Bind a JSON value to the 1-based parameter `index`.
///
/// Strings bind as TEXT, booleans as 0/1, integers as INTEGER (unsigned values
/// above `i64::MAX` as REAL) and other numbers as REAL. Arrays and objects are
/// bound as their JSON text.
pub fn bind_json(stmt: &mut Statement, index: usize, value: JsonValue) -> Result<(), Error> {
   match json_to_value(value) {
      Some(v) => stmt.bind_value(index, &v)?,
      None => stmt.bind_value(index, &Value::Null)?,
   };
   Ok(())
}

fn json_to_value(value: JsonValue) -> Option<Value> {
   match value {
      JsonValue::Null => None,
      JsonValue::Bool(b) => Some(Value::Bool(b)),
      JsonValue::String(s) => Some(Value::Text(s)),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            Some(Value::Integer(int_val))
         } else if let Some(uint_val) = number.as_u64() {
            // Value too large for i64, use f64 (will lose precision)
            Some(Value::Real(uint_val as f64))
         } else {
            Some(Value::Real(number.as_f64().unwrap_or_default()))
         }
      }
      other => Some(Value::Text(other.to_string())),
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   #[test]
   fn test_json_to_value() {
      assert_eq!(json_to_value(json!(null)), None);
      assert_eq!(json_to_value(json!(true)), Some(Value::Bool(true)));
      assert_eq!(json_to_value(json!(-7)), Some(Value::Integer(-7)));
      assert_eq!(json_to_value(json!(2.5)), Some(Value::Real(2.5)));
      assert_eq!(json_to_value(json!("s")), Some(Value::Text("s".into())));
      assert_eq!(
         json_to_value(json!(u64::MAX)),
         Some(Value::Real(u64::MAX as f64))
      );
      assert_eq!(
         json_to_value(json!({"a": [1, 2]})),
         Some(Value::Text(r#"{"a":[1,2]}"#.into()))
      );
   }

   #[test]
   fn test_bind_json_by_index() {
      let conn = Connection::open_in_memory().unwrap();
      let mut stmt = conn.prepare("SELECT ?, ?").unwrap();
      bind_json(&mut stmt, 1, json!("x")).unwrap();
      bind_json(&mut stmt, 2, json!(null)).unwrap();
      assert!(stmt.step().unwrap());
      assert_eq!(stmt.string(0), "x");
      assert_eq!(stmt.optional_string(1), None);
   }

   #[test]
   fn test_execute_counts_only_changed_rows() {
      let db = DatabaseWrapper::open_in_memory().unwrap();
      let created = db
         .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", vec![])
         .unwrap();
      assert_eq!(created.rows_affected, 0);

      let inserted = db
         .execute("INSERT INTO t (name) VALUES (?), (?)", vec![json!("a"), json!("b")])
         .unwrap();
      assert_eq!(inserted, WriteQueryResult { rows_affected: 2, last_insert_id: 2 });

      // A no-op UPDATE must not report the previous INSERT's count
      let updated = db
         .execute("UPDATE t SET name = 'z' WHERE id > 99", vec![])
         .unwrap();
      assert_eq!(updated.rows_affected, 0);
   }

   #[test]
   fn test_bind_count_mismatch() {
      let db = DatabaseWrapper::open_in_memory().unwrap();
      let err = db.fetch_all("SELECT ?", vec![]).unwrap_err();
      assert_eq!(err.error_code(), "BIND_COUNT_MISMATCH");
   }
}
