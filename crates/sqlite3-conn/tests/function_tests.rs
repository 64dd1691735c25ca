//! Integration tests for scalar SQL functions and column metadata.
//!
//! Tests verify:
//! - Arguments arrive as typed values and results map back to storage classes
//! - Errors and panics inside a function fail the calling statement
//! - Function closures are released on replacement, removal and close
//! - Declared column types and constraints are reported per column

use std::cell::RefCell;
use std::rc::Rc;

use sqlite3_conn::{
   ColumnMetadata, ColumnType, Connection, Error, FunctionFlags, ResultCode, SqliteValue, Value,
};

fn query_value(conn: &Connection, sql: &str) -> SqliteValue {
   let mut stmt = conn.prepare(sql).unwrap();
   assert!(stmt.step().unwrap());
   stmt.value(0)
}

// ============================================================================
// Scalar Functions
// ============================================================================

#[test]
fn test_scalar_function_receives_and_returns_values() {
   let conn = Connection::open_in_memory().unwrap();
   conn
      .create_scalar_function("double_it", 1, FunctionFlags::DETERMINISTIC, |args| {
         Ok(match &args[0] {
            SqliteValue::Integer(i) => Value::Integer(i * 2),
            SqliteValue::Real(r) => Value::Real(r * 2.0),
            SqliteValue::Text(s) => Value::Text(s.repeat(2)),
            SqliteValue::Blob(b) => Value::ZeroBlob(b.len() as u64 * 2),
            SqliteValue::Null => Value::Null,
         })
      })
      .unwrap();

   assert_eq!(query_value(&conn, "SELECT double_it(21)"), SqliteValue::Integer(42));
   assert_eq!(query_value(&conn, "SELECT double_it(1.25)"), SqliteValue::Real(2.5));
   assert_eq!(
      query_value(&conn, "SELECT double_it('ab')"),
      SqliteValue::Text("abab".into())
   );
   assert_eq!(
      query_value(&conn, "SELECT double_it(x'0102')"),
      SqliteValue::Blob(vec![0; 4])
   );
   assert_eq!(query_value(&conn, "SELECT double_it(NULL)"), SqliteValue::Null);

   let mut stmt = conn.prepare("SELECT double_it(5) AS v").unwrap();
   assert!(stmt.step().unwrap());
   assert_eq!(stmt.column_type(0), Some(ColumnType::Integer));
   assert_eq!(stmt.int("v"), 10);
}

#[test]
fn test_variadic_function_and_bool_results() {
   let conn = Connection::open_in_memory().unwrap();
   conn
      .create_scalar_function("all_text", -1, FunctionFlags::empty(), |args| {
         Ok(Value::Bool(args.iter().all(|a| a.as_text().is_some())))
      })
      .unwrap();

   assert_eq!(query_value(&conn, "SELECT all_text()"), SqliteValue::Integer(1));
   assert_eq!(
      query_value(&conn, "SELECT all_text('a', 'b', 'c')"),
      SqliteValue::Integer(1)
   );
   assert_eq!(query_value(&conn, "SELECT all_text('a', 2)"), SqliteValue::Integer(0));
}

#[test]
fn test_wrong_argument_count_fails_at_prepare() {
   let conn = Connection::open_in_memory().unwrap();
   conn
      .create_scalar_function("one_arg", 1, FunctionFlags::empty(), |_| Ok(Value::Null))
      .unwrap();

   let err = conn.prepare("SELECT one_arg(1, 2)").unwrap_err();
   assert_eq!(err.result_code(), Some(ResultCode::Error));
   assert!(err.to_string().contains("wrong number of arguments"));
}

#[test]
fn test_function_error_fails_the_statement() {
   let conn = Connection::open_in_memory().unwrap();
   conn
      .create_scalar_function("reject", 1, FunctionFlags::empty(), |args| {
         Err(Error::Sqlite {
            code: ResultCode::Constraint,
            message: format!("value {} rejected", args[0].as_integer().unwrap_or(-1)),
            sql: None,
         })
      })
      .unwrap();

   let mut stmt = conn.prepare("SELECT reject(7)").unwrap();
   let err = stmt.step().unwrap_err();
   assert_eq!(err.result_code(), Some(ResultCode::Constraint));
   assert!(err.to_string().contains("value 7 rejected"));

   // The statement can run again once reset
   stmt.reset().unwrap();
   assert!(stmt.step().is_err());
}

#[test]
fn test_function_panic_is_absorbed() {
   let conn = Connection::open_in_memory().unwrap();
   conn
      .create_scalar_function("explode", 0, FunctionFlags::empty(), |_| {
         if true {
            panic!("boom");
         }
         Ok(Value::Null)
      })
      .unwrap();

   let err = conn.exec("SELECT explode()").unwrap_err();
   assert_eq!(err.result_code(), Some(ResultCode::Error));
   assert!(err.to_string().contains("panicked"));

   // The connection stays usable
   assert_eq!(query_value(&conn, "SELECT 1"), SqliteValue::Integer(1));
}

#[test]
fn test_function_closure_released_on_replace_remove_and_close() {
   let conn = Connection::open_in_memory().unwrap();
   let token = Rc::new(());

   let held = Rc::clone(&token);
   conn
      .create_scalar_function("answer", 0, FunctionFlags::empty(), move |_| {
         let _ = Rc::strong_count(&held);
         Ok(Value::Integer(1))
      })
      .unwrap();
   assert_eq!(Rc::strong_count(&token), 2);

   let held = Rc::clone(&token);
   conn
      .create_scalar_function("answer", 0, FunctionFlags::empty(), move |_| {
         let _ = Rc::strong_count(&held);
         Ok(Value::Integer(42))
      })
      .unwrap();
   assert_eq!(Rc::strong_count(&token), 2);
   assert_eq!(query_value(&conn, "SELECT answer()"), SqliteValue::Integer(42));

   conn.remove_function("answer", 0).unwrap();
   assert_eq!(Rc::strong_count(&token), 1);
   let err = conn.prepare("SELECT answer()").unwrap_err();
   assert!(err.to_string().contains("no such function"));

   let held = Rc::clone(&token);
   conn
      .create_scalar_function("answer", 0, FunctionFlags::empty(), move |_| {
         let _ = Rc::strong_count(&held);
         Ok(Value::Null)
      })
      .unwrap();
   assert_eq!(Rc::strong_count(&token), 2);
   conn.close().unwrap();
   assert_eq!(Rc::strong_count(&token), 1);
}

#[test]
fn test_function_cannot_redefine_itself_while_running() {
   let conn = Rc::new(Connection::open_in_memory().unwrap());
   let handle = Rc::downgrade(&conn);
   let attempts = Rc::new(RefCell::new(Vec::new()));
   let sink = Rc::clone(&attempts);

   conn
      .create_scalar_function("counter", 0, FunctionFlags::empty(), move |_| {
         if let Some(conn) = handle.upgrade() {
            let outcome = conn.create_scalar_function(
               "counter",
               0,
               FunctionFlags::empty(),
               |_| Ok(Value::Integer(2)),
            );
            sink.borrow_mut().push(outcome.map_err(|e| e.result_code()));
         }
         Ok(Value::Integer(1))
      })
      .unwrap();

   assert_eq!(query_value(&conn, "SELECT counter()"), SqliteValue::Integer(1));
   assert_eq!(*attempts.borrow(), vec![Err(Some(ResultCode::Busy))]);
   assert_eq!(query_value(&conn, "SELECT counter()"), SqliteValue::Integer(1));
}

#[test]
fn test_create_function_after_close_fails() {
   let conn = Connection::open_in_memory().unwrap();
   conn.close().unwrap();
   let err = conn
      .create_scalar_function("late", 0, FunctionFlags::empty(), |_| Ok(Value::Null))
      .unwrap_err();
   assert!(matches!(err, Error::ConnectionClosed));
}

// ============================================================================
// Column Metadata
// ============================================================================

#[test]
fn test_table_column_metadata() {
   let conn = Connection::open_in_memory().unwrap();
   conn
      .exec(
         "CREATE TABLE notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL COLLATE NOCASE,
            body
         )",
      )
      .unwrap();

   assert_eq!(
      conn.table_column_metadata(None, "notes", "id").unwrap(),
      ColumnMetadata {
         data_type: Some("INTEGER".into()),
         collation: Some("BINARY".into()),
         not_null: false,
         primary_key: true,
         autoincrement: true,
      }
   );
   assert_eq!(
      conn.table_column_metadata(Some("main"), "notes", "title").unwrap(),
      ColumnMetadata {
         data_type: Some("TEXT".into()),
         collation: Some("NOCASE".into()),
         not_null: true,
         primary_key: false,
         autoincrement: false,
      }
   );

   let body = conn.table_column_metadata(None, "notes", "body").unwrap();
   assert_eq!(body.data_type, None);
   assert_eq!(body.collation.as_deref(), Some("BINARY"));
}

#[test]
fn test_table_column_metadata_for_missing_column() {
   let conn = Connection::open_in_memory().unwrap();
   conn.exec("CREATE TABLE notes (title TEXT)").unwrap();

   let err = conn
      .table_column_metadata(None, "notes", "missing")
      .unwrap_err();
   assert_eq!(err.result_code(), Some(ResultCode::Error));
   assert!(err.to_string().contains("no such table column"));

   let err = conn
      .table_column_metadata(None, "missing", "title")
      .unwrap_err();
   assert_eq!(err.result_code(), Some(ResultCode::Error));
}
