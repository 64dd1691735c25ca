/// Result type alias for toolkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for toolkit operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from the connection or a statement.
   #[error(transparent)]
   Database(#[from] sqlite3_conn::Error),

   /// Column value that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// Multiple rows returned from a fetch_one query.
   #[error("fetch_one() query returned {0} rows, expected 0 or 1")]
   MultipleRowsReturned(usize),

   /// Transaction failed and rollback also failed.
   #[error("transaction failed: {transaction_error}; rollback also failed: {rollback_error}")]
   TransactionRollbackFailed {
      transaction_error: String,
      rollback_error: String,
   },

   /// I/O error when removing database files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// Database errors report the engine's result code name (`SQLITE_BUSY`,
   /// `SQLITE_CONSTRAINT_UNIQUE`, ...) or the wrapper's lifecycle code.
   pub fn error_code(&self) -> String {
      match self {
         Error::Database(e) => e.error_code(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::MultipleRowsReturned(_) => "MULTIPLE_ROWS_RETURNED".to_string(),
         Error::TransactionRollbackFailed { .. } => "TRANSACTION_ROLLBACK_FAILED".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_error_code_unsupported_datatype() {
      let err = Error::UnsupportedDatatype("WEIRD".into());
      assert_eq!(err.error_code(), "UNSUPPORTED_DATATYPE");
   }

   #[test]
   fn test_error_code_multiple_rows_returned() {
      let err = Error::MultipleRowsReturned(5);
      assert_eq!(err.error_code(), "MULTIPLE_ROWS_RETURNED");
      assert!(err.to_string().contains("5 rows"));
   }

   #[test]
   fn test_error_code_transaction_rollback_failed() {
      let err = Error::TransactionRollbackFailed {
         transaction_error: "constraint".into(),
         rollback_error: "busy".into(),
      };
      assert_eq!(err.error_code(), "TRANSACTION_ROLLBACK_FAILED");
      assert!(err.to_string().contains("constraint"));
      assert!(err.to_string().contains("busy"));
   }

   #[test]
   fn test_error_code_database_lifecycle() {
      let err = Error::from(sqlite3_conn::Error::ConnectionClosed);
      assert_eq!(err.error_code(), "CONNECTION_CLOSED");
   }

   #[test]
   fn test_error_code_database_result_code() {
      let err = Error::from(sqlite3_conn::Error::from_code(5));
      assert_eq!(err.error_code(), "SQLITE_BUSY");
      assert!(err.to_string().contains("database is locked"));
   }

   #[test]
   fn test_error_code_io() {
      let err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
      assert_eq!(err.error_code(), "IO_ERROR");
   }
}
