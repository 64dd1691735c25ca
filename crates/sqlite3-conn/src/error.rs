//! Error types for sqlite3-conn

use std::ffi::{CStr, NulError, c_int};

use libsqlite3_sys::{sqlite3, sqlite3_errmsg, sqlite3_errstr};
use thiserror::Error;

use crate::codes::ResultCode;

/// Broad classes of failure, used to decide whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
   /// Busy or locked. Retried by `Statement::step` and surfaced only after the
   /// retry budget is spent.
   Transient,
   /// Corruption, schema changes, misuse, constraint violations and every
   /// other engine failure. Never retried.
   Structural,
   /// Caller programming errors: use after finalize or close, bad bind counts
   /// and out-of-range indices.
   Lifecycle,
   /// Notices and warnings. Informational only.
   Advisory,
}

/// Errors that may occur when working with sqlite3-conn
#[derive(Error, Debug)]
pub enum Error {
   /// The engine returned a failure code. `sql` holds the expanded statement
   /// text when the failure came from a prepared statement.
   #[error("{code}: {message}{}", sql_suffix(.sql))]
   Sqlite {
      code: ResultCode,
      message: String,
      sql: Option<String>,
   },

   /// The database could not be opened. No connection was created.
   #[error("Cannot open database '{path}': {code}: {message}")]
   Open {
      path: String,
      code: ResultCode,
      message: String,
   },

   /// The statement has been finalized and cannot be used
   #[error("Statement has been finalized")]
   StatementFinalized,

   /// The owning connection has been closed
   #[error("Connection has been closed")]
   ConnectionClosed,

   /// Bulk bind received the wrong number of values
   #[error("Statement expects {expected} bind parameters, got {actual}")]
   BindCount { expected: usize, actual: usize },

   /// Text passed to the engine contained an interior NUL byte
   #[error("Invalid string argument: {0}")]
   InvalidString(#[from] NulError),

   /// A process-wide setting was changed while connections were open
   #[error("Cannot change process-wide setting while {0} connection(s) are open")]
   ConnectionsOpen(usize),

   /// Installing a native hook failed
   #[error(transparent)]
   Hook(#[from] sqlite3_hooks::Error),
}

fn sql_suffix(sql: &Option<String>) -> String {
   match sql {
      Some(sql) => format!(" (sql: {sql})"),
      None => String::new(),
   }
}

impl Error {
   /// Builds an engine error from a bare result code, using the engine's
   /// generic description of the code as the message.
   pub fn from_code(code: c_int) -> Self {
      Error::Sqlite {
         code: ResultCode::from_code(code),
         message: crate::library::error_string(code),
         sql: None,
      }
   }

   /// Builds an engine error from the connection's most recent error message.
   ///
   /// # Safety
   ///
   /// `db` must be null or a valid sqlite3 connection.
   pub(crate) unsafe fn from_handle(db: *mut sqlite3, code: c_int, sql: Option<String>) -> Self {
      let message = if db.is_null() {
         unsafe { c_message(sqlite3_errstr(code)) }
      } else {
         unsafe { c_message(sqlite3_errmsg(db)) }
      };

      Error::Sqlite {
         code: ResultCode::from_code(code),
         message,
         sql,
      }
   }

   /// The engine result code behind this error, if any.
   pub fn result_code(&self) -> Option<ResultCode> {
      match self {
         Error::Sqlite { code, .. } | Error::Open { code, .. } => Some(*code),
         _ => None,
      }
   }

   /// True for busy and locked failures, including their extended codes.
   pub fn is_busy(&self) -> bool {
      self.result_code().is_some_and(ResultCode::is_busy_class)
   }

   pub fn category(&self) -> ErrorCategory {
      match self {
         Error::Sqlite { code, .. } | Error::Open { code, .. } => code.category(),
         Error::StatementFinalized
         | Error::ConnectionClosed
         | Error::BindCount { .. }
         | Error::InvalidString(_)
         | Error::ConnectionsOpen(_) => ErrorCategory::Lifecycle,
         Error::Hook(_) => ErrorCategory::Structural,
      }
   }

   /// Extract a structured error code from the error type.
   ///
   /// Engine failures report the engine's symbolic name (`SQLITE_BUSY`,
   /// `SQLITE_CONSTRAINT_UNIQUE`, ...).
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlite { code, .. } | Error::Open { code, .. } => code.to_string(),
         Error::StatementFinalized => "STATEMENT_FINALIZED".to_string(),
         Error::ConnectionClosed => "CONNECTION_CLOSED".to_string(),
         Error::BindCount { .. } => "BIND_COUNT_MISMATCH".to_string(),
         Error::InvalidString(_) => "INVALID_STRING".to_string(),
         Error::ConnectionsOpen(_) => "CONNECTIONS_OPEN".to_string(),
         Error::Hook(_) => "HOOK_ERROR".to_string(),
      }
   }
}

/// Copies an engine-owned message.
///
/// # Safety
///
/// `ptr` must be null or a valid NUL-terminated string.
pub(crate) unsafe fn c_message(ptr: *const std::ffi::c_char) -> String {
   if ptr.is_null() {
      return String::new();
   }
   unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}
