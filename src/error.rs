use serde::{Serialize, Serializer};

/// Result type alias for wrapper operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for host applications.
#[derive(Serialize)]
struct ErrorResponse {
   code: String,
   message: String,
}

/// Error types across the wrapper's layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from a connection or statement.
   #[error(transparent)]
   Connection(#[from] sqlite3_conn::Error),

   /// Error registering a native hook.
   #[error(transparent)]
   Hook(#[from] sqlite3_hooks::Error),

   /// Error from the JSON toolkit.
   #[error(transparent)]
   Toolkit(#[from] sqlite3_toolkit::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes such as `SQLITE_BUSY` or
   /// `STATEMENT_FINALIZED`.
   pub fn error_code(&self) -> String {
      match self {
         Error::Connection(e) => e.error_code(),
         Error::Hook(_) => "HOOK_ERROR".to_string(),
         Error::Toolkit(e) => e.error_code(),
      }
   }
}

impl Serialize for Error {
   fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
   where
      S: Serializer,
   {
      let response = ErrorResponse {
         code: self.error_code(),
         message: self.to_string(),
      };
      response.serialize(serializer)
   }
}
