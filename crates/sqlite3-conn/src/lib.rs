//! # sqlite3-conn
//!
//! A thin, owned wrapper over the SQLite C API: one [`Connection`] per database
//! handle and one [`Statement`] per compiled SQL statement.
//!
//! ## Core Types
//!
//! - **[`Connection`]**: Opens, configures and closes a database handle; runs
//!   SQL scripts and transactions; installs hooks
//! - **[`Statement`]**: Binds parameters, steps with busy retry, reads columns
//! - **[`FunctionFlags`]**: Behaviour of scalar functions registered with
//!   [`Connection::create_scalar_function`]
//! - **[`ConnectionConfig`]**: Settings applied when a connection is opened
//! - **[`ResultCode`]**: Every primary and extended engine result code
//! - **[`Error`]**: Error type carrying the result code, message and SQL
//!
//! Process-wide information and settings (version, compile options, memory
//! counters, temp directory) live in [`library`].
//!
//! ## Usage
//!
//! ```
//! use sqlite3_conn::Connection;
//!
//! # fn main() -> sqlite3_conn::Result<()> {
//! let conn = Connection::open_in_memory()?;
//! conn.exec("CREATE TABLE users (name TEXT, age INTEGER)")?;
//!
//! let mut insert = conn.prepare("INSERT INTO users VALUES (?, ?)")?;
//! insert.bind(1, "Alice")?.bind(2, 30)?;
//! insert.step()?;
//!
//! let mut select = conn.prepare("SELECT name, age FROM users")?;
//! while select.step()? {
//!    assert_eq!(select.string("name"), "Alice");
//!    assert_eq!(select.int(1), 30);
//! }
//!
//! conn.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading
//!
//! Connections and statements are neither `Send` nor `Sync`. Open one
//! connection per thread; the engine's own locking coordinates between them,
//! and busy results are retried by [`Statement::step`].

mod codes;
mod config;
mod connection;
mod enums;
mod error;
mod flags;
mod function;
pub mod library;
mod options;
mod retry;
mod statement;
mod value;

// Re-export public types
pub use codes::ResultCode;
pub use config::ConnectionConfig;
pub use connection::{ColumnMetadata, Connection};
pub use enums::{
   Conflict, DbStatus, Limit, Status, StatusValue, StmtStatus, TextEncoding, ThreadSafety,
};
pub use error::{Error, ErrorCategory};
pub use flags::{FunctionFlags, OpenFlags, PrepareFlags};
pub use options::{Config, DbConfig};
pub use retry::{Retry, backoff_delay};
pub use statement::{ColumnIndex, Statement, StatementState};
pub use value::{ColumnType, SqliteValue, Value};

// Hook types accepted by the `Connection::set_*` methods
pub use sqlite3_hooks::{TraceEvent, TraceMask, UpdateEvent, UpdateOperation};

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
