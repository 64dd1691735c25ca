//! # sqlite-wrapper
//!
//! Owned, RAII-managed access to the SQLite C API.
//!
//! The workspace is split into three crates, re-exported here:
//!
//! - **`sqlite3-conn`**: [`Connection`], [`Statement`], [`ResultCode`], flags,
//!   status enums, busy-retry stepping, scalar SQL functions and the
//!   process-wide [`library`] functions
//! - **`sqlite3-hooks`**: native busy, progress, commit, rollback, update and
//!   trace callbacks
//! - **`sqlite3-toolkit`**: JSON parameter binding, row decoding and
//!   transactions through [`DatabaseWrapper`], layered over [`Statement`]
//!
//! ## Usage
//!
//! ```
//! use sqlite_wrapper::{Connection, Retry};
//!
//! # fn main() -> sqlite_wrapper::Result<()> {
//! let conn = Connection::open_in_memory()?;
//! conn.exec("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)")?;
//!
//! let mut stmt = conn.prepare("INSERT INTO kv VALUES (?, ?)")?;
//! stmt.bind(1, "answer")?.bind(2, 42)?;
//! stmt.step_with_retry(Retry::Times(3))?;
//!
//! let mut read = conn.prepare("SELECT v FROM kv WHERE k = ?")?;
//! read.bind(1, "answer")?;
//! assert!(read.step()?);
//! assert_eq!(read.int64("v"), 42);
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::{Error, Result};

pub use sqlite3_conn::library;
pub use sqlite3_conn::{
   ColumnIndex, ColumnMetadata, ColumnType, Config, Conflict, Connection, ConnectionConfig,
   DbConfig, DbStatus, ErrorCategory, FunctionFlags, Limit, OpenFlags, PrepareFlags, ResultCode, Retry, SqliteValue, Statement,
   StatementState, Status, StatusValue, StmtStatus, TextEncoding, ThreadSafety, TraceEvent,
   TraceMask, UpdateEvent, UpdateOperation, Value, backoff_delay,
};
pub use sqlite3_toolkit::{DatabaseWrapper, Row, WriteQueryResult, bind_json, decode};
