//! Native SQLite callback registration for a single connection.
//!
//! This crate owns the unsafe edge between Rust closures and SQLite's
//! function-pointer-plus-context hook APIs:
//!
//! - busy handler (`sqlite3_busy_handler`)
//! - progress handler (`sqlite3_progress_handler`)
//! - commit, rollback and update hooks
//! - statement tracing (`sqlite3_trace_v2`)
//!
//! Each category holds at most one listener per connection. Installing a new
//! listener replaces the previous one, and installing `None` disables the
//! category. Listeners run synchronously on the thread driving the connection.
//! A listener may replace or remove listeners of its own connection while it
//! runs; [`CallbackScope`] keeps the replaced contexts alive until it returns.
//!
//! The crate also provides [`SqliteValue`], the owned form of a `sqlite3_value`
//! used when reading result columns.

pub mod error;
pub mod hooks;
pub mod scope;
pub mod value;

pub use error::Error;
pub use hooks::{
   BusyHandler, CommitHook, HookRegistry, ProgressHandler, RollbackHook, TraceEvent, TraceHook,
   TraceMask, UpdateEvent, UpdateHook, UpdateOperation,
};
pub use scope::{CallbackScope, ScopeGuard};
pub use value::SqliteValue;

pub type Result<T> = std::result::Result<T, Error>;
