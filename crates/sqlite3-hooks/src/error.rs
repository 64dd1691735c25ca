//! Error types for the sqlite3-hooks crate.

/// Errors that can occur while installing or removing native hooks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// SQLite rejected the hook registration.
   #[error("Hook registration failed: {0}")]
   HookRegistration(String),
}
