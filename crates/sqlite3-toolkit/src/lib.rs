//! High-level SQLite toolkit providing JSON binding, row decoding and transactions.
//!
//! This crate sits between the low-level wrapper (`sqlite3-conn`) and
//! application-level code. It provides:
//!
//! - [`DatabaseWrapper`]: main entry point wrapping a [`Connection`]
//! - JSON parameter binding ([`bind_json`]) and row decoding ([`decode::to_json`])
//! - Atomic batches through [`DatabaseWrapper::execute_transaction`]
//!
//! # Example
//!
//! ```no_run
//! use sqlite3_toolkit::DatabaseWrapper;
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseWrapper::open("mydb.db", None)?;
//!
//! // Write
//! db.execute("INSERT INTO users (name) VALUES (?)", vec![json!("Alice")])?;
//!
//! // Read
//! let rows = db.fetch_all("SELECT * FROM users", vec![])?;
//!
//! // Transaction
//! let results = db.execute_transaction(vec![
//!    ("INSERT INTO users (name) VALUES (?)", vec![json!("Bob")]),
//!    ("INSERT INTO users (name) VALUES (?)", vec![json!("Charlie")]),
//! ])?;
//!
//! db.close()?;
//! # Ok(())
//! # }
//! ```

pub mod decode;
pub mod error;
pub mod wrapper;

pub use error::{Error, Result};
pub use wrapper::{DatabaseWrapper, Row, WriteQueryResult, bind_json};

// Re-export commonly used types from dependencies
pub use sqlite3_conn::{Connection, ConnectionConfig, OpenFlags};
