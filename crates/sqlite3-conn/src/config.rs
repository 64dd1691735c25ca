//! Configuration for opening a SQLite connection

use serde::{Deserialize, Serialize};

use crate::flags::{OpenFlags, PrepareFlags};

/// Configuration applied when a [`Connection`](crate::Connection) is opened
///
/// # Examples
///
/// ```
/// use sqlite3_conn::{ConnectionConfig, OpenFlags};
///
/// // Use defaults
/// let config = ConnectionConfig::default();
///
/// // Customize specific fields
/// let config = ConnectionConfig::default()
///    .with_busy_retry_max(3)
///    .with_busy_timeout_ms(250);
///
/// // Override just one field
/// let config = ConnectionConfig {
///    flags: OpenFlags::READONLY,
///    ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
   /// Flags passed to `sqlite3_open_v2`
   ///
   /// Default: `READWRITE | CREATE`
   pub flags: OpenFlags,

   /// Busy retries used by `Statement::step` when no explicit count is given
   ///
   /// Zero behaves like one: the step is attempted once and not retried.
   ///
   /// Default: 10
   pub busy_retry_max: u32,

   /// Engine-level busy timeout in milliseconds (`sqlite3_busy_timeout`)
   ///
   /// The engine sleeps inside the lock attempt itself for up to this long
   /// before reporting busy. Zero leaves it disabled, so busy results are
   /// handled only by the statement retry loop.
   ///
   /// Default: 0
   pub busy_timeout_ms: u32,

   /// Report extended result codes (`SQLITE_BUSY_TIMEOUT` rather than
   /// `SQLITE_BUSY`, etc.)
   ///
   /// Default: false
   pub extended_result_codes: bool,

   /// Name of the VFS module to open the database with
   ///
   /// Default: None (the engine's default VFS)
   pub vfs: Option<String>,

   /// Flags used by `Connection::prepare`
   ///
   /// Default: `PERSISTENT | NORMALIZE`
   pub prepare_flags: PrepareFlags,
}

impl Default for ConnectionConfig {
   fn default() -> Self {
      Self {
         flags: OpenFlags::default(),
         busy_retry_max: 10,
         busy_timeout_ms: 0,
         extended_result_codes: false,
         vfs: None,
         prepare_flags: PrepareFlags::default(),
      }
   }
}

impl ConnectionConfig {
   pub fn with_flags(mut self, flags: OpenFlags) -> Self {
      self.flags = flags;
      self
   }

   pub fn with_busy_retry_max(mut self, retries: u32) -> Self {
      self.busy_retry_max = retries;
      self
   }

   pub fn with_busy_timeout_ms(mut self, ms: u32) -> Self {
      self.busy_timeout_ms = ms;
      self
   }

   pub fn with_extended_result_codes(mut self, enabled: bool) -> Self {
      self.extended_result_codes = enabled;
      self
   }

   pub fn with_vfs(mut self, vfs: impl Into<String>) -> Self {
      self.vfs = Some(vfs.into());
      self
   }

   pub fn with_prepare_flags(mut self, flags: PrepareFlags) -> Self {
      self.prepare_flags = flags;
      self
   }
}
