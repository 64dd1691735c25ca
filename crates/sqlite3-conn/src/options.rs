//! Typed requests for the engine's variadic configuration entry points.
//!
//! `sqlite3_config` and `sqlite3_db_config` take an option number followed by
//! option-specific C varargs. Each variant below carries exactly the payload
//! its option expects, and the `apply` functions do the marshaling.

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;

use libsqlite3_sys::{sqlite3, sqlite3_config, sqlite3_db_config, sqlite3_int64};

/// Process-wide configuration applied through `sqlite3_config`.
///
/// The engine accepts these only before it initializes (first connection open)
/// or after `sqlite3_shutdown`. At any other time the call fails with
/// `SQLITE_MISUSE`.
#[derive(Debug, Clone, PartialEq)]
pub enum Config {
   SingleThread,
   MultiThread,
   Serialized,
   /// Page cache built from heap slots of `slot_size` bytes, `slot_count` of
   /// them per connection.
   PageCache { slot_size: i32, slot_count: i32 },
   /// Collect memory allocation statistics.
   MemStatus(bool),
   /// Default lookaside allocator size for new connections.
   Lookaside { slot_size: i32, slot_count: i32 },
   /// Forward the engine's error log to `tracing`.
   LogToTracing,
   /// Interpret filenames as URIs by default.
   Uri(bool),
   CoveringIndexScan(bool),
   MmapSize { default: i64, max: i64 },
   /// Minimum PMA size for the multithreaded sorter.
   PmaSize(u32),
   StmtJournalSpill(i32),
   SmallMalloc(bool),
   SorterRefSize(i32),
   /// Default maximum size of an in-memory database created by deserialize.
   MemDbMaxSize(i64),
}

impl Config {
   pub fn option(&self) -> i32 {
      match self {
         Config::SingleThread => 1,
         Config::MultiThread => 2,
         Config::Serialized => 3,
         Config::PageCache { .. } => 7,
         Config::MemStatus(_) => 9,
         Config::Lookaside { .. } => 13,
         Config::LogToTracing => 16,
         Config::Uri(_) => 17,
         Config::CoveringIndexScan(_) => 20,
         Config::MmapSize { .. } => 22,
         Config::PmaSize(_) => 25,
         Config::StmtJournalSpill(_) => 26,
         Config::SmallMalloc(_) => 27,
         Config::SorterRefSize(_) => 28,
         Config::MemDbMaxSize(_) => 29,
      }
   }

   /// Calls `sqlite3_config` and returns the raw result code.
   pub(crate) fn apply(&self) -> c_int {
      let op = self.option();

      // SAFETY: each arm passes the argument list documented for its option.
      unsafe {
         match self {
            Config::SingleThread | Config::MultiThread | Config::Serialized => sqlite3_config(op),
            Config::PageCache {
               slot_size,
               slot_count,
            } => sqlite3_config(
               op,
               ptr::null_mut::<c_void>(),
               *slot_size as c_int,
               *slot_count as c_int,
            ),
            Config::Lookaside {
               slot_size,
               slot_count,
            } => sqlite3_config(op, *slot_size as c_int, *slot_count as c_int),
            Config::LogToTracing => sqlite3_config(
               op,
               log_callback as unsafe extern "C" fn(*mut c_void, c_int, *const c_char),
               ptr::null_mut::<c_void>(),
            ),
            Config::MemStatus(on)
            | Config::Uri(on)
            | Config::CoveringIndexScan(on)
            | Config::SmallMalloc(on) => sqlite3_config(op, *on as c_int),
            Config::MmapSize { default, max } => {
               sqlite3_config(op, *default as sqlite3_int64, *max as sqlite3_int64)
            }
            Config::PmaSize(size) => sqlite3_config(op, *size as std::ffi::c_uint),
            Config::StmtJournalSpill(bytes) | Config::SorterRefSize(bytes) => {
               sqlite3_config(op, *bytes as c_int)
            }
            Config::MemDbMaxSize(bytes) => sqlite3_config(op, *bytes as sqlite3_int64),
         }
      }
   }
}

unsafe extern "C" fn log_callback(_: *mut c_void, code: c_int, message: *const c_char) {
   let result = std::panic::catch_unwind(|| {
      // SAFETY: the engine passes a NUL-terminated message valid for this call.
      let message = unsafe { crate::error::c_message(message) };
      let code = crate::codes::ResultCode::from_code(code);
      match code.category() {
         crate::error::ErrorCategory::Advisory => tracing::debug!(%code, "{message}"),
         _ => tracing::warn!(%code, "{message}"),
      }
   });

   if result.is_err() {
      eprintln!("sqlite3-conn: panic in log_callback (absorbed to prevent UB)");
   }
}

/// Per-connection configuration applied through `sqlite3_db_config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbConfig {
   /// Rename the `main` schema.
   MainDbName(String),
   /// Lookaside allocator for this connection, allocated by the engine.
   Lookaside { slot_size: i32, slot_count: i32 },
   EnableForeignKeys(bool),
   EnableTrigger(bool),
   EnableFts3Tokenizer(bool),
   EnableLoadExtension(bool),
   NoCheckpointOnClose(bool),
   /// Query planner stability guarantee.
   EnableQpsg(bool),
   TriggerEqp(bool),
   /// Set before `VACUUM` to reset the database to empty.
   ResetDatabase(bool),
   Defensive(bool),
   WritableSchema(bool),
}

impl DbConfig {
   pub fn option(&self) -> i32 {
      match self {
         DbConfig::MainDbName(_) => 1000,
         DbConfig::Lookaside { .. } => 1001,
         DbConfig::EnableForeignKeys(_) => 1002,
         DbConfig::EnableTrigger(_) => 1003,
         DbConfig::EnableFts3Tokenizer(_) => 1004,
         DbConfig::EnableLoadExtension(_) => 1005,
         DbConfig::NoCheckpointOnClose(_) => 1006,
         DbConfig::EnableQpsg(_) => 1007,
         DbConfig::TriggerEqp(_) => 1008,
         DbConfig::ResetDatabase(_) => 1009,
         DbConfig::Defensive(_) => 1010,
         DbConfig::WritableSchema(_) => 1011,
      }
   }

   fn toggle(&self) -> Option<bool> {
      match self {
         DbConfig::EnableForeignKeys(on)
         | DbConfig::EnableTrigger(on)
         | DbConfig::EnableFts3Tokenizer(on)
         | DbConfig::EnableLoadExtension(on)
         | DbConfig::NoCheckpointOnClose(on)
         | DbConfig::EnableQpsg(on)
         | DbConfig::TriggerEqp(on)
         | DbConfig::ResetDatabase(on)
         | DbConfig::Defensive(on)
         | DbConfig::WritableSchema(on) => Some(*on),
         DbConfig::MainDbName(_) | DbConfig::Lookaside { .. } => None,
      }
   }
}

/// Result of applying a [`DbConfig`].
pub(crate) struct DbConfigOutcome {
   pub code: c_int,
   /// The setting in effect afterwards, for boolean options.
   pub enabled: Option<bool>,
   /// A schema name the connection must keep alive until it closes.
   pub retained_name: Option<CString>,
}

impl DbConfig {
   /// Calls `sqlite3_db_config` on `db`.
   ///
   /// # Safety
   ///
   /// `db` must be a valid, open connection.
   pub(crate) unsafe fn apply(&self, db: *mut sqlite3) -> crate::Result<DbConfigOutcome> {
      let op = self.option();

      match self {
         DbConfig::MainDbName(name) => {
            let name = CString::new(name.as_str())?;
            // SAFETY: the engine keeps the pointer; the caller retains the
            // CString for the lifetime of the connection.
            let code = unsafe { sqlite3_db_config(db, op, name.as_ptr()) };
            Ok(DbConfigOutcome {
               code,
               enabled: None,
               retained_name: Some(name),
            })
         }
         DbConfig::Lookaside {
            slot_size,
            slot_count,
         } => {
            // SAFETY: a null buffer asks the engine to allocate the slots.
            let code = unsafe {
               sqlite3_db_config(
                  db,
                  op,
                  ptr::null_mut::<c_void>(),
                  *slot_size as c_int,
                  *slot_count as c_int,
               )
            };
            Ok(DbConfigOutcome {
               code,
               enabled: None,
               retained_name: None,
            })
         }
         toggle => {
            let on = toggle.toggle().unwrap_or(false);
            let mut enabled: c_int = 0;
            // SAFETY: boolean options take (int, int*).
            let code =
               unsafe { sqlite3_db_config(db, op, on as c_int, &mut enabled as *mut c_int) };
            Ok(DbConfigOutcome {
               code,
               enabled: Some(enabled != 0),
               retained_name: None,
            })
         }
      }
   }
}
