//! Process-wide engine information and settings.
//!
//! Nothing here is tied to a connection. The temp/data directory overrides and
//! [`configure`] affect every connection in the process, so they are only
//! accepted while no [`Connection`](crate::Connection) is open.

use std::collections::BTreeMap;
use std::ffi::{CString, c_char, c_int};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use libsqlite3_sys::{
   sqlite3_compileoption_get, sqlite3_compileoption_used, sqlite3_complete, sqlite3_errstr,
   sqlite3_free, sqlite3_libversion, sqlite3_libversion_number, sqlite3_malloc64,
   sqlite3_memory_highwater, sqlite3_memory_used, sqlite3_sourceid, sqlite3_status64,
   sqlite3_threadsafe,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::codes::ResultCode;
use crate::enums::{Status, StatusValue, ThreadSafety};
use crate::error::c_message;
use crate::options::Config;
use crate::{Error, Result};

static OPEN_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Serializes writes to the engine's global directory pointers.
static DIRECTORY_LOCK: Mutex<()> = Mutex::new(());

pub(crate) fn connection_opened() {
   OPEN_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
}

pub(crate) fn connection_closed() {
   OPEN_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
}

/// Number of connections opened through this crate that are not yet closed.
pub fn open_connections() -> usize {
   OPEN_CONNECTIONS.load(Ordering::SeqCst)
}

/// Engine version string, e.g. `3.46.0`.
pub fn version() -> String {
   // SAFETY: returns a static string.
   unsafe { c_message(sqlite3_libversion()) }
}

/// Engine version as `X * 1_000_000 + Y * 1_000 + Z`.
pub fn version_number() -> i32 {
   unsafe { sqlite3_libversion_number() }
}

/// Check-in identifier of the engine source.
pub fn source_id() -> String {
   unsafe { c_message(sqlite3_sourceid()) }
}

/// Compile-time options, keyed by name without the `SQLITE_` prefix.
/// Options without a value map to an empty string.
pub fn compile_options() -> BTreeMap<String, String> {
   let mut options = BTreeMap::new();
   let mut index: c_int = 0;

   loop {
      // SAFETY: returns a static string, or null past the last option.
      let option = unsafe { sqlite3_compileoption_get(index) };
      if option.is_null() {
         break;
      }

      let option = unsafe { c_message(option) };
      match option.split_once('=') {
         Some((name, value)) => options.insert(name.to_string(), value.to_string()),
         None => options.insert(option, String::new()),
      };
      index += 1;
   }

   options
}

/// Whether the engine was built with the named option. The `SQLITE_` prefix
/// is optional.
pub fn is_compile_option_used(name: &str) -> bool {
   let Ok(name) = CString::new(name) else {
      return false;
   };
   unsafe { sqlite3_compileoption_used(name.as_ptr()) != 0 }
}

pub fn thread_safety() -> ThreadSafety {
   let level = unsafe { sqlite3_threadsafe() };
   ThreadSafety::from_code(level).unwrap_or(ThreadSafety::Serialized)
}

/// Whether `sql` ends with a complete statement (a terminating semicolon
/// outside of literals, comments and trigger bodies).
pub fn is_complete(sql: &str) -> bool {
   let Ok(sql) = CString::new(sql) else {
      return false;
   };
   unsafe { sqlite3_complete(sql.as_ptr()) != 0 }
}

/// Bytes of heap memory currently allocated by the engine.
pub fn memory_used() -> i64 {
   unsafe { sqlite3_memory_used() }
}

/// Peak of [`memory_used`] since the last reset.
pub fn memory_highwater(reset: bool) -> i64 {
   unsafe { sqlite3_memory_highwater(reset as c_int) }
}

/// The engine's English description of a result code.
pub fn error_string(code: i32) -> String {
   unsafe { c_message(sqlite3_errstr(code)) }
}

/// Reads a process-wide status counter.
pub fn status(op: Status, reset: bool) -> Result<StatusValue<i64>> {
   let mut current = 0;
   let mut highwater = 0;
   let rc = unsafe { sqlite3_status64(op.code(), &mut current, &mut highwater, reset as c_int) };
   if rc != ResultCode::Ok.code() {
      return Err(Error::from_code(rc));
   }
   Ok(StatusValue { current, highwater })
}

/// Applies a process-wide configuration option.
///
/// Fails with `SQLITE_MISUSE` once the engine has initialized, which happens
/// when the first connection opens.
pub fn configure(config: Config) -> Result<()> {
   let rc = config.apply();
   if rc != ResultCode::Ok.code() {
      return Err(Error::from_code(rc));
   }
   debug!(?config, "Applied process-wide configuration");
   Ok(())
}

/// Sets (or with `None` clears) the directory used for temporary files.
///
/// Refused with [`Error::ConnectionsOpen`] while any connection is open.
pub fn set_temp_directory(path: Option<&Path>) -> Result<()> {
   set_directory(Directory::Temp, path)
}

/// Sets (or with `None` clears) the directory relative database paths are
/// resolved against. Only honored by the Windows VFS.
///
/// Refused with [`Error::ConnectionsOpen`] while any connection is open.
pub fn set_data_directory(path: Option<&Path>) -> Result<()> {
   set_directory(Directory::Data, path)
}

#[derive(Debug, Clone, Copy)]
enum Directory {
   Temp,
   Data,
}

fn set_directory(which: Directory, path: Option<&Path>) -> Result<()> {
   let _guard = DIRECTORY_LOCK.lock();

   let open = open_connections();
   if open > 0 {
      return Err(Error::ConnectionsOpen(open));
   }

   let replacement = match path {
      Some(path) => {
         let text = path.to_str().ok_or_else(|| Error::Sqlite {
            code: ResultCode::Misuse,
            message: format!("directory path is not valid UTF-8: {}", path.display()),
            sql: None,
         })?;
         engine_string(text)?
      }
      None => std::ptr::null_mut(),
   };

   // SAFETY: the globals are only written here, under DIRECTORY_LOCK, with no
   // open connections. The engine frees neither value; the previous one was
   // allocated by engine_string.
   unsafe {
      let previous = match which {
         Directory::Temp => {
            let previous = libsqlite3_sys::sqlite3_temp_directory;
            libsqlite3_sys::sqlite3_temp_directory = replacement;
            previous
         }
         Directory::Data => {
            let previous = libsqlite3_sys::sqlite3_data_directory;
            libsqlite3_sys::sqlite3_data_directory = replacement;
            previous
         }
      };
      sqlite3_free(previous.cast());
   }

   debug!(?which, ?path, "Process directory override updated");
   Ok(())
}

/// Copies `text` into engine-allocated memory, NUL-terminated.
fn engine_string(text: &str) -> Result<*mut c_char> {
   let text = CString::new(text)?;
   let bytes = text.as_bytes_with_nul();

   // SAFETY: allocation of bytes.len() bytes, checked for null before use.
   let buffer = unsafe { sqlite3_malloc64(bytes.len() as u64) } as *mut c_char;
   if buffer.is_null() {
      return Err(Error::from_code(ResultCode::NoMem.code()));
   }

   unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr().cast(), buffer, bytes.len()) };
   Ok(buffer)
}
