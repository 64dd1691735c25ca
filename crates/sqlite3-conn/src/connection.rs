//! Owned SQLite connection.

use std::cell::{Cell, RefCell};
use std::ffi::{CString, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::ptr;
use std::rc::Rc;
use std::time::Duration;

use libsqlite3_sys::{
   sqlite3, sqlite3_busy_timeout, sqlite3_changes64, sqlite3_create_function_v2,
   sqlite3_db_cacheflush, sqlite3_db_filename, sqlite3_db_readonly, sqlite3_db_release_memory,
   sqlite3_db_status, sqlite3_deserialize, sqlite3_errcode, sqlite3_errmsg, sqlite3_exec,
   sqlite3_extended_errcode, sqlite3_extended_result_codes, sqlite3_finalize, sqlite3_free,
   sqlite3_get_autocommit, sqlite3_interrupt, sqlite3_last_insert_rowid, sqlite3_limit,
   sqlite3_malloc64, sqlite3_next_stmt, sqlite3_open_v2, sqlite3_prepare_v3, sqlite3_serialize,
   sqlite3_set_last_insert_rowid, sqlite3_sql, sqlite3_stmt, sqlite3_system_errno,
   sqlite3_table_column_metadata, sqlite3_total_changes64,
};
use sqlite3_hooks::{CallbackScope, HookRegistry, SqliteValue, TraceEvent, TraceMask, UpdateEvent};
use tracing::{debug, trace, warn};

use crate::codes::ResultCode;
use crate::config::ConnectionConfig;
use crate::enums::{DbStatus, Limit, StatusValue, TextEncoding};
use crate::error::c_message;
use crate::flags::{FunctionFlags, OpenFlags, PrepareFlags};
use crate::function;
use crate::library;
use crate::options::DbConfig;
use crate::statement::Statement;
use crate::value::Value;
use crate::{Error, Result};

// The bundled bindings only export `sqlite3_close`; the library itself has
// provided the deferred-close variant since 3.7.14.
unsafe extern "C" {
   fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

const SQLITE_OK: c_int = 0;
const DESERIALIZE_FREEONCLOSE: u32 = 1;
const DESERIALIZE_RESIZEABLE: u32 = 2;

/// State shared between a connection and the statements prepared on it.
///
/// The handle becomes null once the connection closes, which is how
/// statements detect that their connection is gone.
pub(crate) struct ConnectionInner {
   db: Cell<*mut sqlite3>,
   path: String,
   busy_retry_max: Cell<u32>,
   prepare_flags: Cell<PrepareFlags>,
   use_count: Cell<u64>,
   success_count: Cell<u64>,
   busy_count: Cell<u64>,
   scope: Rc<CallbackScope>,
   hooks: RefCell<HookRegistry>,
   retained_names: RefCell<Vec<CString>>,
}

impl ConnectionInner {
   pub(crate) fn handle(&self) -> Result<*mut sqlite3> {
      let db = self.db.get();
      if db.is_null() {
         return Err(Error::ConnectionClosed);
      }
      Ok(db)
   }

   pub(crate) fn is_open(&self) -> bool {
      !self.db.get().is_null()
   }

   pub(crate) fn busy_retry_max(&self) -> u32 {
      self.busy_retry_max.get()
   }

   pub(crate) fn record_use(&self) {
      self.use_count.set(self.use_count.get() + 1);
   }

   pub(crate) fn record_success(&self) {
      self.success_count.set(self.success_count.get() + 1);
   }

   pub(crate) fn record_busy(&self, count: u64) {
      self.busy_count.set(self.busy_count.get() + count);
   }

   fn check(&self, db: *mut sqlite3, rc: c_int) -> Result<()> {
      if rc == SQLITE_OK {
         return Ok(());
      }
      // SAFETY: db is the open handle this call was made on.
      Err(unsafe { Error::from_handle(db, rc, None) })
   }

   /// Finalizes outstanding statements and closes the handle. Idempotent.
   ///
   /// Refused while one of the connection's callbacks is running, since the
   /// engine is still executing the statement that invoked it.
   fn close(&self) -> Result<()> {
      let db = self.db.get();
      if db.is_null() {
         return Ok(());
      }
      if self.scope.is_active() {
         warn!(path = %self.path, "Close requested from inside a connection callback");
         return Err(Error::Sqlite {
            code: ResultCode::Misuse,
            message: "cannot close a connection from inside one of its callbacks".into(),
            sql: None,
         });
      }

      // Callbacks fired during the close (trace CLOSE, rollback, function
      // destructors) see the connection as already closed.
      self.db.set(ptr::null_mut());

      // SAFETY: db is open. Statement wrappers check `is_open` before touching
      // their handle, so finalizing from here cannot double-free.
      let mut finalized = 0;
      unsafe {
         loop {
            let stmt = sqlite3_next_stmt(db, ptr::null_mut());
            if stmt.is_null() {
               break;
            }
            sqlite3_finalize(stmt);
            finalized += 1;
         }
      }

      // Hooks stay registered through close so trace CLOSE and rollback
      // listeners still fire; their contexts are dropped afterwards.
      let rc = unsafe { sqlite3_close_v2(db) };
      self.hooks.replace(HookRegistry::with_scope(Rc::clone(&self.scope)));
      self.retained_names.borrow_mut().clear();
      library::connection_closed();

      if rc != SQLITE_OK {
         warn!(path = %self.path, rc, "sqlite3_close_v2 failed");
         return Err(Error::from_code(rc));
      }

      debug!(path = %self.path, finalized, "Closed SQLite connection");
      Ok(())
   }
}

impl Drop for ConnectionInner {
   fn drop(&mut self) {
      // Only reached with the handle open when the owning connection was
      // dropped from inside one of its callbacks.
      if let Err(e) = self.close() {
         warn!(path = %self.path, error = %e, "Error closing connection state on drop");
      }
   }
}

/// Declared type and constraints of a table column, as reported by
/// [`Connection::table_column_metadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
   /// Declared type, `None` when the column has no type.
   pub data_type: Option<String>,
   /// Name of the default collation sequence.
   pub collation: Option<String>,
   pub not_null: bool,
   /// Part of the primary key.
   pub primary_key: bool,
   pub autoincrement: bool,
}

/// An open SQLite database connection.
///
/// Dropping the connection closes it. Statements prepared on it keep a shared
/// reference to its state, and once it is closed every operation on them
/// fails with [`Error::ConnectionClosed`].
///
/// The type is neither `Send` nor `Sync`: one connection belongs to one thread.
pub struct Connection {
   inner: Rc<ConnectionInner>,
}

impl std::fmt::Debug for Connection {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Connection")
         .field("path", &self.inner.path)
         .field("open", &self.inner.is_open())
         .field("busy_retry_max", &self.inner.busy_retry_max.get())
         .finish()
   }
}

impl Connection {
   /// Opens a database with the given flags and default settings.
   ///
   /// `":memory:"` opens a private in-memory database and `""` a private
   /// temporary on-disk one. With [`OpenFlags::URI`], `file:` URIs and their
   /// query parameters are interpreted by the engine.
   pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<Self> {
      Self::open_with_config(path, &ConnectionConfig::default().with_flags(flags))
   }

   /// Opens a private in-memory database.
   pub fn open_in_memory() -> Result<Self> {
      Self::open(":memory:", OpenFlags::default())
   }

   /// Opens a database and applies every setting in `config`.
   pub fn open_with_config(path: impl AsRef<Path>, config: &ConnectionConfig) -> Result<Self> {
      let path = path.as_ref();
      let path_str = path.to_str().ok_or_else(|| Error::Open {
         path: path.display().to_string(),
         code: ResultCode::CantOpen,
         message: "path is not valid UTF-8".into(),
      })?;
      let c_path = CString::new(path_str)?;
      let c_vfs = config.vfs.as_deref().map(CString::new).transpose()?;

      let mut db: *mut sqlite3 = ptr::null_mut();
      // SAFETY: pointers are valid NUL-terminated strings for the call.
      let rc = unsafe {
         sqlite3_open_v2(
            c_path.as_ptr(),
            &mut db,
            config.flags.bits(),
            c_vfs.as_ref().map_or(ptr::null(), |vfs| vfs.as_ptr()),
         )
      };

      if rc != SQLITE_OK {
         let message = if db.is_null() {
            library::error_string(rc)
         } else {
            // SAFETY: on failure the engine may still hand back a handle that
            // carries the message and must be closed.
            let message = unsafe { c_message(sqlite3_errmsg(db)) };
            unsafe { sqlite3_close_v2(db) };
            message
         };
         warn!(path = %path_str, rc, %message, "Failed to open SQLite connection");
         return Err(Error::Open {
            path: path_str.to_string(),
            code: ResultCode::from_code(rc),
            message,
         });
      }

      library::connection_opened();
      let scope = CallbackScope::new();
      let connection = Connection {
         inner: Rc::new(ConnectionInner {
            db: Cell::new(db),
            path: path_str.to_string(),
            busy_retry_max: Cell::new(config.busy_retry_max),
            prepare_flags: Cell::new(config.prepare_flags),
            use_count: Cell::new(0),
            success_count: Cell::new(0),
            busy_count: Cell::new(0),
            hooks: RefCell::new(HookRegistry::with_scope(Rc::clone(&scope))),
            scope,
            retained_names: RefCell::new(Vec::new()),
         }),
      };

      if config.extended_result_codes {
         connection.extended_result_codes(true)?;
      }
      if config.busy_timeout_ms > 0 {
         connection.busy_timeout(Duration::from_millis(u64::from(config.busy_timeout_ms)))?;
      }

      debug!(path = %path_str, flags = ?config.flags, "Opened SQLite connection");
      Ok(connection)
   }

   /// Closes the connection, finalizing any statements still outstanding.
   ///
   /// Calling it again is a no-op. Dropping the connection closes it too.
   /// Fails with `SQLITE_MISUSE` when called from inside one of the
   /// connection's own hooks, functions or row callbacks.
   pub fn close(&self) -> Result<()> {
      self.inner.close()
   }

   pub fn is_closed(&self) -> bool {
      !self.inner.is_open()
   }

   /// Path the connection was opened with, exactly as given.
   pub fn path(&self) -> &str {
      &self.inner.path
   }

   fn handle(&self) -> Result<*mut sqlite3> {
      self.inner.handle()
   }

   /// Steps and `exec` calls made through this connection.
   pub fn use_count(&self) -> u64 {
      self.inner.use_count.get()
   }

   pub fn success_count(&self) -> u64 {
      self.inner.success_count.get()
   }

   /// Busy or locked results seen while stepping statements.
   pub fn busy_count(&self) -> u64 {
      self.inner.busy_count.get()
   }

   pub fn busy_retry_max(&self) -> u32 {
      self.inner.busy_retry_max.get()
   }

   pub fn set_busy_retry_max(&self, retries: u32) {
      self.inner.busy_retry_max.set(retries);
   }

   /// Compiles the first statement in `sql` with the connection's prepare flags.
   ///
   /// Errors such as a missing table surface here rather than at step time.
   pub fn prepare(&self, sql: &str) -> Result<Statement> {
      self.prepare_with_flags(sql, self.inner.prepare_flags.get())
   }

   pub fn prepare_with_flags(&self, sql: &str, flags: PrepareFlags) -> Result<Statement> {
      let db = self.handle()?;
      let len = c_int::try_from(sql.len()).map_err(|_| Error::Sqlite {
         code: ResultCode::TooBig,
         message: "SQL text is too long".into(),
         sql: None,
      })?;

      let mut stmt: *mut sqlite3_stmt = ptr::null_mut();
      let mut tail: *const c_char = ptr::null();
      // SAFETY: sql is valid for len bytes; the engine does not require a NUL
      // terminator when the length is given.
      let rc = unsafe {
         sqlite3_prepare_v3(
            db,
            sql.as_ptr().cast(),
            len,
            flags.bits(),
            &mut stmt,
            &mut tail,
         )
      };

      if rc != SQLITE_OK {
         let err = unsafe { Error::from_handle(db, rc, Some(sql.to_string())) };
         debug!(error = %err, "Failed to prepare statement");
         return Err(err);
      }

      if stmt.is_null() {
         return Err(Error::Sqlite {
            code: ResultCode::Misuse,
            message: "SQL text contains no statement".into(),
            sql: Some(sql.to_string()),
         });
      }

      let consumed = (tail as usize).saturating_sub(sql.as_ptr() as usize);
      if sql.get(consumed..).is_some_and(|rest| !rest.trim().is_empty()) {
         trace!("Only the first statement was prepared; trailing SQL ignored");
      }

      // SAFETY: stmt is a freshly prepared statement owned by the wrapper.
      Ok(unsafe { Statement::from_raw(Rc::clone(&self.inner), stmt) })
   }

   /// SQL text of every statement prepared on this connection and not yet
   /// finalized.
   pub fn outstanding_statements(&self) -> Result<Vec<String>> {
      let db = self.handle()?;
      let mut sql = Vec::new();
      let mut stmt = ptr::null_mut();
      loop {
         stmt = unsafe { sqlite3_next_stmt(db, stmt) };
         if stmt.is_null() {
            break;
         }
         sql.push(unsafe { c_message(sqlite3_sql(stmt)) });
      }
      Ok(sql)
   }

   /// Runs zero or more semicolon-separated statements, stopping at the first
   /// error. Statements before the failing one keep their effects.
   pub fn exec(&self, sql: &str) -> Result<()> {
      let db = self.handle()?;
      let c_sql = CString::new(sql)?;
      self.inner.record_use();

      let rc = unsafe { sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), ptr::null_mut()) };
      self.inner.check(db, rc)?;
      self.inner.record_success();
      Ok(())
   }

   /// Like [`exec`](Self::exec), calling `row` with the column names and text
   /// values of every result row. Returning `false` stops execution with an
   /// `SQLITE_ABORT` error.
   pub fn exec_with<F>(&self, sql: &str, mut row: F) -> Result<()>
   where
      F: FnMut(&[&str], &[Option<&str>]) -> bool,
   {
      let db = self.handle()?;
      let c_sql = CString::new(sql)?;
      self.inner.record_use();

      let running = self.inner.scope.enter();
      let rc = unsafe {
         sqlite3_exec(
            db,
            c_sql.as_ptr(),
            Some(exec_row_callback::<F>),
            &mut row as *mut F as *mut c_void,
            ptr::null_mut(),
         )
      };
      drop(running);
      self.inner.check(db, rc)?;
      self.inner.record_success();
      Ok(())
   }

   /// Prepares `sql`, binds `values` and steps it to completion.
   pub fn exec_bind(&self, sql: &str, values: &[Option<Value>]) -> Result<()> {
      let mut stmt = self.prepare(sql)?;
      stmt.bind_all(values)?;
      while stmt.step()? {}
      Ok(())
   }

   pub fn begin(&self) -> Result<()> {
      self.exec("BEGIN")
   }

   pub fn commit(&self) -> Result<()> {
      self.exec("COMMIT")
   }

   pub fn rollback(&self) -> Result<()> {
      self.exec("ROLLBACK")
   }

   pub fn vacuum(&self) -> Result<()> {
      self.exec("VACUUM")
   }

   /// Whether a table with this name exists in the main schema.
   pub fn table_exists(&self, name: &str) -> Result<bool> {
      let mut stmt =
         self.prepare("SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
      stmt.bind(1, name)?;
      let found = stmt.step()? && stmt.int64(0) > 0;
      stmt.finalize()?;
      Ok(found)
   }

   /// Asks the engine to abort any running operation on this connection at
   /// the earliest opportunity. No-op once closed.
   pub fn interrupt(&self) {
      if let Ok(db) = self.handle() {
         unsafe { sqlite3_interrupt(db) };
      }
   }

   pub fn last_insert_rowid(&self) -> Result<i64> {
      let db = self.handle()?;
      Ok(unsafe { sqlite3_last_insert_rowid(db) })
   }

   /// Overrides the engine's last-insert rowid, e.g. after a virtual table
   /// insert that should not be visible to the caller.
   pub fn set_last_insert_rowid(&self, rowid: i64) -> Result<()> {
      let db = self.handle()?;
      unsafe { sqlite3_set_last_insert_rowid(db, rowid) };
      Ok(())
   }

   /// Rows modified by the most recent INSERT, UPDATE or DELETE.
   pub fn changes(&self) -> Result<i64> {
      let db = self.handle()?;
      Ok(unsafe { sqlite3_changes64(db) })
   }

   /// Rows modified since the connection opened.
   pub fn total_changes(&self) -> Result<i64> {
      let db = self.handle()?;
      Ok(unsafe { sqlite3_total_changes64(db) })
   }

   /// False while an explicit transaction is open.
   pub fn is_autocommit(&self) -> Result<bool> {
      let db = self.handle()?;
      Ok(unsafe { sqlite3_get_autocommit(db) } != 0)
   }

   pub fn error_code(&self) -> Result<ResultCode> {
      let db = self.handle()?;
      Ok(ResultCode::from_code(unsafe { sqlite3_errcode(db) }))
   }

   pub fn extended_error_code(&self) -> Result<ResultCode> {
      let db = self.handle()?;
      Ok(ResultCode::from_code(unsafe { sqlite3_extended_errcode(db) }))
   }

   pub fn error_message(&self) -> Result<String> {
      let db = self.handle()?;
      Ok(unsafe { c_message(sqlite3_errmsg(db)) })
   }

   /// OS error number behind the most recent I/O failure.
   pub fn system_errno(&self) -> Result<i32> {
      let db = self.handle()?;
      Ok(unsafe { sqlite3_system_errno(db) })
   }

   /// File backing the named schema, or `None` for in-memory and temporary
   /// databases or an unknown schema.
   pub fn filename(&self, db_name: &str) -> Result<Option<String>> {
      let db = self.handle()?;
      let name = CString::new(db_name)?;
      let file = unsafe { sqlite3_db_filename(db, name.as_ptr()) };
      if file.is_null() {
         return Ok(None);
      }
      let file = unsafe { c_message(file) };
      Ok((!file.is_empty()).then_some(file))
   }

   /// Whether the named schema (default `main`) is read-only.
   pub fn is_readonly(&self, db_name: Option<&str>) -> Result<bool> {
      let db = self.handle()?;
      let name = CString::new(db_name.unwrap_or("main"))?;
      match unsafe { sqlite3_db_readonly(db, name.as_ptr()) } {
         -1 => Err(Error::Sqlite {
            code: ResultCode::Error,
            message: format!("no such database: {}", db_name.unwrap_or("main")),
            sql: None,
         }),
         flag => Ok(flag == 1),
      }
   }

   pub fn extended_result_codes(&self, enabled: bool) -> Result<()> {
      let db = self.handle()?;
      let rc = unsafe { sqlite3_extended_result_codes(db, enabled as c_int) };
      self.inner.check(db, rc)
   }

   /// Makes the engine sleep and retry internally for up to `timeout` when a
   /// table is locked. Replaces any busy handler; zero disables it.
   pub fn busy_timeout(&self, timeout: Duration) -> Result<()> {
      let db = self.handle()?;
      let ms = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
      let rc = unsafe { sqlite3_busy_timeout(db, ms) };
      self.inner.check(db, rc)?;
      self.inner.hooks.borrow_mut().forget_busy_handler();
      trace!(ms, "Busy timeout set");
      Ok(())
   }

   /// Sets a run-time limit and returns its previous value.
   pub fn set_limit(&self, limit: Limit, value: i32) -> Result<i32> {
      let db = self.handle()?;
      Ok(unsafe { sqlite3_limit(db, limit.code(), value) })
   }

   pub fn limit(&self, limit: Limit) -> Result<i32> {
      let db = self.handle()?;
      Ok(unsafe { sqlite3_limit(db, limit.code(), -1) })
   }

   /// Applies a per-connection option. Boolean options return the setting in
   /// effect afterwards.
   pub fn db_config(&self, config: DbConfig) -> Result<Option<bool>> {
      let db = self.handle()?;
      let outcome = unsafe { config.apply(db) }?;
      self.inner.check(db, outcome.code)?;
      if let Some(name) = outcome.retained_name {
         self.inner.retained_names.borrow_mut().push(name);
      }
      trace!(?config, "Applied connection configuration");
      Ok(outcome.enabled)
   }

   pub fn db_status(&self, op: DbStatus, reset: bool) -> Result<StatusValue<i32>> {
      let db = self.handle()?;
      let mut current = 0;
      let mut highwater = 0;
      let rc =
         unsafe { sqlite3_db_status(db, op.code(), &mut current, &mut highwater, reset as c_int) };
      self.inner.check(db, rc)?;
      Ok(StatusValue { current, highwater })
   }

   /// Writes dirty pages held in the page cache to disk.
   pub fn cache_flush(&self) -> Result<()> {
      let db = self.handle()?;
      let rc = unsafe { sqlite3_db_cacheflush(db) };
      self.inner.check(db, rc)
   }

   /// Frees as much heap memory as possible from this connection's caches.
   pub fn release_memory(&self) -> Result<()> {
      let db = self.handle()?;
      let rc = unsafe { sqlite3_db_release_memory(db) };
      self.inner.check(db, rc)
   }

   /// Copies the named schema's database into a byte vector.
   pub fn serialize(&self, schema: &str) -> Result<Vec<u8>> {
      let db = self.handle()?;
      let schema = CString::new(schema)?;
      let mut size: i64 = 0;

      let data = unsafe { sqlite3_serialize(db, schema.as_ptr(), &mut size, 0) };
      if data.is_null() {
         if size == 0 {
            return Ok(Vec::new());
         }
         return Err(Error::from_code(ResultCode::NoMem.code()));
      }

      // SAFETY: the engine returned `size` bytes it allocated; copy then free.
      let bytes = unsafe { std::slice::from_raw_parts(data, size as usize) }.to_vec();
      unsafe { sqlite3_free(data.cast()) };
      Ok(bytes)
   }

   /// Replaces the named schema with an in-memory database holding `bytes`.
   pub fn deserialize(&self, schema: &str, bytes: &[u8]) -> Result<()> {
      let db = self.handle()?;
      let schema = CString::new(schema)?;
      let len = bytes.len() as u64;

      // The engine takes ownership of the buffer and may grow it, so it must
      // come from the engine's allocator.
      let buffer = unsafe { sqlite3_malloc64(len.max(1)) } as *mut u8;
      if buffer.is_null() {
         return Err(Error::from_code(ResultCode::NoMem.code()));
      }
      unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, bytes.len()) };

      // SAFETY: on failure the engine frees the buffer because of FREEONCLOSE.
      let rc = unsafe {
         sqlite3_deserialize(
            db,
            schema.as_ptr(),
            buffer,
            len as i64,
            len.max(1) as i64,
            DESERIALIZE_FREEONCLOSE | DESERIALIZE_RESIZEABLE,
         )
      };
      self.inner.check(db, rc)?;
      debug!(bytes = bytes.len(), "Deserialized database");
      Ok(())
   }

   /// Registers a scalar SQL function taking `n_args` arguments, or any
   /// number when `n_args` is -1. Registering the same name and arity again
   /// replaces the function.
   ///
   /// An `Err` returned by `callback` fails the calling statement with the
   /// error's result code and message.
   pub fn create_scalar_function<F>(
      &self,
      name: &str,
      n_args: i32,
      flags: FunctionFlags,
      callback: F,
   ) -> Result<()>
   where
      F: FnMut(&[SqliteValue]) -> Result<Value> + 'static,
   {
      let db = self.handle()?;
      let c_name = CString::new(name)?;
      let rc =
         unsafe { function::register(db, &self.inner.scope, &c_name, n_args, flags, callback) };
      self.inner.check(db, rc)?;
      debug!(name, n_args, ?flags, "Registered scalar function");
      Ok(())
   }

   /// Removes the function registered under `name` with `n_args` arguments.
   pub fn remove_function(&self, name: &str, n_args: i32) -> Result<()> {
      let db = self.handle()?;
      let c_name = CString::new(name)?;
      let rc = unsafe {
         sqlite3_create_function_v2(
            db,
            c_name.as_ptr(),
            n_args,
            TextEncoding::Utf8.code(),
            ptr::null_mut(),
            None,
            None,
            None,
            None,
         )
      };
      self.inner.check(db, rc)?;
      debug!(name, n_args, "Removed scalar function");
      Ok(())
   }

   /// Looks up the declared type and constraints of `column` in `table`.
   ///
   /// With `db_name` of `None` every attached schema is searched. Fails when
   /// the table or column does not exist.
   pub fn table_column_metadata(
      &self,
      db_name: Option<&str>,
      table: &str,
      column: &str,
   ) -> Result<ColumnMetadata> {
      let db = self.handle()?;
      let c_db = db_name.map(CString::new).transpose()?;
      let c_table = CString::new(table)?;
      let c_column = CString::new(column)?;

      let mut data_type: *const c_char = ptr::null();
      let mut collation: *const c_char = ptr::null();
      let mut not_null: c_int = 0;
      let mut primary_key: c_int = 0;
      let mut autoincrement: c_int = 0;

      // SAFETY: every input is a valid NUL-terminated string; the returned
      // strings belong to the engine and are copied before the next call.
      let rc = unsafe {
         sqlite3_table_column_metadata(
            db,
            c_db.as_ref().map_or(ptr::null(), |name| name.as_ptr()),
            c_table.as_ptr(),
            c_column.as_ptr(),
            &mut data_type,
            &mut collation,
            &mut not_null,
            &mut primary_key,
            &mut autoincrement,
         )
      };
      self.inner.check(db, rc)?;

      let text = |ptr: *const c_char| (!ptr.is_null()).then(|| unsafe { c_message(ptr) });
      Ok(ColumnMetadata {
         data_type: text(data_type),
         collation: text(collation),
         not_null: not_null != 0,
         primary_key: primary_key != 0,
         autoincrement: autoincrement != 0,
      })
   }

   /// Installs (or with `None` removes) the busy handler. It receives the
   /// number of prior calls for the same lock and returns `true` to keep
   /// waiting. Replaces any busy timeout.
   pub fn set_busy_handler<F>(&self, handler: Option<F>) -> Result<()>
   where
      F: FnMut(u32) -> bool + 'static,
   {
      let db = self.handle()?;
      let handler = handler.map(|f| Box::new(f) as sqlite3_hooks::BusyHandler);
      unsafe { self.inner.hooks.borrow_mut().set_busy_handler(db, handler) }?;
      Ok(())
   }

   /// Installs (or with `None` or zero `instructions` removes) the progress
   /// handler. Returning `true` interrupts the running operation.
   pub fn set_progress_handler<F>(&self, instructions: u32, handler: Option<F>) -> Result<()>
   where
      F: FnMut() -> bool + 'static,
   {
      let db = self.handle()?;
      let handler = handler.map(|f| Box::new(f) as sqlite3_hooks::ProgressHandler);
      unsafe {
         self
            .inner
            .hooks
            .borrow_mut()
            .set_progress_handler(db, instructions, handler)
      };
      Ok(())
   }

   /// Installs (or removes) the commit hook. Returning `true` turns the
   /// commit into a rollback.
   pub fn set_commit_hook<F>(&self, hook: Option<F>) -> Result<()>
   where
      F: FnMut() -> bool + 'static,
   {
      let db = self.handle()?;
      let hook = hook.map(|f| Box::new(f) as sqlite3_hooks::CommitHook);
      unsafe { self.inner.hooks.borrow_mut().set_commit_hook(db, hook) };
      Ok(())
   }

   pub fn set_rollback_hook<F>(&self, hook: Option<F>) -> Result<()>
   where
      F: FnMut() + 'static,
   {
      let db = self.handle()?;
      let hook = hook.map(|f| Box::new(f) as sqlite3_hooks::RollbackHook);
      unsafe { self.inner.hooks.borrow_mut().set_rollback_hook(db, hook) };
      Ok(())
   }

   /// Installs (or removes) the update hook, called for every row inserted,
   /// updated or deleted in a rowid table.
   pub fn set_update_hook<F>(&self, hook: Option<F>) -> Result<()>
   where
      F: FnMut(&UpdateEvent<'_>) + 'static,
   {
      let db = self.handle()?;
      let hook = hook.map(|f| Box::new(f) as sqlite3_hooks::UpdateHook);
      unsafe { self.inner.hooks.borrow_mut().set_update_hook(db, hook) };
      Ok(())
   }

   /// Installs (or removes) the trace listener for the events in `mask`.
   pub fn set_trace<F>(&self, mask: TraceMask, hook: Option<F>) -> Result<()>
   where
      F: FnMut(&TraceEvent) + 'static,
   {
      let db = self.handle()?;
      let hook = hook.map(|f| Box::new(f) as sqlite3_hooks::TraceHook);
      unsafe { self.inner.hooks.borrow_mut().set_trace(db, mask, hook) }?;
      Ok(())
   }
}

impl Drop for Connection {
   fn drop(&mut self) {
      if let Err(e) = self.inner.close() {
         warn!(path = %self.inner.path, error = %e, "Error closing connection on drop");
      }
   }
}

unsafe extern "C" fn exec_row_callback<F>(
   user_data: *mut c_void,
   count: c_int,
   values: *mut *mut c_char,
   names: *mut *mut c_char,
) -> c_int
where
   F: FnMut(&[&str], &[Option<&str>]) -> bool,
{
   if user_data.is_null() {
      return 1;
   }

   let result = catch_unwind(AssertUnwindSafe(|| {
      let count = count.max(0) as usize;
      // SAFETY: the engine passes `count` column names and values, each a
      // NUL-terminated string or (for values) null, valid for this call.
      let names: Vec<String> = (0..count)
         .map(|i| unsafe { c_message(*names.add(i)) })
         .collect();
      let values: Vec<Option<String>> = (0..count)
         .map(|i| {
            let value = unsafe { *values.add(i) };
            (!value.is_null()).then(|| unsafe { c_message(value) })
         })
         .collect();

      let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
      let value_refs: Vec<Option<&str>> = values.iter().map(Option::as_deref).collect();

      // SAFETY: user_data is the &mut F passed to sqlite3_exec for this call.
      let row = unsafe { &mut *(user_data as *mut F) };
      row(&name_refs, &value_refs)
   }));

   match result {
      Ok(true) => 0,
      Ok(false) => 1,
      Err(_) => {
         eprintln!("sqlite3-conn: panic in exec row callback (absorbed to prevent UB)");
         1
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use std::cell::RefCell;
   use std::rc::Rc;

   #[test]
   fn test_open_in_memory_and_close_is_idempotent() {
      let conn = Connection::open_in_memory().unwrap();
      assert!(!conn.is_closed());
      assert_eq!(conn.path(), ":memory:");
      conn.close().unwrap();
      assert!(conn.is_closed());
      conn.close().unwrap();
   }

   #[test]
   fn test_operations_after_close_fail() {
      let conn = Connection::open_in_memory().unwrap();
      conn.close().unwrap();
      assert!(matches!(conn.exec("SELECT 1"), Err(Error::ConnectionClosed)));
      assert!(matches!(conn.prepare("SELECT 1"), Err(Error::ConnectionClosed)));
      assert!(matches!(conn.changes(), Err(Error::ConnectionClosed)));
      conn.interrupt();
   }

   #[test]
   fn test_open_failure_yields_no_connection() {
      let err = Connection::open("/nonexistent-dir/sub/db.sqlite", OpenFlags::READWRITE)
         .unwrap_err();
      match err {
         Error::Open { path, code, .. } => {
            assert_eq!(path, "/nonexistent-dir/sub/db.sqlite");
            assert_eq!(code.primary(), ResultCode::CantOpen);
         }
         other => panic!("expected open error, got {other:?}"),
      }
   }

   #[test]
   fn test_exec_counts_use_and_success() {
      let conn = Connection::open_in_memory().unwrap();
      conn.exec("CREATE TABLE t (a TEXT, b INT)").unwrap();
      assert!(conn.exec("INSERT INTO missing VALUES (1)").is_err());
      assert_eq!(conn.use_count(), 2);
      assert_eq!(conn.success_count(), 1);
   }

   #[test]
   fn test_exec_stops_at_first_error_and_keeps_prior_effects() {
      let conn = Connection::open_in_memory().unwrap();
      let err = conn
         .exec("CREATE TABLE t (a); INSERT INTO t VALUES (1); INSERT INTO nope VALUES (2); INSERT INTO t VALUES (3)")
         .unwrap_err();
      assert_eq!(err.result_code(), Some(ResultCode::Error));
      assert!(err.to_string().contains("no such table"));

      let mut rows = 0;
      conn
         .exec_with("SELECT a FROM t", |_, _| {
            rows += 1;
            true
         })
         .unwrap();
      assert_eq!(rows, 1);
   }

   #[test]
   fn test_exec_with_reports_rows_and_aborts() {
      let conn = Connection::open_in_memory().unwrap();
      conn
         .exec("CREATE TABLE t (a TEXT, b INT); INSERT INTO t VALUES ('x', 1), (NULL, 2)")
         .unwrap();

      let mut seen = Vec::new();
      conn
         .exec_with("SELECT a, b FROM t ORDER BY b", |names, values| {
            assert_eq!(names, ["a", "b"]);
            seen.push(values.iter().map(|v| v.map(str::to_string)).collect::<Vec<_>>());
            true
         })
         .unwrap();
      assert_eq!(
         seen,
         vec![
            vec![Some("x".to_string()), Some("1".to_string())],
            vec![None, Some("2".to_string())],
         ]
      );

      let err = conn.exec_with("SELECT a FROM t", |_, _| false).unwrap_err();
      assert_eq!(err.result_code(), Some(ResultCode::Abort));
   }

   #[test]
   fn test_state_accessors() {
      let conn = Connection::open_in_memory().unwrap();
      conn.exec("CREATE TABLE t (v INTEGER)").unwrap();
      conn.exec("INSERT INTO t VALUES (1), (2), (3)").unwrap();
      assert_eq!(conn.changes().unwrap(), 3);
      assert_eq!(conn.last_insert_rowid().unwrap(), 3);
      assert!(conn.total_changes().unwrap() >= 3);

      conn.set_last_insert_rowid(42).unwrap();
      assert_eq!(conn.last_insert_rowid().unwrap(), 42);

      assert!(conn.is_autocommit().unwrap());
      conn.begin().unwrap();
      assert!(!conn.is_autocommit().unwrap());
      conn.rollback().unwrap();
      assert!(conn.is_autocommit().unwrap());
   }

   #[test]
   fn test_error_introspection() {
      let conn = Connection::open_in_memory().unwrap();
      let _ = conn.exec("SELECT * FROM missing");
      assert_eq!(conn.error_code().unwrap(), ResultCode::Error);
      assert!(conn.error_message().unwrap().contains("no such table"));
   }

   #[test]
   fn test_filename_and_readonly() {
      let conn = Connection::open_in_memory().unwrap();
      assert_eq!(conn.filename("main").unwrap(), None);
      assert!(!conn.is_readonly(None).unwrap());
      assert!(conn.is_readonly(Some("nope")).is_err());

      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("file.db");
      let conn = Connection::open(&path, OpenFlags::default()).unwrap();
      let filename = conn.filename("main").unwrap().unwrap();
      assert!(filename.ends_with("file.db"));
   }

   #[test]
   fn test_table_exists() {
      let conn = Connection::open_in_memory().unwrap();
      assert!(!conn.table_exists("test").unwrap());
      conn.exec("CREATE TABLE test (a)").unwrap();
      assert!(conn.table_exists("test").unwrap());
   }

   #[test]
   fn test_limits() {
      let conn = Connection::open_in_memory().unwrap();
      let original = conn.limit(Limit::Attached).unwrap();
      assert_eq!(conn.set_limit(Limit::Attached, 2).unwrap(), original);
      assert_eq!(conn.limit(Limit::Attached).unwrap(), 2);
   }

   #[test]
   fn test_db_config_toggles_foreign_keys() {
      let conn = Connection::open_in_memory().unwrap();
      assert_eq!(conn.db_config(DbConfig::EnableForeignKeys(true)).unwrap(), Some(true));
      assert_eq!(conn.db_config(DbConfig::EnableForeignKeys(false)).unwrap(), Some(false));
   }

   #[test]
   fn test_db_status_and_memory() {
      let conn = Connection::open_in_memory().unwrap();
      conn.exec("CREATE TABLE t (v)").unwrap();
      let status = conn.db_status(DbStatus::CacheUsed, false).unwrap();
      assert!(status.current >= 0);
      assert_eq!(status.highwater, 0);
      conn.cache_flush().unwrap();
      conn.release_memory().unwrap();
   }

   #[test]
   fn test_serialize_round_trip() {
      let source = Connection::open_in_memory().unwrap();
      source
         .exec("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('kept')")
         .unwrap();
      let image = source.serialize("main").unwrap();
      assert!(!image.is_empty());

      let target = Connection::open_in_memory().unwrap();
      target.deserialize("main", &image).unwrap();
      let mut stmt = target.prepare("SELECT v FROM t").unwrap();
      assert!(stmt.step().unwrap());
      assert_eq!(stmt.string(0), "kept");
   }

   #[test]
   fn test_close_finalizes_outstanding_statements() {
      let conn = Connection::open_in_memory().unwrap();
      let _a = conn.prepare("SELECT 1").unwrap();
      let _b = conn.prepare("SELECT 2").unwrap();
      let mut outstanding = conn.outstanding_statements().unwrap();
      outstanding.sort();
      assert_eq!(outstanding, vec!["SELECT 1", "SELECT 2"]);
      conn.close().unwrap();
   }

   #[test]
   fn test_update_and_commit_hooks_through_connection() {
      let conn = Connection::open_in_memory().unwrap();
      let events = Rc::new(RefCell::new(Vec::new()));
      let sink = Rc::clone(&events);

      conn
         .set_update_hook(Some(move |event: &UpdateEvent<'_>| {
            sink.borrow_mut().push((event.operation, event.rowid));
         }))
         .unwrap();
      conn.exec("CREATE TABLE t (v)").unwrap();
      conn.exec("INSERT INTO t VALUES (1)").unwrap();
      assert_eq!(
         *events.borrow(),
         vec![(sqlite3_hooks::UpdateOperation::Insert, 1)]
      );

      conn.set_commit_hook(Some(|| true)).unwrap();
      let err = conn.exec("INSERT INTO t VALUES (2)").unwrap_err();
      assert_eq!(err.result_code().map(ResultCode::primary), Some(ResultCode::Constraint));

      conn.set_commit_hook(None::<fn() -> bool>).unwrap();
      conn.exec("INSERT INTO t VALUES (3)").unwrap();
   }

   #[test]
   fn test_update_hook_removes_itself_while_running() {
      let conn = Rc::new(Connection::open_in_memory().unwrap());
      conn.exec("CREATE TABLE t (v INTEGER)").unwrap();
      let handle = Rc::downgrade(&conn);
      let fired = Rc::new(Cell::new(0));
      let counter = Rc::clone(&fired);
      let label = String::from("update listener");

      conn
         .set_update_hook(Some(move |_: &UpdateEvent<'_>| {
            counter.set(counter.get() + 1);
            if let Some(conn) = handle.upgrade() {
               conn.set_update_hook(None::<fn(&UpdateEvent<'_>)>).unwrap();
               // Captures are still alive until the listener returns
               assert_eq!(label.len(), 15);
               assert_eq!(conn.inner.scope.pending(), 1);
            }
         }))
         .unwrap();

      conn.exec("INSERT INTO t VALUES (1), (2)").unwrap();
      conn.exec("INSERT INTO t VALUES (3)").unwrap();
      assert_eq!(fired.get(), 1);
      assert!(!conn.inner.scope.is_active());
      assert_eq!(conn.inner.scope.pending(), 0);
   }

   #[test]
   fn test_trace_listener_replaces_itself_while_running() {
      let conn = Rc::new(Connection::open_in_memory().unwrap());
      let handle = Rc::downgrade(&conn);
      let seen = Rc::new(RefCell::new(Vec::new()));
      let first_log = Rc::clone(&seen);
      let second_log = Rc::clone(&seen);

      conn
         .set_trace(
            TraceMask::STMT,
            Some(move |_: &TraceEvent| {
               first_log.borrow_mut().push("first");
               if let Some(conn) = handle.upgrade() {
                  let log = Rc::clone(&second_log);
                  conn
                     .set_trace(
                        TraceMask::STMT,
                        Some(move |_: &TraceEvent| log.borrow_mut().push("second")),
                     )
                     .unwrap();
               }
            }),
         )
         .unwrap();

      conn.exec("SELECT 1").unwrap();
      conn.exec("SELECT 2").unwrap();
      assert_eq!(*seen.borrow(), vec!["first", "second"]);
      assert_eq!(conn.inner.scope.pending(), 0);
   }

   #[test]
   fn test_close_from_inside_callback_is_refused() {
      let conn = Rc::new(Connection::open_in_memory().unwrap());
      conn.exec("CREATE TABLE t (v INTEGER)").unwrap();
      let handle = Rc::downgrade(&conn);
      let outcome = Rc::new(RefCell::new(None));
      let sink = Rc::clone(&outcome);

      conn
         .set_commit_hook(Some(move || {
            if let Some(conn) = handle.upgrade() {
               *sink.borrow_mut() = Some(conn.close().map_err(|e| e.result_code()));
            }
            false
         }))
         .unwrap();
      conn.exec("INSERT INTO t VALUES (1)").unwrap();
      assert_eq!(*outcome.borrow(), Some(Err(Some(ResultCode::Misuse))));
      assert!(!conn.is_closed());

      let mut refused = None;
      conn
         .exec_with("SELECT v FROM t", |_, _| {
            refused = Some(conn.close().is_err());
            true
         })
         .unwrap();
      assert_eq!(refused, Some(true));

      conn.close().unwrap();
      assert!(conn.is_closed());
   }

   #[test]
   fn test_busy_timeout_replaces_busy_handler() {
      let conn = Connection::open_in_memory().unwrap();
      conn.set_busy_handler(Some(|_| false)).unwrap();
      assert!(conn.inner.hooks.borrow().has_busy_handler());
      conn.busy_timeout(Duration::from_millis(50)).unwrap();
      assert!(!conn.inner.hooks.borrow().has_busy_handler());
   }

   #[test]
   fn test_trace_close_event_fires_on_close() {
      let conn = Connection::open_in_memory().unwrap();
      let closed = Rc::new(Cell::new(false));
      let flag = Rc::clone(&closed);
      conn
         .set_trace(
            TraceMask::CLOSE,
            Some(move |event: &TraceEvent| {
               if *event == TraceEvent::Close {
                  flag.set(true);
               }
            }),
         )
         .unwrap();
      conn.close().unwrap();
      assert!(closed.get());
   }
}
