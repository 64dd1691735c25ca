//! Prepared statements: binding, stepping with busy retry, and column reads.

use std::collections::HashMap;
use std::ffi::{CString, c_int};
use std::rc::Rc;
use std::time::Duration;

use libsqlite3_sys::{
   SQLITE_TRANSIENT, sqlite3_bind_blob64, sqlite3_bind_double, sqlite3_bind_int64,
   sqlite3_bind_null, sqlite3_bind_parameter_count, sqlite3_bind_parameter_index,
   sqlite3_bind_parameter_name, sqlite3_bind_text64, sqlite3_bind_zeroblob64,
   sqlite3_clear_bindings, sqlite3_column_blob, sqlite3_column_bytes, sqlite3_column_count,
   sqlite3_column_decltype, sqlite3_column_double, sqlite3_column_int64, sqlite3_column_name,
   sqlite3_column_text, sqlite3_column_type, sqlite3_column_value, sqlite3_data_count,
   sqlite3_db_handle, sqlite3_expanded_sql, sqlite3_finalize, sqlite3_free, sqlite3_reset,
   sqlite3_sql, sqlite3_step, sqlite3_stmt, sqlite3_stmt_busy, sqlite3_stmt_isexplain,
   sqlite3_stmt_readonly, sqlite3_stmt_status,
};
use sqlite3_hooks::SqliteValue;
use tracing::{trace, warn};

use crate::codes::ResultCode;
use crate::connection::ConnectionInner;
use crate::enums::{StmtStatus, TextEncoding};
use crate::error::c_message;
use crate::library;
use crate::retry::{self, Retry};
use crate::value::{ColumnType, Value};
use crate::{Error, Result};

/// Where a statement is in its execution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementState {
   /// Freshly prepared or reset. The next step starts from the first row.
   Ready,
   /// A step call is in progress.
   Stepping,
   /// A row is available for reading.
   HasRow,
   /// Execution stopped with an error. Reset before stepping again.
   Failed,
   /// The native statement has been released.
   Finalized,
}

/// Resolves a column reference to a 0-based column index.
///
/// Implemented for `usize` (a position) and `&str` (a column name).
pub trait ColumnIndex {
   fn index_in(&self, stmt: &Statement) -> Option<usize>;
}

impl ColumnIndex for usize {
   fn index_in(&self, stmt: &Statement) -> Option<usize> {
      (*self < stmt.column_count).then_some(*self)
   }
}

impl ColumnIndex for &str {
   fn index_in(&self, stmt: &Statement) -> Option<usize> {
      stmt.column_map.get(*self).copied()
   }
}

/// A compiled SQL statement.
///
/// Column metadata (count, names, name lookup) is captured once at prepare
/// time. Parameter indices are 1-based, column indices 0-based.
///
/// Column reads are "safe reads": an unknown column, a closed connection or a
/// statement with no current row yields a sentinel (`-1`, `-1.0`, `""`,
/// `false` or `None`) instead of an error.
pub struct Statement {
   conn: Rc<ConnectionInner>,
   stmt: *mut sqlite3_stmt,
   sql: String,
   bind_parameter_count: usize,
   column_count: usize,
   columns: Vec<String>,
   column_map: HashMap<String, usize>,
   state: StatementState,
   use_count: u64,
   success_count: u64,
   busy_count: u64,
}

impl std::fmt::Debug for Statement {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Statement")
         .field("sql", &self.sql)
         .field("state", &self.state)
         .field("columns", &self.columns)
         .finish()
   }
}

impl Statement {
   /// Wraps a freshly prepared statement and records its metadata.
   ///
   /// # Safety
   ///
   /// `stmt` must be a valid statement prepared on `conn`'s open handle and
   /// not owned by anything else.
   pub(crate) unsafe fn from_raw(conn: Rc<ConnectionInner>, stmt: *mut sqlite3_stmt) -> Self {
      let sql = unsafe { c_message(sqlite3_sql(stmt)) };
      let bind_parameter_count = unsafe { sqlite3_bind_parameter_count(stmt) }.max(0) as usize;
      let column_count = unsafe { sqlite3_column_count(stmt) }.max(0) as usize;

      let columns: Vec<String> = (0..column_count)
         .map(|i| unsafe { c_message(sqlite3_column_name(stmt, i as c_int)) })
         .collect();

      // Duplicate names resolve to the leftmost column.
      let mut column_map = HashMap::with_capacity(column_count);
      for (index, name) in columns.iter().enumerate() {
         column_map.entry(name.clone()).or_insert(index);
      }

      trace!(sql = %sql, bind_parameter_count, column_count, "Prepared statement");

      Self {
         conn,
         stmt,
         sql,
         bind_parameter_count,
         column_count,
         columns,
         column_map,
         state: StatementState::Ready,
         use_count: 0,
         success_count: 0,
         busy_count: 0,
      }
   }

   /// The live native handle, or the lifecycle error explaining why there is
   /// none.
   fn handle(&self) -> Result<*mut sqlite3_stmt> {
      if self.stmt.is_null() {
         return Err(Error::StatementFinalized);
      }
      if !self.conn.is_open() {
         return Err(Error::ConnectionClosed);
      }
      Ok(self.stmt)
   }

   fn error(&self, stmt: *mut sqlite3_stmt, rc: c_int) -> Error {
      let sql = expanded_sql(stmt).unwrap_or_else(|| self.sql.clone());
      // SAFETY: stmt is live, so its connection handle is open.
      unsafe { Error::from_handle(sqlite3_db_handle(stmt), rc, Some(sql)) }
   }

   fn check(&self, stmt: *mut sqlite3_stmt, rc: c_int) -> Result<()> {
      if rc == ResultCode::Ok.code() {
         Ok(())
      } else {
         Err(self.error(stmt, rc))
      }
   }

   pub fn state(&self) -> StatementState {
      if self.stmt.is_null() || !self.conn.is_open() {
         return StatementState::Finalized;
      }
      self.state
   }

   /// SQL text the statement was prepared from.
   pub fn sql(&self) -> &str {
      &self.sql
   }

   /// SQL text with current bindings substituted.
   pub fn expanded_sql(&self) -> Result<String> {
      let stmt = self.handle()?;
      Ok(expanded_sql(stmt).unwrap_or_default())
   }

   pub fn bind_parameter_count(&self) -> usize {
      self.bind_parameter_count
   }

   pub fn column_count(&self) -> usize {
      self.column_count
   }

   /// Column names in result order.
   pub fn columns(&self) -> &[String] {
      &self.columns
   }

   pub fn column_name(&self, index: usize) -> Option<&str> {
      self.columns.get(index).map(String::as_str)
   }

   pub fn column_index(&self, name: &str) -> Option<usize> {
      self.column_map.get(name).copied()
   }

   /// Declared type of a column taken directly from a table, e.g. `INTEGER`.
   pub fn column_decltype(&self, index: usize) -> Option<String> {
      let stmt = self.handle().ok()?;
      if index >= self.column_count {
         return None;
      }
      let decltype = unsafe { sqlite3_column_decltype(stmt, index as c_int) };
      (!decltype.is_null()).then(|| unsafe { c_message(decltype) })
   }

   pub fn use_count(&self) -> u64 {
      self.use_count
   }

   pub fn success_count(&self) -> u64 {
      self.success_count
   }

   /// Busy or locked results seen by this statement's steps.
   pub fn busy_count(&self) -> u64 {
      self.busy_count
   }

   /// Binds `value` to the 1-based parameter `index`.
   pub fn bind<V: Into<Value>>(&mut self, index: usize, value: V) -> Result<&mut Self> {
      self.bind_value(index, &value.into())
   }

   pub fn bind_value(&mut self, index: usize, value: &Value) -> Result<&mut Self> {
      let stmt = self.handle()?;
      let Ok(i) = c_int::try_from(index) else {
         return Err(Error::Sqlite {
            code: ResultCode::Range,
            message: library::error_string(ResultCode::Range.code()),
            sql: Some(self.sql.clone()),
         });
      };

      // SAFETY: stmt is live; text and blob bytes are copied by the engine
      // (SQLITE_TRANSIENT) before the call returns.
      let rc = unsafe {
         match value {
            Value::Null => sqlite3_bind_null(stmt, i),
            Value::Bool(b) => sqlite3_bind_int64(stmt, i, i64::from(*b)),
            Value::Integer(v) => sqlite3_bind_int64(stmt, i, *v),
            Value::Real(v) => sqlite3_bind_double(stmt, i, *v),
            Value::Text(s) => sqlite3_bind_text64(
               stmt,
               i,
               s.as_ptr().cast(),
               s.len() as u64,
               SQLITE_TRANSIENT(),
               TextEncoding::Utf8.code() as u8,
            ),
            Value::Blob(b) => sqlite3_bind_blob64(
               stmt,
               i,
               b.as_ptr().cast(),
               b.len() as u64,
               SQLITE_TRANSIENT(),
            ),
            Value::ZeroBlob(len) => sqlite3_bind_zeroblob64(stmt, i, *len),
         }
      };

      self.check(stmt, rc)?;
      Ok(self)
   }

   /// Binds every parameter in order. `None` binds NULL.
   ///
   /// Fails with [`Error::BindCount`] unless exactly one value is given per
   /// parameter.
   pub fn bind_all(&mut self, values: &[Option<Value>]) -> Result<()> {
      self.handle()?;
      if values.len() != self.bind_parameter_count {
         return Err(Error::BindCount {
            expected: self.bind_parameter_count,
            actual: values.len(),
         });
      }

      for (offset, value) in values.iter().enumerate() {
         match value {
            Some(value) => self.bind_value(offset + 1, value)?,
            None => self.bind_value(offset + 1, &Value::Null)?,
         };
      }
      Ok(())
   }

   /// Name of the 1-based parameter `index` (including its `:`, `@` or `$`
   /// prefix), or `None` for unnamed parameters and bad indices.
   pub fn bind_parameter_name(&self, index: usize) -> Option<String> {
      let stmt = self.handle().ok()?;
      let i = c_int::try_from(index).ok()?;
      let name = unsafe { sqlite3_bind_parameter_name(stmt, i) };
      (!name.is_null()).then(|| unsafe { c_message(name) })
   }

   /// 1-based index of the named parameter.
   pub fn bind_parameter_index(&self, name: &str) -> Option<usize> {
      let stmt = self.handle().ok()?;
      let name = CString::new(name).ok()?;
      match unsafe { sqlite3_bind_parameter_index(stmt, name.as_ptr()) } {
         0 => None,
         index => Some(index as usize),
      }
   }

   /// Sets every parameter back to NULL.
   pub fn clear_bindings(&mut self) -> Result<()> {
      let stmt = self.handle()?;
      let rc = unsafe { sqlite3_clear_bindings(stmt) };
      self.check(stmt, rc)
   }

   /// Advances to the next row, retrying busy results up to the connection's
   /// `busy_retry_max`.
   ///
   /// Returns `true` when a row is ready and `false` when execution finished;
   /// in the latter case the statement has already been reset.
   pub fn step(&mut self) -> Result<bool> {
      self.step_with_retry(Retry::Default)
   }

   /// [`step`](Self::step) with an explicit retry budget.
   pub fn step_with_retry(&mut self, retry: Retry) -> Result<bool> {
      self.step_using(retry, |stmt| unsafe { sqlite3_step(stmt) }, std::thread::sleep)
   }

   /// The stepping protocol with the single-step primitive and the sleeper
   /// supplied by the caller.
   pub(crate) fn step_using(
      &mut self,
      retry: Retry,
      mut step: impl FnMut(*mut sqlite3_stmt) -> c_int,
      sleep: impl FnMut(Duration),
   ) -> Result<bool> {
      let stmt = self.handle()?;
      let attempts = retry.attempts(self.conn.busy_retry_max());

      self.use_count += 1;
      self.conn.record_use();
      self.state = StatementState::Stepping;

      let mut busy = 0u64;
      let rc = retry::step_with_backoff(attempts, || step(stmt), |_| busy += 1, sleep);
      self.busy_count += busy;
      self.conn.record_busy(busy);

      match ResultCode::from_code(rc).primary() {
         ResultCode::Row => {
            self.record_success();
            self.state = StatementState::HasRow;
            Ok(true)
         }
         ResultCode::Done => {
            self.record_success();
            // Reset after DONE only reports errors from the step itself.
            unsafe { sqlite3_reset(stmt) };
            self.state = StatementState::Ready;
            Ok(false)
         }
         code => {
            self.state = StatementState::Failed;
            let err = self.error(stmt, rc);
            if code.is_busy_class() {
               warn!(attempts, busy, sql = %self.sql, "Busy retries exhausted");
            }
            Err(err)
         }
      }
   }

   fn record_success(&mut self) {
      self.success_count += 1;
      self.conn.record_success();
   }

   /// Rewinds to before the first row. Bindings are kept.
   ///
   /// A no-op on a statement that is already [`StatementState::Ready`].
   pub fn reset(&mut self) -> Result<()> {
      let stmt = self.handle()?;
      if self.state == StatementState::Ready {
         return Ok(());
      }

      // The return value repeats the last step's error, if any; the reset
      // itself always succeeds.
      unsafe { sqlite3_reset(stmt) };
      self.state = StatementState::Ready;
      Ok(())
   }

   /// [`reset`](Self::reset) followed by [`clear_bindings`](Self::clear_bindings).
   pub fn reset_and_clear(&mut self) -> Result<()> {
      self.reset()?;
      self.clear_bindings()
   }

   /// Releases the native statement. Calling it again is a no-op, as is
   /// calling it after the connection has closed.
   pub fn finalize(&mut self) -> Result<()> {
      if self.stmt.is_null() {
         return Ok(());
      }

      // A closed connection already finalized every statement it owned.
      if self.conn.is_open() {
         unsafe { sqlite3_finalize(self.stmt) };
      }
      self.stmt = std::ptr::null_mut();
      self.state = StatementState::Finalized;
      trace!(sql = %self.sql, "Finalized statement");
      Ok(())
   }

   pub fn is_readonly(&self) -> Result<bool> {
      let stmt = self.handle()?;
      Ok(unsafe { sqlite3_stmt_readonly(stmt) } != 0)
   }

   /// True for `EXPLAIN` and `EXPLAIN QUERY PLAN` statements.
   pub fn is_explain(&self) -> Result<bool> {
      let stmt = self.handle()?;
      Ok(unsafe { sqlite3_stmt_isexplain(stmt) } != 0)
   }

   /// True once stepped but not yet run to completion or reset.
   pub fn is_busy(&self) -> Result<bool> {
      let stmt = self.handle()?;
      Ok(unsafe { sqlite3_stmt_busy(stmt) } != 0)
   }

   /// Columns in the current row; zero when no row is available.
   pub fn data_count(&self) -> Result<usize> {
      let stmt = self.handle()?;
      Ok(unsafe { sqlite3_data_count(stmt) }.max(0) as usize)
   }

   pub fn status(&self, op: StmtStatus, reset: bool) -> Result<i32> {
      let stmt = self.handle()?;
      Ok(unsafe { sqlite3_stmt_status(stmt, op.code(), reset as c_int) })
   }

   /// Handle and column number for a read of the current row, if possible.
   fn cell(&self, column: impl ColumnIndex) -> Option<(*mut sqlite3_stmt, c_int)> {
      let stmt = self.handle().ok()?;
      if self.state != StatementState::HasRow {
         return None;
      }
      let index = column.index_in(self)?;
      Some((stmt, index as c_int))
   }

   /// Storage class of a column in the current row.
   pub fn column_type(&self, column: impl ColumnIndex) -> Option<ColumnType> {
      let (stmt, i) = self.cell(column)?;
      ColumnType::from_code(unsafe { sqlite3_column_type(stmt, i) })
   }

   fn is_null_cell(stmt: *mut sqlite3_stmt, i: c_int) -> bool {
      unsafe { sqlite3_column_type(stmt, i) == ColumnType::Null.code() }
   }

   /// Column as a 32-bit integer, or `-1` when unavailable. Wider values are
   /// truncated.
   pub fn int(&self, column: impl ColumnIndex) -> i32 {
      self.cell(column).map_or(-1, |(stmt, i)| unsafe { sqlite3_column_int64(stmt, i) } as i32)
   }

   /// Column as a 64-bit integer, or `-1` when unavailable.
   pub fn int64(&self, column: impl ColumnIndex) -> i64 {
      self.cell(column).map_or(-1, |(stmt, i)| unsafe { sqlite3_column_int64(stmt, i) })
   }

   /// Column as a float, or `-1.0` when unavailable.
   pub fn double(&self, column: impl ColumnIndex) -> f64 {
      self.cell(column).map_or(-1.0, |(stmt, i)| unsafe { sqlite3_column_double(stmt, i) })
   }

   /// Column as a boolean (non-zero integer), or `false` when unavailable.
   pub fn bool(&self, column: impl ColumnIndex) -> bool {
      self.cell(column).is_some_and(|(stmt, i)| unsafe { sqlite3_column_int64(stmt, i) } != 0)
   }

   /// Column as text, or `""` when unavailable. NULL also reads as `""`.
   pub fn string(&self, column: impl ColumnIndex) -> String {
      self.cell(column).map_or_else(String::new, |(stmt, i)| unsafe { column_text(stmt, i) })
   }

   /// Column as bytes. `None` when unavailable or NULL.
   pub fn blob(&self, column: impl ColumnIndex) -> Option<Vec<u8>> {
      let (stmt, i) = self.cell(column)?;
      if Self::is_null_cell(stmt, i) {
         return None;
      }

      // SAFETY: blob must be read before bytes; the pointer is valid until the
      // next step, reset or type conversion on this column.
      let data = unsafe { sqlite3_column_blob(stmt, i) };
      let len = unsafe { sqlite3_column_bytes(stmt, i) }.max(0) as usize;
      if data.is_null() || len == 0 {
         return Some(Vec::new());
      }
      Some(unsafe { std::slice::from_raw_parts(data as *const u8, len) }.to_vec())
   }

   /// Column as text. `None` when unavailable or NULL.
   pub fn optional_string(&self, column: impl ColumnIndex) -> Option<String> {
      let (stmt, i) = self.cell(column)?;
      (!Self::is_null_cell(stmt, i)).then(|| unsafe { column_text(stmt, i) })
   }

   /// Column as a 64-bit integer. `None` when unavailable or NULL.
   pub fn optional_int64(&self, column: impl ColumnIndex) -> Option<i64> {
      let (stmt, i) = self.cell(column)?;
      (!Self::is_null_cell(stmt, i)).then(|| unsafe { sqlite3_column_int64(stmt, i) })
   }

   /// Column as a float. `None` when unavailable or NULL.
   pub fn optional_double(&self, column: impl ColumnIndex) -> Option<f64> {
      let (stmt, i) = self.cell(column)?;
      (!Self::is_null_cell(stmt, i)).then(|| unsafe { sqlite3_column_double(stmt, i) })
   }

   /// Column copied out with its storage class. [`SqliteValue::Null`] when
   /// unavailable.
   pub fn value(&self, column: impl ColumnIndex) -> SqliteValue {
      self.cell(column).map_or(SqliteValue::Null, |(stmt, i)| unsafe {
         SqliteValue::from_raw(sqlite3_column_value(stmt, i))
      })
   }
}

impl Drop for Statement {
   fn drop(&mut self) {
      let _ = self.finalize();
   }
}

/// Reads column text.
///
/// # Safety
///
/// `stmt` must be live with a current row and `i` a valid column.
unsafe fn column_text(stmt: *mut sqlite3_stmt, i: c_int) -> String {
   // Text before bytes, so the byte count is of the UTF-8 form.
   let text = unsafe { sqlite3_column_text(stmt, i) };
   let len = unsafe { sqlite3_column_bytes(stmt, i) }.max(0) as usize;
   if text.is_null() {
      return String::new();
   }
   let bytes = unsafe { std::slice::from_raw_parts(text, len) };
   String::from_utf8_lossy(bytes).into_owned()
}

fn expanded_sql(stmt: *mut sqlite3_stmt) -> Option<String> {
   // SAFETY: stmt is live; the returned buffer is ours to free.
   let expanded = unsafe { sqlite3_expanded_sql(stmt) };
   if expanded.is_null() {
      return None;
   }
   let sql = unsafe { c_message(expanded) };
   unsafe { sqlite3_free(expanded.cast()) };
   Some(sql)
}
