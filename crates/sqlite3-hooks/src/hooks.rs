//! SQLite native hook registration for a single connection.
//!
//! Every hook category stores its listener in a heap-allocated context whose
//! address is handed to SQLite as the callback's user data. The context is
//! owned by [`HookRegistry`], so a listener lives exactly as long as SQLite may
//! call it: replacing a listener installs the new pointer first and only then
//! retires the previous context through the connection's [`CallbackScope`].
//! A context replaced from inside a running callback is released after the
//! outermost callback returns.
//!
//! Callbacks catch panics so unwinding never crosses the FFI boundary, and a
//! listener that re-enters its own connection's hook (for example by running
//! SQL from inside a commit hook) is skipped instead of aliasing the closure.

use std::ffi::{CStr, c_char, c_int, c_uint, c_void};
use std::panic::catch_unwind;
use std::ptr;
use std::rc::Rc;
use std::time::Duration;

use bitflags::bitflags;
use libsqlite3_sys::{
   SQLITE_DELETE, SQLITE_INSERT, SQLITE_OK, SQLITE_UPDATE, sqlite3, sqlite3_busy_handler,
   sqlite3_commit_hook, sqlite3_int64, sqlite3_progress_handler, sqlite3_rollback_hook,
   sqlite3_sql, sqlite3_stmt, sqlite3_trace_v2, sqlite3_update_hook,
};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::scope::CallbackScope;
use crate::{Error, Result};

/// Called when a table is locked. Receives the number of prior invocations for
/// the same locking event; return `true` to keep waiting, `false` to give up
/// and let the operation fail with `SQLITE_BUSY`.
pub type BusyHandler = Box<dyn FnMut(u32) -> bool>;

/// Called periodically during long-running statements. Return `true` to
/// interrupt the operation (it fails with `SQLITE_INTERRUPT`).
pub type ProgressHandler = Box<dyn FnMut() -> bool>;

/// Called when a transaction is about to commit. Return `true` to turn the
/// commit into a rollback.
pub type CommitHook = Box<dyn FnMut() -> bool>;

/// Called after a transaction has been rolled back.
pub type RollbackHook = Box<dyn FnMut()>;

/// Called for each row inserted, updated or deleted in a rowid table.
pub type UpdateHook = Box<dyn FnMut(&UpdateEvent<'_>)>;

/// Called for each traced event selected by a [`TraceMask`].
pub type TraceHook = Box<dyn FnMut(&TraceEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOperation {
   Insert,
   Update,
   Delete,
}

/// Row change reported by the update hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateEvent<'a> {
   pub operation: UpdateOperation,
   /// Schema name, usually `main`.
   pub database: &'a str,
   pub table: &'a str,
   pub rowid: i64,
}

bitflags! {
   /// Selects which events `sqlite3_trace_v2` reports.
   #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
   pub struct TraceMask: u32 {
      /// A prepared statement starts running.
      const STMT = 0x01;
      /// A prepared statement finishes, with its elapsed time.
      const PROFILE = 0x02;
      /// A prepared statement produces a row.
      const ROW = 0x04;
      /// The connection closes.
      const CLOSE = 0x08;
   }
}

/// Event delivered to a [`TraceHook`].
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
   /// Statement text as it begins to run (triggers report `-- name`).
   Statement { sql: String },
   /// Statement text and wall-clock time once it finished.
   Profile { sql: String, elapsed: Duration },
   Row,
   Close,
}

/// Heap context passed to SQLite as callback user data.
struct HookContext<F> {
   scope: Rc<CallbackScope>,
   callback: Mutex<F>,
}

impl<F> HookContext<F> {
   fn boxed(scope: &Rc<CallbackScope>, callback: F) -> Box<Self> {
      Box::new(Self {
         scope: Rc::clone(scope),
         callback: Mutex::new(callback),
      })
   }

   fn as_ptr(&self) -> *mut c_void {
      self as *const Self as *mut c_void
   }

   /// Runs `f` against the listener behind `user_data`, or returns `None` when
   /// the listener is already running further up the stack.
   ///
   /// # Safety
   ///
   /// `user_data` must point to a live `HookContext<F>` installed by a
   /// [`HookRegistry`].
   unsafe fn invoke<R>(user_data: *mut c_void, f: impl FnOnce(&mut F) -> R) -> Option<R> {
      // SAFETY: the context is live on entry, and while the guard is held a
      // replaced context is parked in the scope instead of being freed.
      let scope = Rc::clone(&unsafe { &*(user_data as *const Self) }.scope);
      let _running = scope.enter();
      let context = unsafe { &*(user_data as *const Self) };
      context.callback.try_lock().map(|mut callback| f(&mut callback))
   }
}

/// Swaps the context in `slot`, handing the previous one to the scope.
fn swap_context<F: 'static>(
   scope: &CallbackScope,
   slot: &mut Option<Box<HookContext<F>>>,
   next: Option<Box<HookContext<F>>>,
) {
   if let Some(previous) = std::mem::replace(slot, next) {
      scope.retire(previous);
   }
}

/// Listeners installed on one connection, at most one per category.
///
/// The registry must be cleared (or the connection closed) before it is
/// dropped, otherwise SQLite would keep pointers to freed contexts. The
/// owning connection guarantees this ordering.
#[derive(Default)]
pub struct HookRegistry {
   scope: Rc<CallbackScope>,
   busy: Option<Box<HookContext<BusyHandler>>>,
   progress: Option<Box<HookContext<ProgressHandler>>>,
   commit: Option<Box<HookContext<CommitHook>>>,
   rollback: Option<Box<HookContext<RollbackHook>>>,
   update: Option<Box<HookContext<UpdateHook>>>,
   trace: Option<Box<HookContext<TraceHook>>>,
}

impl std::fmt::Debug for HookRegistry {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("HookRegistry")
         .field("busy", &self.busy.is_some())
         .field("progress", &self.progress.is_some())
         .field("commit", &self.commit.is_some())
         .field("rollback", &self.rollback.is_some())
         .field("update", &self.update.is_some())
         .field("trace", &self.trace.is_some())
         .finish()
   }
}

impl HookRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Creates a registry whose listeners share `scope` with other callbacks
   /// registered on the same connection.
   pub fn with_scope(scope: Rc<CallbackScope>) -> Self {
      Self {
         scope,
         ..Self::default()
      }
   }

   pub fn scope(&self) -> &Rc<CallbackScope> {
      &self.scope
   }

   /// Returns true if no listener of any category is installed.
   pub fn is_empty(&self) -> bool {
      self.busy.is_none()
         && self.progress.is_none()
         && self.commit.is_none()
         && self.rollback.is_none()
         && self.update.is_none()
         && self.trace.is_none()
   }

   pub fn has_busy_handler(&self) -> bool {
      self.busy.is_some()
   }

   pub fn has_progress_handler(&self) -> bool {
      self.progress.is_some()
   }

   /// Installs or removes the busy handler.
   ///
   /// # Safety
   ///
   /// `db` must be a valid, open sqlite3 connection used only from this thread.
   pub unsafe fn set_busy_handler(
      &mut self,
      db: *mut sqlite3,
      handler: Option<BusyHandler>,
   ) -> Result<()> {
      let context = handler.map(|handler| HookContext::boxed(&self.scope, handler));

      // SAFETY: db is valid (caller contract); the context pointer stays valid
      // until it is replaced in this registry.
      let rc = unsafe {
         match &context {
            Some(ctx) => sqlite3_busy_handler(db, Some(busy_callback), ctx.as_ptr()),
            None => sqlite3_busy_handler(db, None, ptr::null_mut()),
         }
      };

      if rc != SQLITE_OK {
         return Err(Error::HookRegistration(format!(
            "sqlite3_busy_handler returned {rc}"
         )));
      }

      trace!(installed = context.is_some(), "Busy handler replaced");
      swap_context(&self.scope, &mut self.busy, context);
      Ok(())
   }

   /// Drops the busy handler context after SQLite replaced it internally.
   ///
   /// `sqlite3_busy_timeout` installs its own busy handler, so any listener
   /// previously registered here is no longer reachable from SQLite.
   pub fn forget_busy_handler(&mut self) {
      if let Some(previous) = self.busy.take() {
         self.scope.retire(previous);
         debug!("Busy handler superseded by busy timeout");
      }
   }

   /// Installs or removes the progress handler, invoked roughly every
   /// `instructions` virtual machine instructions. Zero or `None` disables it.
   ///
   /// # Safety
   ///
   /// `db` must be a valid, open sqlite3 connection used only from this thread.
   pub unsafe fn set_progress_handler(
      &mut self,
      db: *mut sqlite3,
      instructions: u32,
      handler: Option<ProgressHandler>,
   ) {
      let context = match handler {
         Some(handler) if instructions > 0 => Some(HookContext::boxed(&self.scope, handler)),
         _ => None,
      };
      let n = instructions.min(c_int::MAX as u32) as c_int;

      // SAFETY: see set_busy_handler
      unsafe {
         match &context {
            Some(ctx) => sqlite3_progress_handler(db, n, Some(progress_callback), ctx.as_ptr()),
            None => sqlite3_progress_handler(db, 0, None, ptr::null_mut()),
         }
      }

      trace!(
         installed = context.is_some(),
         instructions, "Progress handler replaced"
      );
      swap_context(&self.scope, &mut self.progress, context);
   }

   /// Installs or removes the commit hook.
   ///
   /// # Safety
   ///
   /// `db` must be a valid, open sqlite3 connection used only from this thread.
   pub unsafe fn set_commit_hook(&mut self, db: *mut sqlite3, hook: Option<CommitHook>) {
      let context = hook.map(|hook| HookContext::boxed(&self.scope, hook));

      // SAFETY: see set_busy_handler. The previous user data returned by
      // SQLite is owned by this registry and released below.
      unsafe {
         match &context {
            Some(ctx) => sqlite3_commit_hook(db, Some(commit_callback), ctx.as_ptr()),
            None => sqlite3_commit_hook(db, None, ptr::null_mut()),
         };
      }

      trace!(installed = context.is_some(), "Commit hook replaced");
      swap_context(&self.scope, &mut self.commit, context);
   }

   /// Installs or removes the rollback hook.
   ///
   /// # Safety
   ///
   /// `db` must be a valid, open sqlite3 connection used only from this thread.
   pub unsafe fn set_rollback_hook(&mut self, db: *mut sqlite3, hook: Option<RollbackHook>) {
      let context = hook.map(|hook| HookContext::boxed(&self.scope, hook));

      // SAFETY: see set_commit_hook
      unsafe {
         match &context {
            Some(ctx) => sqlite3_rollback_hook(db, Some(rollback_callback), ctx.as_ptr()),
            None => sqlite3_rollback_hook(db, None, ptr::null_mut()),
         };
      }

      trace!(installed = context.is_some(), "Rollback hook replaced");
      swap_context(&self.scope, &mut self.rollback, context);
   }

   /// Installs or removes the update hook.
   ///
   /// # Safety
   ///
   /// `db` must be a valid, open sqlite3 connection used only from this thread.
   pub unsafe fn set_update_hook(&mut self, db: *mut sqlite3, hook: Option<UpdateHook>) {
      let context = hook.map(|hook| HookContext::boxed(&self.scope, hook));

      // SAFETY: see set_commit_hook
      unsafe {
         match &context {
            Some(ctx) => sqlite3_update_hook(db, Some(update_callback), ctx.as_ptr()),
            None => sqlite3_update_hook(db, None, ptr::null_mut()),
         };
      }

      trace!(installed = context.is_some(), "Update hook replaced");
      swap_context(&self.scope, &mut self.update, context);
   }

   /// Installs or removes the trace listener. An empty mask disables tracing.
   ///
   /// # Safety
   ///
   /// `db` must be a valid, open sqlite3 connection used only from this thread.
   pub unsafe fn set_trace(
      &mut self,
      db: *mut sqlite3,
      mask: TraceMask,
      hook: Option<TraceHook>,
   ) -> Result<()> {
      let context = match hook {
         Some(hook) if !mask.is_empty() => Some(HookContext::boxed(&self.scope, hook)),
         _ => None,
      };

      // SAFETY: see set_busy_handler
      let rc = unsafe {
         match &context {
            Some(ctx) => sqlite3_trace_v2(
               db,
               mask.bits() as c_uint,
               Some(trace_callback),
               ctx.as_ptr(),
            ),
            None => sqlite3_trace_v2(db, 0, None, ptr::null_mut()),
         }
      };

      if rc != SQLITE_OK {
         return Err(Error::HookRegistration(format!(
            "sqlite3_trace_v2 returned {rc}"
         )));
      }

      trace!(installed = context.is_some(), ?mask, "Trace listener replaced");
      swap_context(&self.scope, &mut self.trace, context);
      Ok(())
   }

   /// Unregisters every listener and frees their contexts.
   ///
   /// # Safety
   ///
   /// `db` must be the valid, open connection these listeners were installed on.
   pub unsafe fn clear(&mut self, db: *mut sqlite3) {
      if self.is_empty() {
         return;
      }

      // SAFETY: passing null callbacks and null user data removes each hook.
      unsafe {
         sqlite3_busy_handler(db, None, ptr::null_mut());
         sqlite3_progress_handler(db, 0, None, ptr::null_mut());
         sqlite3_commit_hook(db, None, ptr::null_mut());
         sqlite3_rollback_hook(db, None, ptr::null_mut());
         sqlite3_update_hook(db, None, ptr::null_mut());
         sqlite3_trace_v2(db, 0, None, ptr::null_mut());
      }

      let scope = Rc::clone(&self.scope);
      swap_context(&scope, &mut self.busy, None);
      swap_context(&scope, &mut self.progress, None);
      swap_context(&scope, &mut self.commit, None);
      swap_context(&scope, &mut self.rollback, None);
      swap_context(&scope, &mut self.update, None);
      swap_context(&scope, &mut self.trace, None);
      debug!("All connection hooks unregistered");
   }
}

unsafe extern "C" fn busy_callback(user_data: *mut c_void, attempts: c_int) -> c_int {
   if user_data.is_null() {
      return 0;
   }

   let result = catch_unwind(|| {
      // SAFETY: user_data is a HookContext<BusyHandler> owned by a HookRegistry.
      let retry = unsafe {
         HookContext::<BusyHandler>::invoke(user_data, |handler| handler(attempts.max(0) as u32))
      };
      retry.unwrap_or(false)
   });

   match result {
      Ok(retry) => retry as c_int,
      Err(_) => {
         eprintln!("sqlite3-hooks: panic in busy_callback (absorbed to prevent UB)");
         0
      }
   }
}

unsafe extern "C" fn progress_callback(user_data: *mut c_void) -> c_int {
   if user_data.is_null() {
      return 0;
   }

   let result = catch_unwind(|| {
      // SAFETY: see busy_callback
      let interrupt =
         unsafe { HookContext::<ProgressHandler>::invoke(user_data, |handler| handler()) };
      interrupt.unwrap_or(false)
   });

   match result {
      Ok(interrupt) => interrupt as c_int,
      Err(_) => {
         eprintln!("sqlite3-hooks: panic in progress_callback (absorbed to prevent UB)");
         1
      }
   }
}

/// Returning non-zero turns the commit into a rollback.
unsafe extern "C" fn commit_callback(user_data: *mut c_void) -> c_int {
   if user_data.is_null() {
      return 0;
   }

   let result = catch_unwind(|| {
      trace!("Commit hook fired");
      // SAFETY: see busy_callback
      let rollback = unsafe { HookContext::<CommitHook>::invoke(user_data, |hook| hook()) };
      rollback.unwrap_or(false)
   });

   match result {
      Ok(rollback) => rollback as c_int,
      Err(_) => {
         eprintln!("sqlite3-hooks: panic in commit_callback (absorbed to prevent UB)");
         1
      }
   }
}

unsafe extern "C" fn rollback_callback(user_data: *mut c_void) {
   if user_data.is_null() {
      return;
   }

   let result = catch_unwind(|| {
      trace!("Rollback hook fired");
      // SAFETY: see busy_callback
      unsafe { HookContext::<RollbackHook>::invoke(user_data, |hook| hook()) };
   });

   if result.is_err() {
      eprintln!("sqlite3-hooks: panic in rollback_callback (absorbed to prevent UB)");
   }
}

unsafe extern "C" fn update_callback(
   user_data: *mut c_void,
   op: c_int,
   database: *const c_char,
   table: *const c_char,
   rowid: sqlite3_int64,
) {
   if user_data.is_null() || database.is_null() || table.is_null() {
      return;
   }

   let result = catch_unwind(|| {
      let operation = match op {
         SQLITE_INSERT => UpdateOperation::Insert,
         SQLITE_UPDATE => UpdateOperation::Update,
         SQLITE_DELETE => UpdateOperation::Delete,
         _ => return,
      };

      // SAFETY: SQLite passes NUL-terminated names valid for this callback.
      let (Ok(database), Ok(table)) = (
         unsafe { CStr::from_ptr(database) }.to_str(),
         unsafe { CStr::from_ptr(table) }.to_str(),
      ) else {
         return;
      };

      let event = UpdateEvent {
         operation,
         database,
         table,
         rowid,
      };
      trace!(table = %table, ?operation, rowid, "Update hook fired");
      // SAFETY: see busy_callback
      unsafe { HookContext::<UpdateHook>::invoke(user_data, |hook| hook(&event)) };
   });

   if result.is_err() {
      eprintln!("sqlite3-hooks: panic in update_callback (absorbed to prevent UB)");
   }
}

unsafe extern "C" fn trace_callback(
   kind: c_uint,
   user_data: *mut c_void,
   p: *mut c_void,
   x: *mut c_void,
) -> c_int {
   if user_data.is_null() {
      return 0;
   }

   let result = catch_unwind(|| {
      let Some(kind) = TraceMask::from_bits(kind as u32) else {
         return;
      };

      let event = if kind == TraceMask::STMT {
         // SAFETY: for STMT events X is the NUL-terminated statement text.
         let sql = unsafe { c_text(x as *const c_char) };
         TraceEvent::Statement { sql }
      } else if kind == TraceMask::PROFILE {
         // SAFETY: for PROFILE events P is the statement and X points to the
         // elapsed nanoseconds.
         let sql = unsafe { c_text(sqlite3_sql(p as *mut sqlite3_stmt)) };
         let nanos = if x.is_null() {
            0
         } else {
            unsafe { *(x as *const i64) }
         };
         TraceEvent::Profile {
            sql,
            elapsed: Duration::from_nanos(nanos.max(0) as u64),
         }
      } else if kind == TraceMask::ROW {
         TraceEvent::Row
      } else if kind == TraceMask::CLOSE {
         TraceEvent::Close
      } else {
         return;
      };

      // SAFETY: see busy_callback
      unsafe { HookContext::<TraceHook>::invoke(user_data, |hook| hook(&event)) };
   });

   if result.is_err() {
      eprintln!("sqlite3-hooks: panic in trace_callback (absorbed to prevent UB)");
   }

   0
}

/// Copies a possibly-null C string.
///
/// # Safety
///
/// `text` must be null or a valid NUL-terminated string.
unsafe fn c_text(text: *const c_char) -> String {
   if text.is_null() {
      return String::new();
   }
   unsafe { CStr::from_ptr(text) }
      .to_string_lossy()
      .into_owned()
}
