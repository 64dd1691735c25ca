//! Application-defined scalar SQL functions.
//!
//! The Rust closure lives in a heap context handed to the engine as the
//! function's user data. The engine calls `destroy_function` when the
//! function is replaced, removed or the connection closes; the context is
//! then retired through the connection's [`CallbackScope`] so a function that
//! replaces itself while running is not freed under its own feet.

use std::ffi::{CStr, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use libsqlite3_sys::{
   SQLITE_TRANSIENT, SQLITE_UTF8, sqlite3, sqlite3_context, sqlite3_create_function_v2,
   sqlite3_result_blob64, sqlite3_result_double, sqlite3_result_error,
   sqlite3_result_error_code, sqlite3_result_int64, sqlite3_result_null, sqlite3_result_text64,
   sqlite3_result_zeroblob64, sqlite3_user_data, sqlite3_value,
};
use parking_lot::Mutex;
use sqlite3_hooks::{CallbackScope, SqliteValue};

use crate::codes::ResultCode;
use crate::enums::TextEncoding;
use crate::flags::FunctionFlags;
use crate::value::Value;
use crate::{Error, Result};

struct FunctionContext<F> {
   scope: Rc<CallbackScope>,
   callback: Mutex<F>,
}

/// Registers `callback` as the scalar function `name` taking `n_args`
/// arguments (-1 for any number). Returns the engine's result code.
///
/// # Safety
///
/// `db` must be a valid, open connection whose callbacks share `scope`.
pub(crate) unsafe fn register<F>(
   db: *mut sqlite3,
   scope: &Rc<CallbackScope>,
   name: &CStr,
   n_args: c_int,
   flags: FunctionFlags,
   callback: F,
) -> c_int
where
   F: FnMut(&[SqliteValue]) -> Result<Value> + 'static,
{
   let context = Box::new(FunctionContext {
      scope: Rc::clone(scope),
      callback: Mutex::new(callback),
   });
   let user_data = Box::into_raw(context) as *mut c_void;

   // SAFETY: the engine owns user_data from here on and releases it through
   // destroy_function, including when registration fails.
   unsafe {
      sqlite3_create_function_v2(
         db,
         name.as_ptr(),
         n_args,
         SQLITE_UTF8 | flags.bits(),
         user_data,
         Some(call_function::<F>),
         None,
         None,
         Some(destroy_function::<F>),
      )
   }
}

unsafe extern "C" fn call_function<F>(
   ctx: *mut sqlite3_context,
   argc: c_int,
   argv: *mut *mut sqlite3_value,
) where
   F: FnMut(&[SqliteValue]) -> Result<Value> + 'static,
{
   // SAFETY: ctx is the live call context for this invocation.
   let user_data = unsafe { sqlite3_user_data(ctx) };
   if user_data.is_null() {
      return;
   }

   let outcome = catch_unwind(AssertUnwindSafe(|| {
      // SAFETY: argv holds argc values valid for this call.
      let args: Vec<SqliteValue> = (0..argc.max(0) as usize)
         .map(|i| unsafe { SqliteValue::from_raw(*argv.add(i)) })
         .collect();

      // SAFETY: the context is live on entry and only released through the
      // scope, which defers the release while the guard is held.
      let scope = Rc::clone(&unsafe { &*(user_data as *const FunctionContext<F>) }.scope);
      let _running = scope.enter();
      let context = unsafe { &*(user_data as *const FunctionContext<F>) };
      context.callback.try_lock().map(|mut callback| callback(&args))
   }));

   // SAFETY: ctx is still the live call context.
   unsafe {
      match outcome {
         Ok(Some(Ok(value))) => set_result(ctx, &value),
         Ok(Some(Err(err))) => set_error(ctx, &error_message(&err), error_code(&err)),
         Ok(None) => set_error(
            ctx,
            "application-defined function called itself recursively",
            ResultCode::Misuse,
         ),
         Err(_) => {
            eprintln!("sqlite3-conn: panic in scalar function (absorbed to prevent UB)");
            set_error(ctx, "application-defined function panicked", ResultCode::Error);
         }
      }
   }
}

unsafe extern "C" fn destroy_function<F>(user_data: *mut c_void)
where
   F: FnMut(&[SqliteValue]) -> Result<Value> + 'static,
{
   if user_data.is_null() {
      return;
   }

   let result = catch_unwind(AssertUnwindSafe(|| {
      // SAFETY: user_data came from Box::into_raw in register and the engine
      // calls this exactly once.
      let context = unsafe { Box::from_raw(user_data as *mut FunctionContext<F>) };
      let scope = Rc::clone(&context.scope);
      scope.retire(context);
   }));

   if result.is_err() {
      eprintln!("sqlite3-conn: panic while releasing a function (absorbed to prevent UB)");
   }
}

fn error_message(err: &Error) -> String {
   match err {
      Error::Sqlite { message, .. } => message.clone(),
      other => other.to_string(),
   }
}

fn error_code(err: &Error) -> ResultCode {
   match err.result_code() {
      Some(code) if code != ResultCode::Ok => code,
      _ => ResultCode::Error,
   }
}

/// # Safety
///
/// `ctx` must be a live function call context.
unsafe fn set_result(ctx: *mut sqlite3_context, value: &Value) {
   // SAFETY: text and blob bytes are copied by the engine (SQLITE_TRANSIENT).
   unsafe {
      match value {
         Value::Null => sqlite3_result_null(ctx),
         Value::Bool(b) => sqlite3_result_int64(ctx, i64::from(*b)),
         Value::Integer(v) => sqlite3_result_int64(ctx, *v),
         Value::Real(v) => sqlite3_result_double(ctx, *v),
         Value::Text(s) => sqlite3_result_text64(
            ctx,
            s.as_ptr().cast(),
            s.len() as u64,
            SQLITE_TRANSIENT(),
            TextEncoding::Utf8.code() as u8,
         ),
         Value::Blob(b) => {
            sqlite3_result_blob64(ctx, b.as_ptr().cast(), b.len() as u64, SQLITE_TRANSIENT())
         }
         Value::ZeroBlob(len) => {
            if sqlite3_result_zeroblob64(ctx, *len) != 0 {
               sqlite3_result_error_code(ctx, ResultCode::TooBig.code());
            }
         }
      }
   }
}

/// # Safety
///
/// `ctx` must be a live function call context.
unsafe fn set_error(ctx: *mut sqlite3_context, message: &str, code: ResultCode) {
   let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
   // SAFETY: the message is copied by the engine; a length is given so no
   // NUL terminator is needed.
   unsafe {
      sqlite3_result_error(ctx, message.as_ptr().cast(), len);
      sqlite3_result_error_code(ctx, code.code());
   }
}
