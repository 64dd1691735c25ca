//! Owned SQLite values extracted from raw `sqlite3_value` pointers.

use libsqlite3_sys::{
   SQLITE_BLOB, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_NULL, SQLITE_TEXT, sqlite3_value,
   sqlite3_value_blob, sqlite3_value_bytes, sqlite3_value_double, sqlite3_value_int64,
   sqlite3_value_text, sqlite3_value_type,
};

/// A SQLite value copied out of the engine.
///
/// Represents the typed value of a result column (or hook argument) using
/// SQLite's five storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum SqliteValue {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl SqliteValue {
   /// Extracts a value from a raw sqlite3_value pointer.
   ///
   /// # Safety
   ///
   /// The pointer must be null or point to a valid sqlite3_value that stays
   /// valid for the duration of this call.
   pub unsafe fn from_raw(value: *mut sqlite3_value) -> Self {
      if value.is_null() {
         return SqliteValue::Null;
      }

      // SAFETY: value is non-null and valid per the caller's contract.
      match unsafe { sqlite3_value_type(value) } {
         SQLITE_NULL => SqliteValue::Null,
         SQLITE_INTEGER => SqliteValue::Integer(unsafe { sqlite3_value_int64(value) }),
         SQLITE_FLOAT => SqliteValue::Real(unsafe { sqlite3_value_double(value) }),
         SQLITE_TEXT => {
            // sqlite3_value_text must run before sqlite3_value_bytes so the
            // byte count refers to the UTF-8 representation.
            let text_ptr = unsafe { sqlite3_value_text(value) };
            let len = unsafe { sqlite3_value_bytes(value) } as usize;
            if text_ptr.is_null() {
               SqliteValue::Null
            } else {
               // SAFETY: text_ptr is non-null and len bytes are valid until the
               // value is next modified, which cannot happen during this call.
               let bytes = unsafe { std::slice::from_raw_parts(text_ptr, len) };
               SqliteValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
         }
         SQLITE_BLOB => {
            let blob_ptr = unsafe { sqlite3_value_blob(value) };
            let len = unsafe { sqlite3_value_bytes(value) } as usize;
            if blob_ptr.is_null() || len == 0 {
               SqliteValue::Blob(Vec::new())
            } else {
               // SAFETY: blob_ptr is non-null and len bytes are valid for this call
               let slice = unsafe { std::slice::from_raw_parts(blob_ptr as *const u8, len) };
               SqliteValue::Blob(slice.to_vec())
            }
         }
         _ => SqliteValue::Null,
      }
   }

   /// Returns true if this value is null.
   pub fn is_null(&self) -> bool {
      matches!(self, SqliteValue::Null)
   }

   /// Attempts to get this value as an integer.
   pub fn as_integer(&self) -> Option<i64> {
      match self {
         SqliteValue::Integer(i) => Some(*i),
         _ => None,
      }
   }

   /// Attempts to get this value as a float. Integers are widened.
   pub fn as_real(&self) -> Option<f64> {
      match self {
         SqliteValue::Real(r) => Some(*r),
         SqliteValue::Integer(i) => Some(*i as f64),
         _ => None,
      }
   }

   /// Attempts to get this value as a string reference.
   pub fn as_text(&self) -> Option<&str> {
      match self {
         SqliteValue::Text(s) => Some(s),
         _ => None,
      }
   }

   /// Attempts to get this value as a blob reference.
   pub fn as_blob(&self) -> Option<&[u8]> {
      match self {
         SqliteValue::Blob(b) => Some(b),
         _ => None,
      }
   }
}
