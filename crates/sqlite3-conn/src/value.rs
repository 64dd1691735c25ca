//! Values bound to statement parameters and column storage classes.

pub use sqlite3_hooks::SqliteValue;

/// A value that can be bound to a statement parameter.
///
/// Integer types are widened to `i64` and `f32` to `f64` on conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
   Null,
   Bool(bool),
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
   /// A blob of the given length filled with zeroes.
   ZeroBlob(u64),
}

macro_rules! integer_into_value {
   ($($ty:ty),*) => {
      $(
         impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
               Value::Integer(i64::from(value))
            }
         }
      )*
   };
}

integer_into_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<isize> for Value {
   fn from(value: isize) -> Self {
      Value::Integer(value as i64)
   }
}

impl From<bool> for Value {
   fn from(value: bool) -> Self {
      Value::Bool(value)
   }
}

impl From<f32> for Value {
   fn from(value: f32) -> Self {
      Value::Real(f64::from(value))
   }
}

impl From<f64> for Value {
   fn from(value: f64) -> Self {
      Value::Real(value)
   }
}

impl From<&str> for Value {
   fn from(value: &str) -> Self {
      Value::Text(value.to_owned())
   }
}

impl From<String> for Value {
   fn from(value: String) -> Self {
      Value::Text(value)
   }
}

impl From<&[u8]> for Value {
   fn from(value: &[u8]) -> Self {
      Value::Blob(value.to_vec())
   }
}

impl From<Vec<u8>> for Value {
   fn from(value: Vec<u8>) -> Self {
      Value::Blob(value)
   }
}

impl<T: Into<Value>> From<Option<T>> for Value {
   fn from(value: Option<T>) -> Self {
      value.map_or(Value::Null, Into::into)
   }
}

impl From<SqliteValue> for Value {
   fn from(value: SqliteValue) -> Self {
      match value {
         SqliteValue::Null => Value::Null,
         SqliteValue::Integer(i) => Value::Integer(i),
         SqliteValue::Real(r) => Value::Real(r),
         SqliteValue::Text(s) => Value::Text(s),
         SqliteValue::Blob(b) => Value::Blob(b),
      }
   }
}

/// Storage class of a result column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
   Integer = 1,
   Float = 2,
   Text = 3,
   Blob = 4,
   Null = 5,
}

impl ColumnType {
   pub fn from_code(code: i32) -> Option<Self> {
      match code {
         1 => Some(ColumnType::Integer),
         2 => Some(ColumnType::Float),
         3 => Some(ColumnType::Text),
         4 => Some(ColumnType::Blob),
         5 => Some(ColumnType::Null),
         _ => None,
      }
   }

   pub fn code(self) -> i32 {
      self as i32
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_integers_widen() {
      assert_eq!(Value::from(7u8), Value::Integer(7));
      assert_eq!(Value::from(-3i16), Value::Integer(-3));
      assert_eq!(Value::from(u32::MAX), Value::Integer(4_294_967_295));
      assert_eq!(Value::from(1.5f32), Value::Real(1.5));
   }

   #[test]
   fn test_option_maps_none_to_null() {
      assert_eq!(Value::from(None::<i64>), Value::Null);
      assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
   }

   #[test]
   fn test_column_type_codes() {
      assert_eq!(ColumnType::from_code(libsqlite3_sys::SQLITE_INTEGER), Some(ColumnType::Integer));
      assert_eq!(ColumnType::from_code(libsqlite3_sys::SQLITE_NULL), Some(ColumnType::Null));
      assert_eq!(ColumnType::from_code(9), None);
      assert_eq!(ColumnType::Blob.code(), 4);
   }
}
