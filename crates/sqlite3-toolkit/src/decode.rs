use serde_json::Value as JsonValue;
use sqlite3_conn::{ColumnType, Statement};
use time::PrimitiveDateTime;
use time::format_description::{self, BorrowedFormatItem};

use crate::Error;

/// Convert a column of the statement's current row to a JSON value.
///
/// The storage class decides the JSON type, refined by the column's declared
/// type where SQLite has no native one:
///
/// - `BOOLEAN` integers become JSON booleans
/// - `DATETIME` / `TIMESTAMP` text is normalized through [`PrimitiveDateTime`]
///
/// BLOB values are returned as base64-encoded strings since JSON has no native
/// binary type. Non-finite floats become `null`.
pub fn to_json(stmt: &Statement, index: usize) -> Result<JsonValue, Error> {
   let Some(column_type) = stmt.column_type(index) else {
      return Err(Error::UnsupportedDatatype(format!(
         "column {index} has no value in the current row"
      )));
   };

   let declared = stmt
      .column_decltype(index)
      .map(|decl| decl.to_ascii_uppercase())
      .unwrap_or_default();

   let result = match column_type {
      ColumnType::Null => JsonValue::Null,

      ColumnType::Integer => {
         let v = stmt.int64(index);
         match declared.as_str() {
            "BOOLEAN" | "BOOL" => JsonValue::Bool(v != 0),
            _ => JsonValue::Number(v.into()),
         }
      }

      ColumnType::Float => JsonValue::from(stmt.double(index)),

      ColumnType::Text => {
         let text = stmt.string(index);
         match declared.as_str() {
            "DATETIME" | "TIMESTAMP" => JsonValue::String(normalize_datetime(text)),
            _ => JsonValue::String(text),
         }
      }

      ColumnType::Blob => {
         let blob = stmt.blob(index).unwrap_or_default();
         // Encode binary data as base64 for JSON serialization
         JsonValue::String(base64_encode(&blob))
      }
   };

   Ok(result)
}

/// Rewrites a SQLite datetime string in `PrimitiveDateTime`'s display form.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` with an optional fractional part and either a
/// space or `T` separator. Anything else is returned unchanged.
fn normalize_datetime(text: String) -> String {
   const FORMATS: [&str; 2] = [
      "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]",
      "[year]-[month]-[day] [hour]:[minute]:[second]",
   ];

   let candidate = text.replacen('T', " ", 1);
   for format in FORMATS {
      let Ok(items) = format_description::parse(format) else {
         continue;
      };
      if let Some(dt) = parse_with(&candidate, &items) {
         return dt.to_string();
      }
   }
   text
}

fn parse_with(text: &str, items: &[BorrowedFormatItem<'_>]) -> Option<PrimitiveDateTime> {
   PrimitiveDateTime::parse(text, items).ok()
}

/// Base64 encode binary data for JSON serialization.
///
/// SQLite BLOB columns are encoded as base64 strings when serialized to JSON,
/// as JSON does not have a native binary type.
fn base64_encode(data: &[u8]) -> String {
   use base64::Engine;
   base64::engine::general_purpose::STANDARD.encode(data)
}
