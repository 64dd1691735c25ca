//! Open and prepare flag sets.

use bitflags::bitflags;

bitflags! {
   /// Flags for `sqlite3_open_v2`.
   ///
   /// One of `READONLY`, `READWRITE` or `READWRITE | CREATE` is required. The
   /// VFS-only bits (`MAIN_DB` through `WAL`) are accepted for completeness;
   /// the engine ignores them on open.
   #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
   #[derive(serde::Serialize, serde::Deserialize)]
   pub struct OpenFlags: i32 {
      const READONLY = 0x0000_0001;
      const READWRITE = 0x0000_0002;
      const CREATE = 0x0000_0004;
      const DELETEONCLOSE = 0x0000_0008;
      const EXCLUSIVE = 0x0000_0010;
      const AUTOPROXY = 0x0000_0020;
      /// Interpret the filename as a URI.
      const URI = 0x0000_0040;
      const MEMORY = 0x0000_0080;
      const MAIN_DB = 0x0000_0100;
      const TEMP_DB = 0x0000_0200;
      const TRANSIENT_DB = 0x0000_0400;
      const MAIN_JOURNAL = 0x0000_0800;
      const TEMP_JOURNAL = 0x0000_1000;
      const SUBJOURNAL = 0x0000_2000;
      const SUPER_JOURNAL = 0x0000_4000;
      const NOMUTEX = 0x0000_8000;
      const FULLMUTEX = 0x0001_0000;
      const SHAREDCACHE = 0x0002_0000;
      const PRIVATECACHE = 0x0004_0000;
      const WAL = 0x0008_0000;
      /// Refuse to open a database that is a symbolic link.
      const NOFOLLOW = 0x0100_0000;
      /// Enable extended result codes for the new connection.
      const EXRESCODE = 0x0200_0000;
   }
}

impl Default for OpenFlags {
   fn default() -> Self {
      OpenFlags::READWRITE | OpenFlags::CREATE
   }
}

bitflags! {
   /// Flags for `sqlite3_prepare_v3`.
   #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
   #[derive(serde::Serialize, serde::Deserialize)]
   pub struct PrepareFlags: u32 {
      /// Hint that the statement will be retained and reused many times.
      const PERSISTENT = 0x01;
      /// No-op kept for source compatibility with older engines.
      const NORMALIZE = 0x02;
      /// Fail if the statement uses a virtual table.
      const NO_VTAB = 0x04;
   }
}

impl Default for PrepareFlags {
   fn default() -> Self {
      PrepareFlags::PERSISTENT | PrepareFlags::NORMALIZE
   }
}

bitflags! {
   /// Behaviour flags for application-defined SQL functions. The text
   /// encoding is always UTF-8 and is added on registration.
   #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
   pub struct FunctionFlags: i32 {
      /// Same arguments always give the same result within one statement,
      /// which lets the planner use the function in indexes.
      const DETERMINISTIC = 0x0000_0800;
      /// Only callable from top-level SQL, never from schema objects.
      const DIRECTONLY = 0x0008_0000;
      /// The function may read subtypes of its arguments.
      const SUBTYPE = 0x0010_0000;
      /// No side effects; safe to call from triggers and views.
      const INNOCUOUS = 0x0020_0000;
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_default_open_flags() {
      let flags = OpenFlags::default();
      assert_eq!(flags.bits(), 0x06);
      assert!(flags.contains(OpenFlags::READWRITE | OpenFlags::CREATE));
   }

   #[test]
   fn test_open_flag_values() {
      assert_eq!(OpenFlags::URI.bits(), 0x40);
      assert_eq!(OpenFlags::MEMORY.bits(), 0x80);
      assert_eq!(OpenFlags::NOMUTEX.bits(), 0x8000);
      assert_eq!(OpenFlags::NOFOLLOW.bits(), 0x0100_0000);
      assert_eq!(OpenFlags::EXRESCODE.bits(), 0x0200_0000);
   }

   #[test]
   fn test_default_prepare_flags() {
      assert_eq!(PrepareFlags::default().bits(), 0x03);
   }

   #[test]
   fn test_function_flag_values() {
      assert_eq!(FunctionFlags::DETERMINISTIC.bits(), libsqlite3_sys::SQLITE_DETERMINISTIC);
      assert_eq!(FunctionFlags::DIRECTONLY.bits(), libsqlite3_sys::SQLITE_DIRECTONLY);
      assert_eq!(FunctionFlags::INNOCUOUS.bits(), libsqlite3_sys::SQLITE_INNOCUOUS);
      assert!(FunctionFlags::default().is_empty());
   }
}
