//! Status counters, limits and other engine enumerations.
//!
//! Every value here is passed straight through to the engine.

macro_rules! engine_enum {
   ($(#[$meta:meta])* pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal,)* }) => {
      $(#[$meta])*
      #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
      pub enum $name {
         $($(#[$vmeta])* $variant,)*
      }

      impl $name {
         pub fn code(self) -> i32 {
            match self {
               $($name::$variant => $value,)*
            }
         }

         pub fn from_code(code: i32) -> Option<Self> {
            match code {
               $($value => Some($name::$variant),)*
               _ => None,
            }
         }
      }
   };
}

engine_enum! {
   /// Per-connection counters read through `sqlite3_db_status`.
   pub enum DbStatus {
      LookasideUsed = 0,
      CacheUsed = 1,
      SchemaUsed = 2,
      StmtUsed = 3,
      LookasideHit = 4,
      LookasideMissSize = 5,
      LookasideMissFull = 6,
      CacheHit = 7,
      CacheMiss = 8,
      CacheWrite = 9,
      DeferredFks = 10,
      CacheUsedShared = 11,
      CacheSpill = 12,
   }
}

engine_enum! {
   /// Per-statement counters read through `sqlite3_stmt_status`.
   pub enum StmtStatus {
      FullscanStep = 1,
      Sort = 2,
      AutoIndex = 3,
      VmStep = 4,
      Reprepare = 5,
      Run = 6,
      FilterMiss = 7,
      FilterHit = 8,
      /// Approximate heap bytes used by the statement.
      MemUsed = 99,
   }
}

engine_enum! {
   /// Process-wide counters read through `sqlite3_status64`.
   pub enum Status {
      MemoryUsed = 0,
      PagecacheUsed = 1,
      PagecacheOverflow = 2,
      MallocSize = 5,
      ParserStack = 6,
      PagecacheSize = 7,
      MallocCount = 9,
   }
}

engine_enum! {
   /// Per-connection run-time limits for `sqlite3_limit`.
   pub enum Limit {
      Length = 0,
      SqlLength = 1,
      Column = 2,
      ExprDepth = 3,
      CompoundSelect = 4,
      VdbeOp = 5,
      FunctionArg = 6,
      Attached = 7,
      LikePatternLength = 8,
      VariableNumber = 9,
      TriggerDepth = 10,
      WorkerThreads = 11,
   }
}

engine_enum! {
   /// ON CONFLICT resolution modes.
   pub enum Conflict {
      Rollback = 1,
      Ignore = 2,
      Fail = 3,
      Abort = 4,
      Replace = 5,
   }
}

engine_enum! {
   pub enum TextEncoding {
      Utf8 = 1,
      Utf16Le = 2,
      Utf16Be = 3,
      Utf16 = 4,
      Any = 5,
      Utf16Aligned = 8,
   }
}

engine_enum! {
   /// Threading mode the engine was compiled with, as reported by
   /// `sqlite3_threadsafe`.
   pub enum ThreadSafety {
      /// Mutexes are compiled out. No sharing across threads at all.
      SingleThread = 0,
      /// Connections and statements may be used from any thread; the engine
      /// serializes access.
      Serialized = 1,
      /// Separate connections may be used from separate threads.
      MultiThread = 2,
   }
}

/// Current and peak value of a status counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusValue<T> {
   pub current: T,
   pub highwater: T,
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_codes_round_trip() {
      assert_eq!(DbStatus::CacheSpill.code(), 12);
      assert_eq!(DbStatus::from_code(7), Some(DbStatus::CacheHit));
      assert_eq!(StmtStatus::MemUsed.code(), 99);
      assert_eq!(StmtStatus::from_code(98), None);
      assert_eq!(Limit::WorkerThreads.code(), 11);
      assert_eq!(Conflict::Replace.code(), 5);
      assert_eq!(TextEncoding::Utf16Aligned.code(), 8);
      assert_eq!(Status::MallocCount.code(), 9);
   }

   #[test]
   fn test_thread_safety_matches_threadsafe_return_values() {
      assert_eq!(ThreadSafety::from_code(0), Some(ThreadSafety::SingleThread));
      assert_eq!(ThreadSafety::from_code(1), Some(ThreadSafety::Serialized));
      assert_eq!(ThreadSafety::from_code(2), Some(ThreadSafety::MultiThread));
   }
}
