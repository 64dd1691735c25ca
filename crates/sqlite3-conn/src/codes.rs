//! SQLite result codes, primary and extended.
//!
//! Values are the engine's published numbers. Extended codes carry their
//! primary code in the low byte, so `code & 0xff` always yields the primary.

use std::fmt;

use crate::error::ErrorCategory;

macro_rules! result_codes {
   ($($(#[$meta:meta])* $variant:ident = $value:literal => $name:literal,)*) => {
      /// A result code returned by the engine.
      ///
      /// Codes the engine may introduce later round-trip through
      /// [`ResultCode::Unknown`].
      #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
      pub enum ResultCode {
         $($(#[$meta])* $variant,)*
         Unknown(i32),
      }

      impl ResultCode {
         pub fn from_code(code: i32) -> Self {
            match code {
               $($value => ResultCode::$variant,)*
               other => ResultCode::Unknown(other),
            }
         }

         pub fn code(self) -> i32 {
            match self {
               $(ResultCode::$variant => $value,)*
               ResultCode::Unknown(code) => code,
            }
         }

         /// The engine's symbolic name, e.g. `SQLITE_BUSY_TIMEOUT`.
         pub fn name(self) -> &'static str {
            match self {
               $(ResultCode::$variant => $name,)*
               ResultCode::Unknown(_) => "SQLITE_UNKNOWN",
            }
         }
      }
   };
}

result_codes! {
   Ok = 0 => "SQLITE_OK",
   Error = 1 => "SQLITE_ERROR",
   Internal = 2 => "SQLITE_INTERNAL",
   Perm = 3 => "SQLITE_PERM",
   Abort = 4 => "SQLITE_ABORT",
   Busy = 5 => "SQLITE_BUSY",
   Locked = 6 => "SQLITE_LOCKED",
   NoMem = 7 => "SQLITE_NOMEM",
   ReadOnly = 8 => "SQLITE_READONLY",
   Interrupt = 9 => "SQLITE_INTERRUPT",
   IoErr = 10 => "SQLITE_IOERR",
   Corrupt = 11 => "SQLITE_CORRUPT",
   NotFound = 12 => "SQLITE_NOTFOUND",
   Full = 13 => "SQLITE_FULL",
   CantOpen = 14 => "SQLITE_CANTOPEN",
   Protocol = 15 => "SQLITE_PROTOCOL",
   Empty = 16 => "SQLITE_EMPTY",
   Schema = 17 => "SQLITE_SCHEMA",
   TooBig = 18 => "SQLITE_TOOBIG",
   Constraint = 19 => "SQLITE_CONSTRAINT",
   Mismatch = 20 => "SQLITE_MISMATCH",
   Misuse = 21 => "SQLITE_MISUSE",
   NoLfs = 22 => "SQLITE_NOLFS",
   Auth = 23 => "SQLITE_AUTH",
   Format = 24 => "SQLITE_FORMAT",
   Range = 25 => "SQLITE_RANGE",
   NotADb = 26 => "SQLITE_NOTADB",
   Notice = 27 => "SQLITE_NOTICE",
   Warning = 28 => "SQLITE_WARNING",
   /// `sqlite3_step` has another row ready.
   Row = 100 => "SQLITE_ROW",
   /// `sqlite3_step` has finished executing.
   Done = 101 => "SQLITE_DONE",

   OkLoadPermanently = 256 => "SQLITE_OK_LOAD_PERMANENTLY",
   OkSymlink = 512 => "SQLITE_OK_SYMLINK",

   ErrorMissingCollseq = 257 => "SQLITE_ERROR_MISSING_COLLSEQ",
   ErrorRetry = 513 => "SQLITE_ERROR_RETRY",
   ErrorSnapshot = 769 => "SQLITE_ERROR_SNAPSHOT",

   IoErrRead = 266 => "SQLITE_IOERR_READ",
   IoErrShortRead = 522 => "SQLITE_IOERR_SHORT_READ",
   IoErrWrite = 778 => "SQLITE_IOERR_WRITE",
   IoErrFsync = 1034 => "SQLITE_IOERR_FSYNC",
   IoErrDirFsync = 1290 => "SQLITE_IOERR_DIR_FSYNC",
   IoErrTruncate = 1546 => "SQLITE_IOERR_TRUNCATE",
   IoErrFstat = 1802 => "SQLITE_IOERR_FSTAT",
   IoErrUnlock = 2058 => "SQLITE_IOERR_UNLOCK",
   IoErrRdlock = 2314 => "SQLITE_IOERR_RDLOCK",
   IoErrDelete = 2570 => "SQLITE_IOERR_DELETE",
   IoErrBlocked = 2826 => "SQLITE_IOERR_BLOCKED",
   IoErrNoMem = 3082 => "SQLITE_IOERR_NOMEM",
   IoErrAccess = 3338 => "SQLITE_IOERR_ACCESS",
   IoErrCheckReservedLock = 3594 => "SQLITE_IOERR_CHECKRESERVEDLOCK",
   IoErrLock = 3850 => "SQLITE_IOERR_LOCK",
   IoErrClose = 4106 => "SQLITE_IOERR_CLOSE",
   IoErrDirClose = 4362 => "SQLITE_IOERR_DIR_CLOSE",
   IoErrShmOpen = 4618 => "SQLITE_IOERR_SHMOPEN",
   IoErrShmSize = 4874 => "SQLITE_IOERR_SHMSIZE",
   IoErrShmLock = 5130 => "SQLITE_IOERR_SHMLOCK",
   IoErrShmMap = 5386 => "SQLITE_IOERR_SHMMAP",
   IoErrSeek = 5642 => "SQLITE_IOERR_SEEK",
   IoErrDeleteNoent = 5898 => "SQLITE_IOERR_DELETE_NOENT",
   IoErrMmap = 6154 => "SQLITE_IOERR_MMAP",
   IoErrGetTempPath = 6410 => "SQLITE_IOERR_GETTEMPPATH",
   IoErrConvPath = 6666 => "SQLITE_IOERR_CONVPATH",
   IoErrVnode = 6922 => "SQLITE_IOERR_VNODE",
   IoErrAuth = 7178 => "SQLITE_IOERR_AUTH",
   IoErrBeginAtomic = 7434 => "SQLITE_IOERR_BEGIN_ATOMIC",
   IoErrCommitAtomic = 7690 => "SQLITE_IOERR_COMMIT_ATOMIC",
   IoErrRollbackAtomic = 7946 => "SQLITE_IOERR_ROLLBACK_ATOMIC",
   IoErrData = 8202 => "SQLITE_IOERR_DATA",
   IoErrCorruptFs = 8458 => "SQLITE_IOERR_CORRUPTFS",
   IoErrInPage = 8714 => "SQLITE_IOERR_IN_PAGE",

   LockedSharedCache = 262 => "SQLITE_LOCKED_SHAREDCACHE",
   LockedVtab = 518 => "SQLITE_LOCKED_VTAB",

   BusyRecovery = 261 => "SQLITE_BUSY_RECOVERY",
   BusySnapshot = 517 => "SQLITE_BUSY_SNAPSHOT",
   BusyTimeout = 773 => "SQLITE_BUSY_TIMEOUT",

   CantOpenNoTempDir = 270 => "SQLITE_CANTOPEN_NOTEMPDIR",
   CantOpenIsDir = 526 => "SQLITE_CANTOPEN_ISDIR",
   CantOpenFullPath = 782 => "SQLITE_CANTOPEN_FULLPATH",
   CantOpenConvPath = 1038 => "SQLITE_CANTOPEN_CONVPATH",
   CantOpenDirtyWal = 1294 => "SQLITE_CANTOPEN_DIRTYWAL",
   CantOpenSymlink = 1550 => "SQLITE_CANTOPEN_SYMLINK",

   CorruptVtab = 267 => "SQLITE_CORRUPT_VTAB",
   CorruptSequence = 523 => "SQLITE_CORRUPT_SEQUENCE",
   CorruptIndex = 779 => "SQLITE_CORRUPT_INDEX",

   ReadOnlyRecovery = 264 => "SQLITE_READONLY_RECOVERY",
   ReadOnlyCantLock = 520 => "SQLITE_READONLY_CANTLOCK",
   ReadOnlyRollback = 776 => "SQLITE_READONLY_ROLLBACK",
   ReadOnlyDbMoved = 1032 => "SQLITE_READONLY_DBMOVED",
   ReadOnlyCantInit = 1288 => "SQLITE_READONLY_CANTINIT",
   ReadOnlyDirectory = 1544 => "SQLITE_READONLY_DIRECTORY",

   AbortRollback = 516 => "SQLITE_ABORT_ROLLBACK",

   ConstraintCheck = 275 => "SQLITE_CONSTRAINT_CHECK",
   ConstraintCommitHook = 531 => "SQLITE_CONSTRAINT_COMMITHOOK",
   ConstraintForeignKey = 787 => "SQLITE_CONSTRAINT_FOREIGNKEY",
   ConstraintFunction = 1043 => "SQLITE_CONSTRAINT_FUNCTION",
   ConstraintNotNull = 1299 => "SQLITE_CONSTRAINT_NOTNULL",
   ConstraintPrimaryKey = 1555 => "SQLITE_CONSTRAINT_PRIMARYKEY",
   ConstraintTrigger = 1811 => "SQLITE_CONSTRAINT_TRIGGER",
   ConstraintUnique = 2067 => "SQLITE_CONSTRAINT_UNIQUE",
   ConstraintVtab = 2323 => "SQLITE_CONSTRAINT_VTAB",
   ConstraintRowId = 2579 => "SQLITE_CONSTRAINT_ROWID",
   ConstraintPinned = 2835 => "SQLITE_CONSTRAINT_PINNED",
   ConstraintDataType = 3091 => "SQLITE_CONSTRAINT_DATATYPE",

   NoticeRecoverWal = 283 => "SQLITE_NOTICE_RECOVER_WAL",
   NoticeRecoverRollback = 539 => "SQLITE_NOTICE_RECOVER_ROLLBACK",
   NoticeRbu = 795 => "SQLITE_NOTICE_RBU",

   WarningAutoIndex = 284 => "SQLITE_WARNING_AUTOINDEX",

   AuthUser = 279 => "SQLITE_AUTH_USER",
}

impl ResultCode {
   /// The primary code this (possibly extended) code belongs to.
   pub fn primary(self) -> ResultCode {
      ResultCode::from_code(self.code() & 0xff)
   }

   pub fn is_extended(self) -> bool {
      self.code() > 0xff
   }

   /// OK, ROW and DONE.
   pub fn is_success(self) -> bool {
      matches!(self.primary(), ResultCode::Ok | ResultCode::Row | ResultCode::Done)
   }

   /// BUSY or LOCKED, including their extended forms.
   pub fn is_busy_class(self) -> bool {
      matches!(self.primary(), ResultCode::Busy | ResultCode::Locked)
   }

   pub fn category(self) -> ErrorCategory {
      match self.primary() {
         ResultCode::Busy | ResultCode::Locked => ErrorCategory::Transient,
         ResultCode::Range => ErrorCategory::Lifecycle,
         ResultCode::Notice | ResultCode::Warning => ErrorCategory::Advisory,
         ResultCode::Ok | ResultCode::Row | ResultCode::Done => ErrorCategory::Advisory,
         _ => ErrorCategory::Structural,
      }
   }
}

impl From<i32> for ResultCode {
   fn from(code: i32) -> Self {
      ResultCode::from_code(code)
   }
}

impl From<ResultCode> for i32 {
   fn from(code: ResultCode) -> Self {
      code.code()
   }
}

impl fmt::Display for ResultCode {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         ResultCode::Unknown(code) => write!(f, "SQLITE_UNKNOWN({code})"),
         known => f.write_str(known.name()),
      }
   }
}
