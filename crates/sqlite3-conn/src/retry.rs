//! Busy-retry stepping with exponential backoff.
//!
//! A busy or locked step result means another connection holds a conflicting
//! lock. The step is retried after a sleep that grows from microseconds to a
//! few seconds. The calling thread blocks while sleeping.

use std::ffi::c_int;
use std::time::Duration;

use tracing::trace;

use crate::codes::ResultCode;

/// How many attempts `Statement::step_with_retry` makes before giving up on a
/// busy database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retry {
   /// Use the connection's `busy_retry_max`.
   #[default]
   Default,
   /// Use exactly this many attempts.
   Times(u32),
}

impl Retry {
   /// Total number of step attempts, counting the first one. Never zero.
   pub fn attempts(self, connection_default: u32) -> u32 {
      let n = match self {
         Retry::Default => connection_default,
         Retry::Times(n) => n,
      };
      n.max(1)
   }
}

impl From<u32> for Retry {
   fn from(times: u32) -> Self {
      Retry::Times(times)
   }
}

/// Sleep before the attempt following busy attempt `attempt` (0-based).
///
/// 20us, 250us, then 500us growing fourfold through attempt 8 (2048ms),
/// then a flat 3s.
pub fn backoff_delay(attempt: u32) -> Duration {
   match attempt {
      0 => Duration::from_micros(20),
      1 => Duration::from_micros(250),
      2..=8 => Duration::from_micros(500 * 4u64.pow(attempt - 2)),
      _ => Duration::from_secs(3),
   }
}

/// Runs `step` until it returns something other than busy/locked, or until
/// `attempts` busy results have been seen. Returns the last result code.
///
/// `on_busy` runs once per busy result. `sleep` runs between attempts, never
/// after the final one.
pub(crate) fn step_with_backoff(
   attempts: u32,
   mut step: impl FnMut() -> c_int,
   mut on_busy: impl FnMut(c_int),
   mut sleep: impl FnMut(Duration),
) -> c_int {
   let attempts = attempts.max(1);
   let mut rc = ResultCode::Busy.code();

   for attempt in 0..attempts {
      rc = step();
      if !ResultCode::from_code(rc).is_busy_class() {
         return rc;
      }

      on_busy(rc);
      if attempt + 1 < attempts {
         let delay = backoff_delay(attempt);
         trace!(attempt, rc, ?delay, "Step busy, backing off");
         sleep(delay);
      }
   }

   rc
}
