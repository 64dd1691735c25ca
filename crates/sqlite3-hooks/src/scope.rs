//! Tracks native callbacks currently running on one connection.
//!
//! A listener may reach back into its own connection and replace or remove
//! itself, or any other listener, while SQLite is still executing it. The
//! replaced context cannot be freed at that point, so it is parked here and
//! released once the outermost callback has returned.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

/// Callback depth and deferred releases for one connection.
#[derive(Default)]
pub struct CallbackScope {
   depth: Cell<usize>,
   retired: RefCell<Vec<Box<dyn Any>>>,
}

impl std::fmt::Debug for CallbackScope {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("CallbackScope")
         .field("depth", &self.depth.get())
         .field("retired", &self.retired.borrow().len())
         .finish()
   }
}

impl CallbackScope {
   pub fn new() -> Rc<Self> {
      Rc::new(Self::default())
   }

   /// Returns true while a callback registered on the connection is running.
   pub fn is_active(&self) -> bool {
      self.depth.get() > 0
   }

   /// Marks a callback as running until the returned guard is dropped.
   pub fn enter(self: &Rc<Self>) -> ScopeGuard {
      self.depth.set(self.depth.get() + 1);
      ScopeGuard {
         scope: Rc::clone(self),
      }
   }

   /// Releases `value` now, or after the outermost running callback returns.
   pub fn retire(&self, value: Box<dyn Any>) {
      if self.is_active() {
         trace!(depth = self.depth.get(), "Deferring release of replaced callback");
         self.retired.borrow_mut().push(value);
      } else {
         drop(value);
      }
   }

   /// Number of contexts waiting for the running callbacks to return.
   pub fn pending(&self) -> usize {
      self.retired.borrow().len()
   }
}

/// Running-callback marker returned by [`CallbackScope::enter`].
pub struct ScopeGuard {
   scope: Rc<CallbackScope>,
}

impl Drop for ScopeGuard {
   fn drop(&mut self) {
      let scope = &self.scope;

      // Drain while still counted as running: dropping a listener may drop a
      // connection handle, which must not close mid-callback.
      if scope.depth.get() == 1 {
         loop {
            let retired = std::mem::take(&mut *scope.retired.borrow_mut());
            if retired.is_empty() {
               break;
            }
            drop(retired);
         }
      }

      scope.depth.set(scope.depth.get() - 1);
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   struct Flag(Rc<Cell<bool>>);

   impl Drop for Flag {
      fn drop(&mut self) {
         self.0.set(true);
      }
   }

   #[test]
   fn test_retire_outside_callback_releases_immediately() {
      let scope = CallbackScope::new();
      let dropped = Rc::new(Cell::new(false));
      scope.retire(Box::new(Flag(Rc::clone(&dropped))));
      assert!(dropped.get());
      assert_eq!(scope.pending(), 0);
   }

   #[test]
   fn test_retire_inside_nested_callbacks_waits_for_outermost() {
      let scope = CallbackScope::new();
      let dropped = Rc::new(Cell::new(false));

      let outer = scope.enter();
      let inner = scope.enter();
      scope.retire(Box::new(Flag(Rc::clone(&dropped))));
      drop(inner);
      assert!(!dropped.get());
      assert!(scope.is_active());
      assert_eq!(scope.pending(), 1);

      drop(outer);
      assert!(dropped.get());
      assert!(!scope.is_active());
      assert_eq!(scope.pending(), 0);
   }
}
