//! Shared/exclusive borrow discipline over registry slots
//!
//! The tracker enforces the exclusive-xor-shared rule dynamically: any
//! number of concurrent shared borrows, or exactly one exclusive borrow,
//! never both. Each slot carries a single counter (`0` free, `N > 0` for N
//! shared borrows, `-1` for one exclusive borrow) and conflicts are
//! detected eagerly, at acquire time.
//!
//! Guards release their borrow on drop; explicit [`Guard::release`] is
//! idempotent, so release-then-drop never double-decrements. A released
//! guard keeps no access: its value accessors fail with `StaleGuard`.

use crate::error::{OwnershipError, TenResult};
use crate::ownership::registry::{Handle, HandleId, OwnershipRegistry, Slot};
use std::cell::{Cell, Ref, RefMut};
use std::fmt;
use std::rc::Rc;
use tenure_val::{Shared, Value};

/// Kind of access requested on a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BorrowKind {
    /// Read-only access; any number may coexist.
    Shared,
    /// Read-write access; excludes every other borrow.
    Exclusive,
    /// Move out of the slot; excludes every borrow.
    Take,
}

/// Enforces the borrow discipline on top of registry handles.
pub struct BorrowTracker {
    registry: Shared<OwnershipRegistry>,
}

impl BorrowTracker {
    pub fn new(registry: Shared<OwnershipRegistry>) -> Self {
        Self { registry }
    }

    /// Acquire a shared borrow. Fails with `BorrowConflict` while an
    /// exclusive borrow is held.
    pub fn borrow_shared(&self, handle: &Handle) -> TenResult<Guard> {
        let registry = self.registry.borrow();
        let slot_id = registry.check_active(handle)?;
        let slot = registry.slot_cell(slot_id);
        drop(registry);

        let counter = slot.counter.get();
        if counter < 0 {
            return Err(OwnershipError::BorrowConflict {
                requested: BorrowKind::Shared,
                counter,
            }
            .into());
        }
        slot.counter.set(counter + 1);
        Ok(Guard {
            handle: handle.id(),
            slot,
            released: Cell::new(false),
        })
    }

    /// Acquire the exclusive borrow. Fails with `BorrowConflict` unless the
    /// slot is completely free.
    pub fn borrow_exclusive(&self, handle: &Handle) -> TenResult<GuardMut> {
        let registry = self.registry.borrow();
        let slot_id = registry.check_active(handle)?;
        let slot = registry.slot_cell(slot_id);
        drop(registry);

        let counter = slot.counter.get();
        if counter != 0 {
            return Err(OwnershipError::BorrowConflict {
                requested: BorrowKind::Exclusive,
                counter,
            }
            .into());
        }
        slot.counter.set(-1);
        Ok(GuardMut {
            handle: handle.id(),
            slot,
            released: Cell::new(false),
        })
    }
}

/// A live shared borrow. Decrements the slot counter when released.
pub struct Guard {
    handle: HandleId,
    slot: Rc<Slot>,
    released: Cell<bool>,
}

impl Guard {
    /// Handle this borrow was taken through.
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Read access to the borrowed value. Fails with `StaleGuard` once the
    /// borrow was given back.
    pub fn value(&self) -> TenResult<Ref<'_, Value>> {
        self.check_live()?;
        Ok(self.slot.value.borrow())
    }

    /// Give the borrow back. A second release is a no-op, and releasing
    /// while a value reference is still held is fine: only the counter
    /// moves.
    pub fn release(&self) {
        if !self.released.replace(true) {
            let counter = self.slot.counter.get();
            debug_assert!(counter > 0, "shared release on free slot");
            self.slot.counter.set(counter - 1);
        }
    }

    fn check_live(&self) -> TenResult<()> {
        if self.released.get() {
            return Err(OwnershipError::StaleGuard { handle: self.handle }.into());
        }
        Ok(())
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("handle", &self.handle)
            .field("released", &self.released.get())
            .finish_non_exhaustive()
    }
}

/// The live exclusive borrow. Resets the slot counter when released.
pub struct GuardMut {
    handle: HandleId,
    slot: Rc<Slot>,
    released: Cell<bool>,
}

impl GuardMut {
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn value(&self) -> TenResult<Ref<'_, Value>> {
        self.check_live()?;
        Ok(self.slot.value.borrow())
    }

    /// Write access to the borrowed value. Fails with `StaleGuard` once the
    /// borrow was given back: a released guard keeps no write access.
    pub fn value_mut(&self) -> TenResult<RefMut<'_, Value>> {
        self.check_live()?;
        Ok(self.slot.value.borrow_mut())
    }

    /// Replace the borrowed value outright. Same staleness rule.
    pub fn set(&self, value: impl Into<Value>) -> TenResult<()> {
        self.check_live()?;
        *self.slot.value.borrow_mut() = value.into();
        Ok(())
    }

    /// Give the borrow back. A second release is a no-op.
    pub fn release(&self) {
        if !self.released.replace(true) {
            debug_assert!(self.slot.counter.get() == -1, "exclusive release on free slot");
            self.slot.counter.set(0);
        }
    }

    fn check_live(&self) -> TenResult<()> {
        if self.released.get() {
            return Err(OwnershipError::StaleGuard { handle: self.handle }.into());
        }
        Ok(())
    }
}

impl Drop for GuardMut {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for GuardMut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardMut")
            .field("handle", &self.handle)
            .field("released", &self.released.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TenureError;
    use tenure_val::shared;

    fn setup(value: impl Into<Value>) -> (Shared<OwnershipRegistry>, Handle, BorrowTracker) {
        let registry = shared(OwnershipRegistry::new());
        let handle = registry.borrow_mut().create(value);
        let tracker = BorrowTracker::new(registry.clone());
        (registry, handle, tracker)
    }

    #[test]
    fn test_many_shared_borrows() {
        let (registry, handle, tracker) = setup("hello");
        let g1 = tracker.borrow_shared(&handle).unwrap();
        let g2 = tracker.borrow_shared(&handle).unwrap();
        let g3 = tracker.borrow_shared(&handle).unwrap();

        assert_eq!(registry.borrow().counter_of(&handle).unwrap(), 3);
        assert_eq!(g1.value().unwrap().as_str(), Some("hello"));
        assert_eq!(g2.value().unwrap().as_str(), Some("hello"));
        drop(g3);
        assert_eq!(registry.borrow().counter_of(&handle).unwrap(), 2);
    }

    #[test]
    fn test_exclusive_excludes_shared() {
        let (_registry, handle, tracker) = setup(1);
        let guard = tracker.borrow_exclusive(&handle).unwrap();

        let err = tracker.borrow_shared(&handle).unwrap_err();
        assert!(matches!(
            err,
            TenureError::Ownership(OwnershipError::BorrowConflict {
                requested: BorrowKind::Shared,
                counter: -1,
            })
        ));
        drop(guard);
        assert!(tracker.borrow_shared(&handle).is_ok());
    }

    #[test]
    fn test_shared_excludes_exclusive() {
        let (_registry, handle, tracker) = setup(1);
        let guard = tracker.borrow_shared(&handle).unwrap();

        let err = tracker.borrow_exclusive(&handle).unwrap_err();
        assert!(matches!(
            err,
            TenureError::Ownership(OwnershipError::BorrowConflict {
                requested: BorrowKind::Exclusive,
                counter: 1,
            })
        ));
        guard.release();
        assert!(tracker.borrow_exclusive(&handle).is_ok());
    }

    #[test]
    fn test_two_exclusive_conflict() {
        let (_registry, handle, tracker) = setup(1);
        let _guard = tracker.borrow_exclusive(&handle).unwrap();
        assert!(tracker.borrow_exclusive(&handle).is_err());
    }

    #[test]
    fn test_release_idempotent() {
        let (registry, handle, tracker) = setup(1);
        let g1 = tracker.borrow_shared(&handle).unwrap();
        let g2 = tracker.borrow_shared(&handle).unwrap();

        g1.release();
        g1.release();
        drop(g1);
        assert_eq!(registry.borrow().counter_of(&handle).unwrap(), 1);
        drop(g2);
        assert_eq!(registry.borrow().counter_of(&handle).unwrap(), 0);
    }

    #[test]
    fn test_exclusive_mutation() {
        let (registry, handle, tracker) = setup(10);
        {
            let guard = tracker.borrow_exclusive(&handle).unwrap();
            *guard.value_mut().unwrap() = Value::from(20);
        }
        assert_eq!(registry.borrow().value_of(&handle).unwrap(), Value::from(20));
    }

    #[test]
    fn test_borrow_after_move_fails() {
        let (registry, handle, tracker) = setup(1);
        let _moved = registry.borrow_mut().take(&handle).unwrap();
        let err = tracker.borrow_shared(&handle).unwrap_err();
        assert!(matches!(
            err,
            TenureError::Ownership(OwnershipError::UseAfterMove { .. })
        ));
    }

    #[test]
    fn test_released_guard_mut_keeps_no_write_access() {
        let (registry, handle, tracker) = setup(1);
        let gm = tracker.borrow_exclusive(&handle).unwrap();
        gm.release();

        // the slot is free again; a reader comes in
        let reader = tracker.borrow_shared(&handle).unwrap();

        // the stale guard must not mutate under the live shared borrow
        assert!(matches!(
            gm.value_mut().unwrap_err(),
            TenureError::Ownership(OwnershipError::StaleGuard { .. })
        ));
        assert!(matches!(
            gm.set(999).unwrap_err(),
            TenureError::Ownership(OwnershipError::StaleGuard { .. })
        ));
        assert!(gm.value().is_err());
        assert_eq!(reader.value().unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_released_shared_guard_keeps_no_read_access() {
        let (_registry, handle, tracker) = setup(1);
        let guard = tracker.borrow_shared(&handle).unwrap();
        guard.release();

        let writer = tracker.borrow_exclusive(&handle).unwrap();
        assert!(matches!(
            guard.value().unwrap_err(),
            TenureError::Ownership(OwnershipError::StaleGuard { .. })
        ));
        *writer.value_mut().unwrap() = Value::from(2);
    }

    #[test]
    fn test_release_while_value_ref_held() {
        let (registry, handle, tracker) = setup(5);
        let guard = tracker.borrow_shared(&handle).unwrap();
        let value = guard.value().unwrap();

        // releasing only moves the counter; the held reference stays valid
        guard.release();
        assert_eq!(value.as_int(), Some(5));
        drop(value);

        assert_eq!(registry.borrow().counter_of(&handle).unwrap(), 0);
    }

    #[test]
    fn test_guards_format_for_diagnostics() {
        let (_registry, handle, tracker) = setup(1);
        let guard = tracker.borrow_shared(&handle).unwrap();
        assert!(format!("{:?}", guard).contains("Guard"));
        guard.release();
        let gm = tracker.borrow_exclusive(&handle).unwrap();
        assert!(format!("{:?}", gm).contains("released: false"));
    }

    #[test]
    fn test_take_while_borrowed_fails() {
        let (registry, handle, tracker) = setup(1);
        let _guard = tracker.borrow_shared(&handle).unwrap();
        let err = registry.borrow_mut().take(&handle).unwrap_err();
        assert!(matches!(
            err,
            TenureError::Ownership(OwnershipError::BorrowConflict {
                requested: BorrowKind::Take,
                ..
            })
        ));
    }
}
