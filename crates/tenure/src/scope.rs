//! Scope frames and deterministic teardown
//!
//! Every handle created while a scope is open is recorded in that scope's
//! frame. On scope exit the frame unwinds in strict reverse creation order,
//! invoking each slot's teardown callback exactly once. Two rules give the
//! ordering its shape:
//!
//! - top-level handles tear down newest-first (reverse creation order);
//! - a composite's fields tear down in declared field order, first-to-last,
//!   which is the opposite convention and an intentional asymmetry.
//!
//! A failing callback is recorded as a [`TeardownFault`] and the unwind
//! proceeds to the next handle; nothing propagates upward. A second callback
//! invocation on an already-released slot is `DoubleTeardown`, an internal
//! defect guarded by the slot's `Released` state.

use crate::error::{LifecycleError, OwnershipError, TenResult};
use crate::ownership::registry::{Handle, HandleId, HandleState, OwnershipRegistry, SlotState};
use tenure_val::{Shared, TenStr};

/// Identifies one open scope. Monotonic per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) usize);

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// Ordered set of handles bound to one logical unit of work.
struct ScopeFrame {
    id: ScopeId,
    handles: Vec<HandleId>,
}

impl ScopeFrame {
    fn new(id: ScopeId) -> Self {
        Self {
            id,
            handles: Vec::new(),
        }
    }
}

/// One recorded teardown callback failure.
#[derive(Debug, Clone, PartialEq)]
pub struct TeardownFault {
    pub handle: HandleId,
    pub message: TenStr,
}

/// Orchestrates teardown across all handles in a scope.
pub struct LifecycleManager {
    registry: Shared<OwnershipRegistry>,
    /// frames[0] is the root frame, only unwound at shutdown.
    frames: Vec<ScopeFrame>,
    next_scope: usize,
    faults: Vec<TeardownFault>,
}

impl LifecycleManager {
    pub fn new(registry: Shared<OwnershipRegistry>) -> Self {
        Self {
            registry,
            frames: vec![ScopeFrame::new(ScopeId(0))],
            next_scope: 1,
            faults: Vec::new(),
        }
    }

    /// Open a nested scope; handles created until the matching close are
    /// bound to it.
    pub fn open_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        self.frames.push(ScopeFrame::new(id));
        id
    }

    /// Record a freshly issued handle in the innermost open frame.
    pub fn record(&mut self, handle: &Handle) {
        self.frames
            .last_mut()
            .expect("root frame always present")
            .handles
            .push(handle.id());
    }

    /// Close the innermost scope, unwinding its live handles newest-first.
    pub fn close_scope(&mut self) -> TenResult<ScopeId> {
        if self.frames.len() == 1 {
            return Err(LifecycleError::NoOpenScope.into());
        }
        let frame = self.frames.pop().expect("checked above");
        let id = frame.id;
        self.unwind(frame)?;
        Ok(id)
    }

    /// Cancel the innermost scope early. The unwind is identical to a
    /// normal close: reverse creation order, faults recorded, no abort.
    pub fn abort_scope(&mut self) -> TenResult<ScopeId> {
        self.close_scope()
    }

    /// Unwind every frame, innermost first, root included. Used at
    /// shutdown.
    pub fn unwind_all(&mut self) -> TenResult<()> {
        while let Some(frame) = self.frames.pop() {
            self.unwind(frame)?;
        }
        self.frames.push(ScopeFrame::new(ScopeId(0)));
        Ok(())
    }

    /// Early explicit teardown of one handle. The later scope-exit pass
    /// skips it; a second release is a no-op.
    pub fn release(&mut self, handle: &Handle) -> TenResult<()> {
        let state = self.registry.borrow().state_of(handle);
        match state {
            HandleState::Released => Ok(()),
            HandleState::Moved => {
                Err(OwnershipError::UseAfterMove { handle: handle.id() }.into())
            }
            HandleState::Active => {
                self.teardown_handle(handle.id())?;
                Ok(())
            }
        }
    }

    /// Faults recorded by failing teardown callbacks so far.
    pub fn faults(&self) -> &[TeardownFault] {
        &self.faults
    }

    /// Drain the recorded faults.
    pub fn take_faults(&mut self) -> Vec<TeardownFault> {
        std::mem::take(&mut self.faults)
    }

    /// Number of open scopes, the root frame excluded.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    fn unwind(&mut self, frame: ScopeFrame) -> TenResult<()> {
        for id in frame.handles.iter().rev() {
            self.teardown_handle(*id)?;
        }
        Ok(())
    }

    /// Tear down the slot behind `id` if its handle is still live. Moved
    /// entries are skipped (the slot travels with the new handle); Released
    /// entries are skipped idempotently.
    fn teardown_handle(&mut self, id: HandleId) -> TenResult<bool> {
        let (slot_id, state) = {
            let registry = self.registry.borrow();
            match registry.entry(id) {
                None => return Ok(false),
                Some(entry) => (entry.slot, entry.state),
            }
        };
        match state {
            HandleState::Moved | HandleState::Released => Ok(false),
            HandleState::Active => {
                self.registry.borrow_mut().mark_released(id);
                self.teardown_slot(slot_id, id)?;
                Ok(true)
            }
        }
    }

    fn teardown_slot(&mut self, slot_id: usize, id: HandleId) -> TenResult<()> {
        let cell = self.registry.borrow().slot_cell(slot_id);

        match cell.state.get() {
            SlotState::Released | SlotState::TearingDown => {
                return Err(LifecycleError::DoubleTeardown { slot: slot_id }.into());
            }
            SlotState::Active => cell.state.set(SlotState::TearingDown),
        }
        let counter = cell.counter.get();
        if counter != 0 {
            self.faults.push(TeardownFault {
                handle: id,
                message: format!("torn down with borrow counter {}", counter).into(),
            });
        }

        if let Some(callback) = &cell.teardown {
            let result = callback(&cell.value.borrow());
            if let Err(message) = result {
                self.faults.push(TeardownFault {
                    handle: id,
                    message,
                });
            }
        }

        // Composite fields go down in declared order, first-to-last.
        let children = cell.children.borrow().clone();
        for (_, child) in children {
            let child_slot = {
                let registry = self.registry.borrow();
                match registry.entry(child) {
                    Some(entry) if entry.state == HandleState::Active => Some(entry.slot),
                    _ => None,
                }
            };
            if let Some(child_slot) = child_slot {
                self.registry.borrow_mut().mark_released(child);
                self.teardown_slot(child_slot, child)?;
            }
        }

        cell.state.set(SlotState::Released);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::registry::TeardownFn;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tenure_val::{shared, Value};

    struct Fixture {
        registry: Shared<OwnershipRegistry>,
        lifecycle: LifecycleManager,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = shared(OwnershipRegistry::new());
            let lifecycle = LifecycleManager::new(registry.clone());
            Self {
                registry,
                lifecycle,
                log: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn logger(&self, tag: &str) -> TeardownFn {
            let log = self.log.clone();
            let tag = tag.to_string();
            Rc::new(move |_: &Value| {
                log.borrow_mut().push(tag.clone());
                Ok(())
            })
        }

        fn create_logged(&mut self, tag: &str, value: impl Into<Value>) -> Handle {
            let callback = self.logger(tag);
            let handle = self
                .registry
                .borrow_mut()
                .create_with_teardown(value, callback);
            self.lifecycle.record(&handle);
            handle
        }
    }

    #[test]
    fn test_reverse_creation_order() {
        let mut fx = Fixture::new();
        fx.lifecycle.open_scope();
        let _a = fx.create_logged("a", 1);
        let _b = fx.create_logged("b", 2);
        let _c = fx.create_logged("c", 3);
        fx.lifecycle.close_scope().unwrap();

        assert_eq!(*fx.log.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_early_release_fires_once() {
        let mut fx = Fixture::new();
        fx.lifecycle.open_scope();
        let a = fx.create_logged("a", 1);
        let _b = fx.create_logged("b", 2);

        fx.lifecycle.release(&a).unwrap();
        assert_eq!(*fx.log.borrow(), vec!["a"]);

        // second explicit release is a no-op
        fx.lifecycle.release(&a).unwrap();

        fx.lifecycle.close_scope().unwrap();
        assert_eq!(*fx.log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_composite_fields_declared_order() {
        let mut fx = Fixture::new();
        fx.lifecycle.open_scope();
        let f1 = fx.create_logged("f1", 1);
        let f2 = fx.create_logged("f2", 2);
        let parent = fx
            .registry
            .borrow_mut()
            .create_composite("Pair", vec![("f1".into(), f1), ("f2".into(), f2)])
            .unwrap();
        fx.lifecycle.record(&parent);
        fx.lifecycle.close_scope().unwrap();

        // parent has no callback; fields fire in declared order, not
        // reversed, and the frame pass does not re-fire them.
        assert_eq!(*fx.log.borrow(), vec!["f1", "f2"]);
    }

    #[test]
    fn test_failing_callback_recorded_and_unwind_continues() {
        let mut fx = Fixture::new();
        fx.lifecycle.open_scope();
        let _a = fx.create_logged("a", 1);
        let bad = {
            let callback: TeardownFn = Rc::new(|_| Err("resource refused to close".into()));
            let handle = fx
                .registry
                .borrow_mut()
                .create_with_teardown(2, callback);
            fx.lifecycle.record(&handle);
            handle
        };
        let _c = fx.create_logged("c", 3);
        fx.lifecycle.close_scope().unwrap();

        // both healthy callbacks ran despite the failure in between
        assert_eq!(*fx.log.borrow(), vec!["c", "a"]);
        let faults = fx.lifecycle.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].handle, bad.id());
        assert_eq!(faults[0].message, "resource refused to close");
    }

    #[test]
    fn test_moved_handle_skipped() {
        let mut fx = Fixture::new();
        fx.lifecycle.open_scope();
        let a = fx.create_logged("a", 1);
        let moved = fx.registry.borrow_mut().take(&a).unwrap();
        fx.lifecycle.record(&moved);
        fx.lifecycle.close_scope().unwrap();

        // one slot, one callback invocation, despite two frame entries
        assert_eq!(*fx.log.borrow(), vec!["a"]);
    }

    #[test]
    fn test_close_without_scope_fails() {
        let mut fx = Fixture::new();
        let err = fx.lifecycle.close_scope().unwrap_err();
        assert!(matches!(
            err,
            crate::error::TenureError::Lifecycle(LifecycleError::NoOpenScope)
        ));
    }

    #[test]
    fn test_abort_scope_unwinds_immediately() {
        let mut fx = Fixture::new();
        fx.lifecycle.open_scope();
        let _a = fx.create_logged("a", 1);
        let _b = fx.create_logged("b", 2);
        fx.lifecycle.abort_scope().unwrap();
        assert_eq!(*fx.log.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn test_unwind_all_innermost_first() {
        let mut fx = Fixture::new();
        let _root = fx.create_logged("root", 0);
        fx.lifecycle.open_scope();
        let _outer = fx.create_logged("outer", 1);
        fx.lifecycle.open_scope();
        let _inner = fx.create_logged("inner", 2);

        fx.lifecycle.unwind_all().unwrap();
        assert_eq!(*fx.log.borrow(), vec!["inner", "outer", "root"]);
        assert_eq!(fx.lifecycle.depth(), 0);
    }

    #[test]
    fn test_teardown_with_live_borrow_recorded() {
        let mut fx = Fixture::new();
        let tracker = crate::ownership::BorrowTracker::new(fx.registry.clone());
        fx.lifecycle.open_scope();
        let a = fx.create_logged("a", 1);
        let guard = tracker.borrow_shared(&a).unwrap();
        fx.lifecycle.close_scope().unwrap();

        assert_eq!(*fx.log.borrow(), vec!["a"]);
        assert_eq!(fx.lifecycle.faults().len(), 1);
        drop(guard);
    }
}
