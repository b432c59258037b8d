//! The process-wide runtime context
//!
//! `Runtime` owns all registries and the lifecycle manager, and exposes the
//! whole operation surface in one place. A hosting application creates one
//! (or uses the thread-local default), opens a scope per logical unit of
//! work, and lets `shutdown` unwind whatever is left, innermost scope first.
//!
//! The plain runtime is single-threaded by construction: it is built from
//! `Rc`/`RefCell` and is intentionally `!Send`. Sharing values across
//! threads requires an explicit atomically-guarded wrapper layered on top,
//! never the plain handle.

use crate::convert::{ConversionRegistry, FallibleFn, InfallibleFn};
use crate::cow::CowCell;
use crate::error::TenResult;
use crate::ownership::borrow::{BorrowTracker, Guard, GuardMut};
use crate::ownership::registry::{Handle, HandleState, OwnershipRegistry, TeardownFn};
use crate::scope::{LifecycleManager, ScopeId, TeardownFault};
use crate::vtable::{DispatchFn, TraitObject, VTableRegistry};
use std::cell::RefCell;
use tenure_val::{shared, MethodSig, Shared, TenStr, Type, Value};

thread_local! {
    /// Thread-local default runtime, for hosts that want one context per
    /// thread without threading it through every call.
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// Run `f` against the thread-local default runtime.
pub fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

/// One initialized runtime: registries plus scope/lifecycle state.
pub struct Runtime {
    registry: Shared<OwnershipRegistry>,
    borrows: BorrowTracker,
    vtables: VTableRegistry,
    conversions: Shared<ConversionRegistry>,
    lifecycle: LifecycleManager,
}

impl Runtime {
    pub fn new() -> Self {
        let registry = shared(OwnershipRegistry::new());
        Self {
            borrows: BorrowTracker::new(registry.clone()),
            conversions: shared(ConversionRegistry::with_builtins()),
            lifecycle: LifecycleManager::new(registry.clone()),
            vtables: VTableRegistry::new(),
            registry,
        }
    }

    // ---- scopes ------------------------------------------------------

    pub fn open_scope(&mut self) -> ScopeId {
        self.lifecycle.open_scope()
    }

    pub fn close_scope(&mut self) -> TenResult<ScopeId> {
        self.lifecycle.close_scope()
    }

    /// Early scope cancellation; same reverse-order unwind as a close.
    pub fn abort_scope(&mut self) -> TenResult<ScopeId> {
        self.lifecycle.abort_scope()
    }

    pub fn scope_depth(&self) -> usize {
        self.lifecycle.depth()
    }

    /// Unwind every open scope, innermost first, then the root frame.
    /// The runtime stays usable afterwards.
    pub fn shutdown(&mut self) -> TenResult<()> {
        self.lifecycle.unwind_all()
    }

    // ---- ownership ---------------------------------------------------

    pub fn create(&mut self, value: impl Into<Value>) -> Handle {
        let handle = self.registry.borrow_mut().create(value);
        self.lifecycle.record(&handle);
        handle
    }

    pub fn create_with_teardown(
        &mut self,
        value: impl Into<Value>,
        teardown: TeardownFn,
    ) -> Handle {
        let handle = self.registry.borrow_mut().create_with_teardown(value, teardown);
        self.lifecycle.record(&handle);
        handle
    }

    pub fn create_composite(
        &mut self,
        name: impl Into<TenStr>,
        fields: Vec<(TenStr, Handle)>,
    ) -> TenResult<Handle> {
        let handle = self.registry.borrow_mut().create_composite(name, fields)?;
        self.lifecycle.record(&handle);
        Ok(handle)
    }

    /// Move the slot to a fresh handle; the source becomes `Moved`.
    pub fn take(&mut self, handle: &Handle) -> TenResult<Handle> {
        let moved = self.registry.borrow_mut().take(handle)?;
        self.lifecycle.record(&moved);
        Ok(moved)
    }

    pub fn borrow_shared(&self, handle: &Handle) -> TenResult<Guard> {
        self.borrows.borrow_shared(handle)
    }

    pub fn borrow_exclusive(&self, handle: &Handle) -> TenResult<GuardMut> {
        self.borrows.borrow_exclusive(handle)
    }

    pub fn value_of(&self, handle: &Handle) -> TenResult<Value> {
        self.registry.borrow().value_of(handle)
    }

    pub fn state_of(&self, handle: &Handle) -> HandleState {
        self.registry.borrow().state_of(handle)
    }

    /// Early explicit teardown; the later scope-exit pass skips this
    /// handle. A second release is a no-op.
    pub fn release(&mut self, handle: &Handle) -> TenResult<()> {
        self.lifecycle.release(handle)
    }

    pub fn faults(&self) -> &[TeardownFault] {
        self.lifecycle.faults()
    }

    pub fn take_faults(&mut self) -> Vec<TeardownFault> {
        self.lifecycle.take_faults()
    }

    // ---- dispatch ----------------------------------------------------

    pub fn define_capability(
        &mut self,
        name: impl Into<TenStr>,
        methods: Vec<MethodSig>,
    ) -> TenResult<()> {
        self.vtables.define_capability(name, methods)
    }

    pub fn register_impl(
        &mut self,
        concrete: Type,
        capability: &str,
        fns: Vec<(TenStr, DispatchFn)>,
    ) -> TenResult<()> {
        self.vtables.register_impl(concrete, capability, fns)
    }

    /// Wrap an active handle into a trait object for `capability`.
    pub fn make_trait_object(&self, handle: Handle, capability: &str) -> TenResult<TraitObject> {
        self.registry.borrow().check_active(&handle)?;
        self.vtables.make_trait_object(handle, capability)
    }

    pub fn dispatch(&self, obj: &TraitObject, method: &str, args: &[Value]) -> TenResult<Value> {
        obj.dispatch(&self.borrows, method, args)
    }

    pub fn dispatch_index(&self, obj: &TraitObject, index: usize, args: &[Value]) -> TenResult<Value> {
        obj.dispatch_index(&self.borrows, index, args)
    }

    // ---- conversion --------------------------------------------------

    pub fn register_infallible(
        &mut self,
        source: Type,
        target: Type,
        f: InfallibleFn,
    ) -> TenResult<()> {
        self.conversions.borrow_mut().register_infallible(source, target, f)
    }

    pub fn register_fallible(
        &mut self,
        source: Type,
        target: Type,
        f: FallibleFn,
    ) -> TenResult<()> {
        self.conversions.borrow_mut().register_fallible(source, target, f)
    }

    pub fn convert(&self, value: &Value, target: &Type) -> TenResult<Value> {
        self.conversions.borrow().convert(value, target)
    }

    // ---- copy-on-write -----------------------------------------------

    /// A copy-on-write cell wired to this runtime's conversion registry.
    pub fn cow(&self, value: impl Into<Value>) -> CowCell {
        CowCell::new(self.conversions.clone(), value)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Best-effort unwind of whatever is still open; faults recorded
        // here are discarded with the runtime.
        let _ = self.lifecycle.unwind_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_scope_roundtrip() {
        let mut rt = Runtime::new();
        let outer = rt.open_scope();
        let inner = rt.open_scope();
        assert_ne!(outer, inner);
        assert_eq!(rt.scope_depth(), 2);
        assert_eq!(rt.close_scope().unwrap(), inner);
        assert_eq!(rt.close_scope().unwrap(), outer);
        assert!(rt.close_scope().is_err());
    }

    #[test]
    fn test_shutdown_unwinds_open_scopes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let logger = |tag: &str| -> TeardownFn {
            let log = log.clone();
            let tag = tag.to_string();
            Rc::new(move |_| {
                log.borrow_mut().push(tag.clone());
                Ok(())
            })
        };

        let mut rt = Runtime::new();
        let _root = rt.create_with_teardown(0, logger("root"));
        rt.open_scope();
        let _outer = rt.create_with_teardown(1, logger("outer"));
        rt.open_scope();
        let _inner = rt.create_with_teardown(2, logger("inner"));

        rt.shutdown().unwrap();
        assert_eq!(*log.borrow(), vec!["inner", "outer", "root"]);
        assert_eq!(rt.scope_depth(), 0);
    }

    #[test]
    fn test_with_runtime_default() {
        let handle = with_runtime(|rt| rt.create("hello"));
        let value = with_runtime(|rt| rt.value_of(&handle)).unwrap();
        assert_eq!(value, Value::from("hello"));
        with_runtime(|rt| rt.release(&handle)).unwrap();
    }

    #[test]
    fn test_cow_wired_to_runtime_conversions() {
        let mut rt = Runtime::new();
        let mut cow = rt.cow("hello");
        assert_eq!(cow.view().as_str(), Some("hello"));
        *cow.mutate().unwrap() = Value::from("changed");
        assert_eq!(cow.clone_count(), 1);
    }
}
