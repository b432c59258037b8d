//! Capability registry and type-erased dispatch
//!
//! A capability is a named set of method signatures; a vtable binds one
//! concrete type to one capability with a fixed-size table of function
//! pointers, built once at registration and never mutated. A trait object
//! pairs an owning handle with a vtable reference, so heterogeneous
//! collections can dispatch on a shared capability without ever inspecting
//! the concrete type behind a handle.
//!
//! Object safety is checked when the capability is defined: a method that
//! returns the implementing type itself, or takes an unconstrained generic
//! parameter, has no fixed-size table representation and is rejected.

use crate::error::{DispatchError, TenResult};
use crate::ownership::borrow::BorrowTracker;
use crate::ownership::registry::Handle;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;
use tenure_val::{MethodSig, TenStr, Type, Value};

/// Method implementation: receiver value plus positional arguments.
///
/// Methods observe the receiver through a shared borrow; a mutating method
/// returns its new state as the result value.
pub type DispatchFn = fn(&Value, &[Value]) -> Value;

/// A named set of method signatures a concrete type can implement.
#[derive(Debug)]
pub struct Capability {
    name: TenStr,
    methods: IndexMap<TenStr, MethodSig>,
}

impl Capability {
    pub fn name(&self) -> &TenStr {
        &self.name
    }

    /// Table slot of a method, in definition order. O(1).
    pub fn method_index(&self, method: &str) -> Option<usize> {
        self.methods.get_index_of(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodSig> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Immutable per (concrete type, capability) dispatch table.
#[derive(Debug)]
pub struct VTable {
    capability: Rc<Capability>,
    concrete: Type,
    slots: Vec<DispatchFn>,
}

impl VTable {
    pub fn capability(&self) -> &Rc<Capability> {
        &self.capability
    }

    pub fn concrete_type(&self) -> &Type {
        &self.concrete
    }

    fn slot(&self, index: usize) -> Option<DispatchFn> {
        self.slots.get(index).copied()
    }
}

/// Builds and stores capabilities and their vtables.
pub struct VTableRegistry {
    capabilities: HashMap<TenStr, Rc<Capability>>,
    tables: HashMap<(TenStr, TenStr), Rc<VTable>>,
}

impl VTableRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
            tables: HashMap::new(),
        }
    }

    /// Register a capability. Fails fast on duplicate names and on
    /// signatures that cannot live in a fixed-size dispatch table.
    pub fn define_capability(
        &mut self,
        name: impl Into<TenStr>,
        methods: Vec<MethodSig>,
    ) -> TenResult<()> {
        let name = name.into();
        if self.capabilities.contains_key(&name) {
            return Err(DispatchError::DuplicateCapability { name }.into());
        }
        let mut table = IndexMap::new();
        for sig in methods {
            if sig.ret == Type::SelfTy {
                return Err(DispatchError::ObjectSafetyViolation {
                    capability: name,
                    method: sig.name,
                    reason: "returns the implementing type".into(),
                }
                .into());
            }
            if let Some(param) = sig.params.iter().find(|p| !p.is_dispatchable()) {
                return Err(DispatchError::ObjectSafetyViolation {
                    capability: name,
                    method: sig.name.clone(),
                    reason: format!("takes unconstrained parameter '{}'", param).into(),
                }
                .into());
            }
            table.insert(sig.name.clone(), sig);
        }
        self.capabilities.insert(
            name.clone(),
            Rc::new(Capability {
                name,
                methods: table,
            }),
        );
        Ok(())
    }

    pub fn capability(&self, name: &str) -> Option<&Rc<Capability>> {
        self.capabilities.get(name)
    }

    /// Bind a concrete type to a capability with one function per method.
    ///
    /// Every capability method must be covered and no extras are accepted;
    /// on failure no partial table is left behind.
    pub fn register_impl(
        &mut self,
        concrete: Type,
        capability: &str,
        fns: Vec<(TenStr, DispatchFn)>,
    ) -> TenResult<()> {
        let cap = self
            .capabilities
            .get(capability)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownCapability {
                name: capability.into(),
            })?;
        let key = (concrete.name(), cap.name.clone());
        if self.tables.contains_key(&key) {
            return Err(DispatchError::DuplicateImpl {
                ty: concrete.name(),
                capability: cap.name.clone(),
            }
            .into());
        }

        let provided: HashMap<&TenStr, DispatchFn> =
            fns.iter().map(|(name, f)| (name, *f)).collect();
        if let Some((extra, _)) = fns.iter().find(|(name, _)| !cap.methods.contains_key(name)) {
            return Err(DispatchError::IncompleteImpl {
                ty: concrete.name(),
                capability: cap.name.clone(),
                method: extra.clone(),
            }
            .into());
        }
        let mut slots = Vec::with_capacity(cap.methods.len());
        for sig in cap.methods.values() {
            match provided.get(&sig.name) {
                Some(f) => slots.push(*f),
                None => {
                    return Err(DispatchError::IncompleteImpl {
                        ty: concrete.name(),
                        capability: cap.name.clone(),
                        method: sig.name.clone(),
                    }
                    .into())
                }
            }
        }

        self.tables.insert(
            key,
            Rc::new(VTable {
                capability: cap,
                concrete,
                slots,
            }),
        );
        Ok(())
    }

    /// Wrap a handle into a type-erased trait object for `capability`.
    ///
    /// The handle's concrete type must have a registered vtable; the trait
    /// object takes ownership of the handle and is destroyed with it.
    pub fn make_trait_object(&self, handle: Handle, capability: &str) -> TenResult<TraitObject> {
        if !self.capabilities.contains_key(capability) {
            return Err(DispatchError::UnknownCapability {
                name: capability.into(),
            }
            .into());
        }
        let key = (handle.type_tag().name(), TenStr::from(capability));
        match self.tables.get(&key) {
            Some(vtable) => Ok(TraitObject {
                handle,
                vtable: vtable.clone(),
            }),
            None => Err(DispatchError::CapabilityNotImplemented {
                ty: handle.type_tag().name(),
                capability: capability.into(),
            }
            .into()),
        }
    }
}

impl Default for VTableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A (handle, vtable) pair enabling dispatch without revealing the concrete
/// type. Owns its handle; torn down with it.
#[derive(Debug)]
pub struct TraitObject {
    handle: Handle,
    vtable: Rc<VTable>,
}

impl TraitObject {
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn capability(&self) -> &TenStr {
        self.vtable.capability().name()
    }

    pub fn concrete_type(&self) -> &Type {
        self.vtable.concrete_type()
    }

    /// Dispatch by method name: name to slot index, then an array-indexed
    /// call with the receiver under a shared borrow.
    pub fn dispatch(
        &self,
        borrows: &BorrowTracker,
        method: &str,
        args: &[Value],
    ) -> TenResult<Value> {
        let index = self
            .vtable
            .capability()
            .method_index(method)
            .ok_or_else(|| DispatchError::MethodNotFound {
                capability: self.capability().clone(),
                method: method.into(),
            })?;
        self.dispatch_index(borrows, index, args)
    }

    /// Dispatch by precomputed slot index. O(1).
    pub fn dispatch_index(
        &self,
        borrows: &BorrowTracker,
        index: usize,
        args: &[Value],
    ) -> TenResult<Value> {
        let f = self
            .vtable
            .slot(index)
            .ok_or_else(|| DispatchError::MethodNotFound {
                capability: self.capability().clone(),
                method: format!("#{}", index).into(),
            })?;
        let guard = borrows.borrow_shared(&self.handle)?;
        let value = guard.value()?;
        let result = f(&value, args);
        Ok(result)
    }
}
