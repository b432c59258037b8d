//! Slot storage and single-owner handle tracking
//!
//! The registry allocates one slot per created value and hands out opaque
//! handles. A handle is the only way to reach its slot; moving it with
//! [`OwnershipRegistry::take`] issues a fresh handle for the same slot and
//! marks the source `Moved`, after which every access through the old token
//! fails with `UseAfterMove`.

use crate::error::{OwnershipError, TenResult};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tenure_val::{TenStr, Type, Value};

/// Identifies a handle issued by the registry. Monotonic, never reused.
pub type HandleId = u64;

/// Index of a slot inside the registry.
pub(crate) type SlotId = usize;

/// Teardown callback attached to a slot, invoked exactly once when the slot
/// is released. A failing callback is recorded by the lifecycle manager and
/// never propagates up the unwind.
pub type TeardownFn = Rc<dyn Fn(&Value) -> Result<(), TenStr>>;

/// Lifecycle state of a handle token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum HandleState {
    Active,
    Moved,
    Released,
}

/// Lifecycle state of a slot. Terminal at `Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SlotState {
    Active,
    TearingDown,
    Released,
}

/// Storage cell for one owned value.
///
/// The fields are individually cell-guarded so that borrow bookkeeping
/// (counter, state) never contends with a live reference into the value:
/// releasing a guard while a value reference is still held must not panic.
pub(crate) struct Slot {
    pub(crate) value: RefCell<Value>,
    /// 0 = free, N > 0 = N shared borrows, -1 = one exclusive borrow.
    pub(crate) counter: Cell<i32>,
    pub(crate) teardown: Option<TeardownFn>,
    /// Composite fields in declared order, torn down first-to-last.
    pub(crate) children: RefCell<Vec<(TenStr, HandleId)>>,
    pub(crate) state: Cell<SlotState>,
}

impl Slot {
    fn new(value: Value, teardown: Option<TeardownFn>) -> Self {
        Self {
            value: RefCell::new(value),
            counter: Cell::new(0),
            teardown,
            children: RefCell::new(Vec::new()),
            state: Cell::new(SlotState::Active),
        }
    }
}

/// Opaque token identifying one owned value slot.
///
/// Handles are only constructible through the registry and carry no `Clone`:
/// exactly one live binding owns a slot at a time. The runtime state of the
/// token (active, moved, released) lives in the registry, so a stale token
/// held past a move or a scope teardown fails loudly instead of reading
/// freed storage.
#[derive(Debug)]
pub struct Handle {
    id: HandleId,
    ty: Type,
}

impl Handle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Concrete type tag of the underlying value at creation time.
    pub fn type_tag(&self) -> &Type {
        &self.ty
    }
}

pub(crate) struct HandleEntry {
    pub(crate) slot: SlotId,
    pub(crate) state: HandleState,
}

/// Allocates value slots and tracks single-owner handles.
pub struct OwnershipRegistry {
    slots: Vec<Rc<Slot>>,
    entries: HashMap<HandleId, HandleEntry>,
    next_handle: HandleId,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            entries: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Allocate a slot and return an active handle owning it. O(1).
    pub fn create(&mut self, value: impl Into<Value>) -> Handle {
        self.alloc(value.into(), None)
    }

    /// Like [`create`](Self::create), with a teardown callback fired exactly
    /// once when the slot is released.
    pub fn create_with_teardown(&mut self, value: impl Into<Value>, teardown: TeardownFn) -> Handle {
        self.alloc(value.into(), Some(teardown))
    }

    fn alloc(&mut self, value: Value, teardown: Option<TeardownFn>) -> Handle {
        let ty = value.type_of();
        let slot = self.slots.len();
        self.slots.push(Rc::new(Slot::new(value, teardown)));
        self.issue(slot, ty)
    }

    fn issue(&mut self, slot: SlotId, ty: Type) -> Handle {
        let id = self.next_handle;
        self.next_handle += 1;
        self.entries.insert(
            id,
            HandleEntry {
                slot,
                state: HandleState::Active,
            },
        );
        Handle { id, ty }
    }

    /// Move the slot to a fresh handle, marking the source `Moved`.
    ///
    /// Fails if the source is not active, or if the slot is currently
    /// borrowed: a value cannot be moved out from under a live borrow.
    pub fn take(&mut self, handle: &Handle) -> TenResult<Handle> {
        let slot = self.check_active(handle)?;
        let counter = self.slots[slot].counter.get();
        if counter != 0 {
            return Err(OwnershipError::BorrowConflict {
                requested: crate::ownership::borrow::BorrowKind::Take,
                counter,
            }
            .into());
        }
        self.entries.get_mut(&handle.id).expect("checked above").state = HandleState::Moved;
        Ok(self.issue(slot, handle.ty.clone()))
    }

    /// Absorb `fields` into a new composite slot.
    ///
    /// The children leave independent ownership: they are still readable
    /// through their handles, but they are torn down with the parent, in
    /// declared field order. Borrowed or non-active fields are rejected and
    /// nothing is absorbed.
    pub fn create_composite(
        &mut self,
        name: impl Into<TenStr>,
        fields: Vec<(TenStr, Handle)>,
    ) -> TenResult<Handle> {
        let mut record = tenure_val::Record::new(name.into());
        for (field, handle) in &fields {
            let slot = self
                .check_active(handle)
                .map_err(|_| OwnershipError::NotAbsorbable { field: field.clone() })?;
            if self.slots[slot].counter.get() != 0 {
                return Err(OwnershipError::NotAbsorbable { field: field.clone() }.into());
            }
            // The record lists the field names; field data stays in the
            // child slots, reachable through their handles until teardown.
            record.set(field.clone(), self.slots[slot].value.borrow().type_of().name());
        }
        let parent = self.alloc(Value::Record(record), None);
        let parent_slot = self.entries[&parent.id].slot;
        let children: Vec<(TenStr, HandleId)> =
            fields.into_iter().map(|(name, h)| (name, h.id)).collect();
        *self.slots[parent_slot].children.borrow_mut() = children;
        Ok(parent)
    }

    /// Current state of the handle token.
    pub fn state_of(&self, handle: &Handle) -> HandleState {
        self.entries
            .get(&handle.id)
            .map(|e| e.state)
            .unwrap_or(HandleState::Released)
    }

    /// Snapshot of the slot's value. Checked like a shared borrow: fails
    /// while an exclusive borrow is held.
    pub fn value_of(&self, handle: &Handle) -> TenResult<Value> {
        let slot = self.check_active(handle)?;
        let cell = &self.slots[slot];
        let counter = cell.counter.get();
        if counter == -1 {
            return Err(OwnershipError::BorrowConflict {
                requested: crate::ownership::borrow::BorrowKind::Shared,
                counter,
            }
            .into());
        }
        Ok(cell.value.borrow().clone())
    }

    /// Borrow counter of the slot behind the handle, for inspection.
    pub fn counter_of(&self, handle: &Handle) -> TenResult<i32> {
        let slot = self.check_active(handle)?;
        Ok(self.slots[slot].counter.get())
    }

    pub(crate) fn check_active(&self, handle: &Handle) -> TenResult<SlotId> {
        match self.entries.get(&handle.id) {
            None => Err(OwnershipError::UnknownHandle { handle: handle.id }.into()),
            Some(entry) => match entry.state {
                HandleState::Active => Ok(entry.slot),
                HandleState::Moved => {
                    Err(OwnershipError::UseAfterMove { handle: handle.id }.into())
                }
                HandleState::Released => {
                    Err(OwnershipError::HandleReleased { handle: handle.id }.into())
                }
            },
        }
    }

    pub(crate) fn slot_cell(&self, slot: SlotId) -> Rc<Slot> {
        self.slots[slot].clone()
    }

    pub(crate) fn entry(&self, id: HandleId) -> Option<&HandleEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn mark_released(&mut self, id: HandleId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = HandleState::Released;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for OwnershipRegistry {
    fn default() -> Self {
        Self::new()
    }
}
