//! Copy-on-write value cells
//!
//! A `CowCell` starts out sharing one canonical, reference-counted value
//! with its siblings. Reads never clone. The first mutation of an instance
//! clones the canonical value into a private copy and flips that instance to
//! exclusive; the canonical value and every sibling are untouched. That
//! isolation is the central correctness property of the component.
//!
//! Cloning goes through the conversion registry's identity/clone edge for
//! the value's type, so user types get copy-on-write as soon as they
//! register a clone edge. The canonical value is freed when its last
//! referrer drops; cycles between canonical values are never collected
//! (hold a `SharedWeak` back-reference instead).

use crate::convert::ConversionRegistry;
use crate::error::TenResult;
use std::cell::Cell;
use std::rc::Rc;
use tenure_val::{Shared, Value};

enum CowState {
    /// Reference to the canonical value, shared with siblings.
    Shared(Rc<Value>),
    /// Private copy, owned by this instance alone.
    Exclusive(Value),
}

/// A value wrapper that defers cloning until first mutation while shared.
pub struct CowCell {
    conversions: Shared<ConversionRegistry>,
    /// Clones performed across the whole family of instances.
    clones: Rc<Cell<usize>>,
    state: CowState,
}

impl CowCell {
    pub fn new(conversions: Shared<ConversionRegistry>, value: impl Into<Value>) -> Self {
        Self {
            conversions,
            clones: Rc::new(Cell::new(0)),
            state: CowState::Shared(Rc::new(value.into())),
        }
    }

    /// A new instance referencing the same canonical value.
    ///
    /// An exclusive instance first promotes its private copy to canonical
    /// (a move, not a clone) and becomes shared again.
    pub fn share(&mut self) -> CowCell {
        if let CowState::Exclusive(_) = self.state {
            let value = match std::mem::replace(&mut self.state, CowState::Shared(Rc::new(Value::Nil))) {
                CowState::Exclusive(value) => value,
                CowState::Shared(_) => unreachable!(),
            };
            self.state = CowState::Shared(Rc::new(value));
        }
        match &self.state {
            CowState::Shared(canonical) => CowCell {
                conversions: self.conversions.clone(),
                clones: self.clones.clone(),
                state: CowState::Shared(canonical.clone()),
            },
            CowState::Exclusive(_) => unreachable!(),
        }
    }

    /// Read the current value: canonical if shared, private if exclusive.
    /// Never clones. O(1).
    pub fn view(&self) -> &Value {
        match &self.state {
            CowState::Shared(canonical) => canonical,
            CowState::Exclusive(value) => value,
        }
    }

    /// Write access to a private copy.
    ///
    /// While shared, clones the canonical value through the conversion
    /// registry's identity edge, O(size of value); once exclusive, direct
    /// access, O(1). Siblings and the canonical value are never affected.
    pub fn mutate(&mut self) -> TenResult<&mut Value> {
        if let CowState::Shared(canonical) = &self.state {
            let target = canonical.type_of();
            let cloned = self.conversions.borrow().convert(canonical, &target)?;
            self.clones.set(self.clones.get() + 1);
            self.state = CowState::Exclusive(cloned);
        }
        match &mut self.state {
            CowState::Exclusive(value) => Ok(value),
            CowState::Shared(_) => unreachable!("promoted above"),
        }
    }

    /// Consume the cell: move the private copy if exclusive, otherwise
    /// clone the canonical value. When this instance is the last referrer
    /// the canonical value is moved out instead of cloned.
    pub fn into_owned(self) -> TenResult<Value> {
        match self.state {
            CowState::Exclusive(value) => Ok(value),
            CowState::Shared(canonical) => match Rc::try_unwrap(canonical) {
                Ok(value) => Ok(value),
                Err(canonical) => {
                    let target = canonical.type_of();
                    let cloned = self.conversions.borrow().convert(&canonical, &target)?;
                    self.clones.set(self.clones.get() + 1);
                    Ok(cloned)
                }
            },
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.state, CowState::Shared(_))
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.state, CowState::Exclusive(_))
    }

    /// Clones performed so far across all instances of this family.
    pub fn clone_count(&self) -> usize {
        self.clones.get()
    }

    /// Live references to the canonical value; 0 once exclusive.
    pub fn canonical_refs(&self) -> usize {
        match &self.state {
            CowState::Shared(canonical) => Rc::strong_count(canonical),
            CowState::Exclusive(_) => 0,
        }
    }
}
