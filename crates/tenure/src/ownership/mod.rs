//! Runtime-checked ownership for the tenure runtime
//!
//! This module reproduces, with explicit counters and state tags checked on
//! every operation, the discipline a borrow checker enforces at compile
//! time:
//!
//! 1. Every value has exactly one owning handle at a time
//! 2. Moving a handle invalidates the source (use-after-move is an error)
//! 3. Any number of shared borrows, or one exclusive borrow, never both
//! 4. Borrows are released explicitly or on guard drop, idempotently
//!
//! The registry owns the slots; handles are opaque tokens into it. All
//! checks are eager: a conflicting borrow fails at acquire time.

pub mod borrow;
pub mod registry;

pub use borrow::{BorrowKind, BorrowTracker, Guard, GuardMut};
pub use registry::{Handle, HandleId, HandleState, OwnershipRegistry, SlotState, TeardownFn};
