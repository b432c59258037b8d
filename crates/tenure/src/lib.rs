//! tenure: an ownership-tracked polymorphism and resource-lifecycle runtime
//!
//! tenure reproduces, at run time and without compiler support, the
//! guarantees a borrow checker provides at compile time: single-owner move
//! semantics, shared-vs-exclusive borrowing, type-erased dynamic dispatch,
//! copy-on-write cloning, deterministic teardown ordering and single-hop
//! fallible/infallible conversion. It is a pure in-process library: a
//! hosting application opens a scope per logical unit of work, creates
//! values through the [`Runtime`], and lets scope exit tear everything down
//! in reverse creation order.

pub mod convert;
pub mod cow;
pub mod error;
pub mod ownership;
pub mod runtime;
pub mod scope;
pub mod vtable;

pub use convert::{ConversionEdge, ConversionRegistry, FallibleFn, InfallibleFn};
pub use cow::CowCell;
pub use error::{
    ConvertError, DispatchError, LifecycleError, OwnershipError, TenResult, TenureError,
};
pub use ownership::{
    BorrowKind, BorrowTracker, Guard, GuardMut, Handle, HandleId, HandleState, OwnershipRegistry,
    SlotState, TeardownFn,
};
pub use runtime::{with_runtime, Runtime};
pub use scope::{LifecycleManager, ScopeId, TeardownFault};
pub use vtable::{Capability, DispatchFn, TraitObject, VTable, VTableRegistry};

pub use tenure_val::{MethodSig, Record, TenStr, Type, Value};
