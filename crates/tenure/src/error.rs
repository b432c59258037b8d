//! Error types and diagnostics for the tenure runtime
//!
//! Every operation that can fail returns an explicit result carrying one of
//! the error categories below, each with a stable `miette` error code.
//!
//! Recoverable errors (use-after-move, borrow conflicts, missing
//! capabilities or conversion edges) are expected runtime conditions and are
//! meant to be handled locally by the caller. Fatal errors (duplicate
//! registrations, object-safety violations, double teardown) indicate a
//! programming defect: they fail the registration that raised them and
//! should abort initialization rather than be absorbed.

use crate::ownership::borrow::BorrowKind;
use miette::Diagnostic;
use tenure_val::TenStr;
use thiserror::Error;

// Re-export commonly used types
pub use miette::Result;

/// Alias for Result type with tenure errors
pub type TenResult<T> = std::result::Result<T, TenureError>;

/// Comprehensive error type for the tenure runtime
#[derive(Error, Diagnostic, Debug)]
pub enum TenureError {
    /// Ownership and borrow errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ownership(#[from] OwnershipError),

    /// Dynamic dispatch errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),

    /// Type conversion errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Convert(#[from] ConvertError),

    /// Scope and teardown errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Generic error message (for converting from other error types)
    #[error("{0}")]
    Msg(String),
}

impl From<String> for TenureError {
    fn from(msg: String) -> Self {
        TenureError::Msg(msg)
    }
}

impl<'a> From<&'a str> for TenureError {
    fn from(msg: &'a str) -> Self {
        TenureError::Msg(msg.to_string())
    }
}

impl TenureError {
    /// Whether this error indicates a programming defect rather than an
    /// expected runtime condition.
    pub fn is_fatal(&self) -> bool {
        match self {
            TenureError::Dispatch(DispatchError::ObjectSafetyViolation { .. }) => true,
            TenureError::Dispatch(DispatchError::DuplicateCapability { .. }) => true,
            TenureError::Dispatch(DispatchError::DuplicateImpl { .. }) => true,
            TenureError::Convert(ConvertError::ConversionConflict { .. }) => true,
            TenureError::Lifecycle(LifecycleError::DoubleTeardown { .. }) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Ownership Errors (E0101-E0199)
// ============================================================================

/// Ownership and borrow discipline errors
#[derive(Error, Diagnostic, Debug)]
pub enum OwnershipError {
    /// Access through a moved-from handle
    #[error("use after move")]
    #[diagnostic(
        code(tenure_own_E0101),
        help("Handle {handle} was moved; use the handle returned by take() instead")
    )]
    UseAfterMove { handle: u64 },

    /// Access through a handle whose slot was already torn down
    #[error("handle already released")]
    #[diagnostic(
        code(tenure_own_E0102),
        help("Handle {handle} was released; it cannot be used after teardown")
    )]
    HandleReleased { handle: u64 },

    /// Handle was never issued by this registry
    #[error("unknown handle")]
    #[diagnostic(
        code(tenure_own_E0103),
        help("Handle {handle} is not known to this registry")
    )]
    UnknownHandle { handle: u64 },

    /// Requested borrow conflicts with borrows already held
    #[error("borrow conflict")]
    #[diagnostic(
        code(tenure_own_E0104),
        help("Cannot acquire a {requested} borrow while the slot counter is {counter} \
              (0 = free, N > 0 = N shared borrows, -1 = one exclusive borrow)")
    )]
    BorrowConflict { requested: BorrowKind, counter: i32 },

    /// A composite field handle was not in a transferable state
    #[error("cannot absorb handle into composite")]
    #[diagnostic(
        code(tenure_own_E0105),
        help("Field '{field}' is borrowed or no longer active; composites take full ownership of their fields")
    )]
    NotAbsorbable { field: TenStr },

    /// Access through a guard whose borrow was already given back
    #[error("stale guard")]
    #[diagnostic(
        code(tenure_own_E0106),
        help("The borrow on handle {handle} was released; acquire a fresh borrow instead of reusing the guard")
    )]
    StaleGuard { handle: u64 },
}

// ============================================================================
// Dispatch Errors (E0201-E0299)
// ============================================================================

/// Capability registration and dynamic dispatch errors
#[derive(Error, Diagnostic, Debug)]
pub enum DispatchError {
    /// A capability method cannot be represented in a dispatch table
    #[error("object safety violation")]
    #[diagnostic(
        code(tenure_dispatch_E0201),
        help("Method '{method}' of capability '{capability}' {reason}; such signatures \
              cannot be placed in a fixed-size dispatch table")
    )]
    ObjectSafetyViolation {
        capability: TenStr,
        method: TenStr,
        reason: TenStr,
    },

    /// Capability name registered twice
    #[error("duplicate capability")]
    #[diagnostic(
        code(tenure_dispatch_E0202),
        help("Capability '{name}' is already defined; capabilities are registered once and never mutated")
    )]
    DuplicateCapability { name: TenStr },

    /// Capability name not defined
    #[error("unknown capability")]
    #[diagnostic(code(tenure_dispatch_E0203), help("Capability '{name}' has not been defined"))]
    UnknownCapability { name: TenStr },

    /// A vtable for this (type, capability) pair already exists
    #[error("duplicate impl")]
    #[diagnostic(
        code(tenure_dispatch_E0204),
        help("Type '{ty}' already implements capability '{capability}'")
    )]
    DuplicateImpl { ty: TenStr, capability: TenStr },

    /// The function table does not match the capability's method set
    #[error("incomplete impl")]
    #[diagnostic(
        code(tenure_dispatch_E0205),
        help("Impl of '{capability}' for '{ty}' does not cover method '{method}' \
              (every capability method must be provided, with no extras)")
    )]
    IncompleteImpl {
        ty: TenStr,
        capability: TenStr,
        method: TenStr,
    },

    /// No vtable registered for the handle's concrete type
    #[error("capability not implemented")]
    #[diagnostic(
        code(tenure_dispatch_E0206),
        help("Type '{ty}' has no registered impl of capability '{capability}'")
    )]
    CapabilityNotImplemented { ty: TenStr, capability: TenStr },

    /// Method name not part of the bound capability
    #[error("method not found")]
    #[diagnostic(
        code(tenure_dispatch_E0207),
        help("Capability '{capability}' has no method '{method}'")
    )]
    MethodNotFound { capability: TenStr, method: TenStr },
}

// ============================================================================
// Conversion Errors (E0301-E0399)
// ============================================================================

/// Type conversion errors
#[derive(Error, Diagnostic, Debug)]
pub enum ConvertError {
    /// An edge for this ordered type pair already exists
    #[error("conversion conflict")]
    #[diagnostic(
        code(tenure_convert_E0301),
        help("A conversion from '{from}' to '{to}' is already registered; \
              at most one edge may exist per ordered type pair")
    )]
    ConversionConflict { from: TenStr, to: TenStr },

    /// No direct edge between the two types
    #[error("no conversion path")]
    #[diagnostic(
        code(tenure_convert_E0302),
        help("No conversion from '{from}' to '{to}' is registered; \
              conversion is single-hop only, chains are never searched")
    )]
    NoConversionPath { from: TenStr, to: TenStr },

    /// A fallible converter rejected its input
    #[error("conversion failed")]
    #[diagnostic(
        code(tenure_convert_E0303),
        help("Converting '{from}' to '{to}' failed: {reason}")
    )]
    ConversionFailed {
        from: TenStr,
        to: TenStr,
        reason: TenStr,
    },
}

// ============================================================================
// Lifecycle Errors (E0401-E0499)
// ============================================================================

/// Scope and teardown errors
#[derive(Error, Diagnostic, Debug)]
pub enum LifecycleError {
    /// A teardown callback was about to run a second time
    #[error("double teardown")]
    #[diagnostic(
        code(tenure_lifecycle_E0401),
        help("Slot {slot} is already released; invoking its teardown callback twice \
              is an internal defect, not a recoverable condition")
    )]
    DoubleTeardown { slot: usize },

    /// close_scope/abort_scope with no scope open
    #[error("no open scope")]
    #[diagnostic(
        code(tenure_lifecycle_E0402),
        help("Open a scope before closing one; the root frame is only unwound at shutdown")
    )]
    NoOpenScope,
}
