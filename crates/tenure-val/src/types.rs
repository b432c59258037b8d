use crate::TenStr;
use std::fmt;

/// Runtime type tag attached to handles, conversion edges and vtables.
///
/// `SelfTy` and `Generic` never tag a live value; they only appear inside
/// method signatures, where they mark the two shapes that cannot be placed
/// in a fixed-size dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Type {
    #[default]
    Any,
    Void,
    Bool,
    Byte,
    Int,
    Uint,
    Float,
    Str,
    List,
    Record(TenStr),
    User(TenStr),
    /// A method returning the implementing type itself.
    SelfTy,
    /// An unconstrained type parameter.
    Generic(TenStr),
}

impl Type {
    pub fn name(&self) -> TenStr {
        match self {
            Type::Record(name) => name.clone(),
            Type::User(name) => name.clone(),
            Type::Generic(name) => name.clone(),
            Type::SelfTy => "Self".into(),
            _ => format!("{:?}", self).to_lowercase().into(),
        }
    }

    /// Whether a value of this type can appear behind a dispatch table.
    pub fn is_dispatchable(&self) -> bool {
        !matches!(self, Type::SelfTy | Type::Generic(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One method signature inside a capability.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub name: TenStr,
    pub params: Vec<Type>,
    pub ret: Type,
}

impl MethodSig {
    pub fn new(name: impl Into<TenStr>, params: Vec<Type>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
        }
    }
}
