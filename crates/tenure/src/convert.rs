//! Single-hop type conversion registry
//!
//! Conversions are explicit edges between ordered type pairs, registered
//! once and resolved in O(1). There is no chaining through intermediate
//! types: either a direct edge exists or the conversion fails with
//! `NoConversionPath`. Duplicate registration of the same ordered pair fails
//! immediately at registration time, never at use time, and leaves the
//! first edge active.

use crate::error::{ConvertError, TenResult};
use std::collections::HashMap;
use tenure_val::{TenStr, Type, Value};

/// Converter that cannot fail.
pub type InfallibleFn = fn(&Value) -> Value;

/// Converter that may reject its input.
pub type FallibleFn = fn(&Value) -> Result<Value, TenStr>;

enum Converter {
    Infallible(InfallibleFn),
    Fallible(FallibleFn),
}

/// One registered conversion between an ordered type pair.
pub struct ConversionEdge {
    source: Type,
    target: Type,
    converter: Converter,
}

impl ConversionEdge {
    pub fn source(&self) -> &Type {
        &self.source
    }

    pub fn target(&self) -> &Type {
        &self.target
    }

    pub fn is_fallible(&self) -> bool {
        matches!(self.converter, Converter::Fallible(_))
    }
}

/// Standalone table of single-hop type conversions.
pub struct ConversionRegistry {
    edges: HashMap<(Type, Type), ConversionEdge>,
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }

    /// A registry pre-seeded with identity/clone edges for every built-in
    /// value type, so copy-on-write cloning always resolves.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins = [
            Type::Void,
            Type::Bool,
            Type::Byte,
            Type::Int,
            Type::Uint,
            Type::Float,
            Type::Str,
            Type::List,
        ];
        for ty in builtins {
            registry
                .register_infallible(ty.clone(), ty, |v| v.clone())
                .expect("builtin identity edges registered once");
        }
        registry
    }

    /// Register an edge that always succeeds. Fails fast with
    /// `ConversionConflict` if the ordered pair already has an edge.
    pub fn register_infallible(
        &mut self,
        source: Type,
        target: Type,
        f: InfallibleFn,
    ) -> TenResult<()> {
        self.insert(source, target, Converter::Infallible(f))
    }

    /// Register an edge that may reject its input. Same conflict rule.
    pub fn register_fallible(
        &mut self,
        source: Type,
        target: Type,
        f: FallibleFn,
    ) -> TenResult<()> {
        self.insert(source, target, Converter::Fallible(f))
    }

    fn insert(&mut self, source: Type, target: Type, converter: Converter) -> TenResult<()> {
        let key = (source.clone(), target.clone());
        if self.edges.contains_key(&key) {
            return Err(ConvertError::ConversionConflict {
                from: source.name(),
                to: target.name(),
            }
            .into());
        }
        self.edges.insert(
            key,
            ConversionEdge {
                source,
                target,
                converter,
            },
        );
        Ok(())
    }

    /// Convert `value` to `target` through the direct edge, if any.
    /// O(1); no multi-hop resolution.
    pub fn convert(&self, value: &Value, target: &Type) -> TenResult<Value> {
        let source = value.type_of();
        let edge = self.edges.get(&(source.clone(), target.clone())).ok_or_else(|| {
            ConvertError::NoConversionPath {
                from: source.name(),
                to: target.name(),
            }
        })?;
        match &edge.converter {
            Converter::Infallible(f) => Ok(f(value)),
            Converter::Fallible(f) => f(value).map_err(|reason| {
                ConvertError::ConversionFailed {
                    from: source.name(),
                    to: target.name(),
                    reason,
                }
                .into()
            }),
        }
    }

    /// The registered edge for an ordered type pair, if any.
    pub fn edge(&self, source: &Type, target: &Type) -> Option<&ConversionEdge> {
        self.edges.get(&(source.clone(), target.clone()))
    }

    pub fn has_edge(&self, source: &Type, target: &Type) -> bool {
        self.edge(source, target).is_some()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Range-checked narrowing from int to byte, the canonical fallible edge.
pub fn int_to_byte(value: &Value) -> Result<Value, TenStr> {
    match value.as_int() {
        Some(n) if (0..=255).contains(&n) => Ok(Value::Byte(n as u8)),
        Some(n) => Err(format!("{} is out of range for byte", n).into()),
        None => Err("not an int".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TenureError;

    #[test]
    fn test_duplicate_registration_fails_fast() {
        let mut reg = ConversionRegistry::new();
        reg.register_fallible(Type::Int, Type::Byte, int_to_byte)
            .unwrap();
        let err = reg
            .register_fallible(Type::Int, Type::Byte, |_| Err("other".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            TenureError::Convert(ConvertError::ConversionConflict { .. })
        ));

        // first registration remains active
        assert_eq!(
            reg.convert(&Value::from(7), &Type::Byte).unwrap(),
            Value::Byte(7)
        );
    }

    #[test]
    fn test_range_check_rejects_never_wraps() {
        let mut reg = ConversionRegistry::new();
        reg.register_fallible(Type::Int, Type::Byte, int_to_byte)
            .unwrap();

        let err = reg.convert(&Value::from(300), &Type::Byte).unwrap_err();
        assert!(matches!(
            err,
            TenureError::Convert(ConvertError::ConversionFailed { .. })
        ));
    }

    #[test]
    fn test_no_multi_hop() {
        let mut reg = ConversionRegistry::new();
        reg.register_infallible(Type::Int, Type::Float, |v| {
            Value::Float(v.as_int().unwrap_or(0) as f64)
        })
        .unwrap();
        reg.register_infallible(Type::Float, Type::Str, |v| {
            Value::from(format!("{}", v))
        })
        .unwrap();

        // int -> float and float -> str exist; int -> str is not searched
        let err = reg.convert(&Value::from(1), &Type::Str).unwrap_err();
        assert!(matches!(
            err,
            TenureError::Convert(ConvertError::NoConversionPath { .. })
        ));
    }

    #[test]
    fn test_opposite_direction_is_distinct() {
        let mut reg = ConversionRegistry::new();
        reg.register_fallible(Type::Int, Type::Byte, int_to_byte)
            .unwrap();
        assert!(reg.has_edge(&Type::Int, &Type::Byte));
        assert!(!reg.has_edge(&Type::Byte, &Type::Int));
        reg.register_infallible(Type::Byte, Type::Int, |v| {
            Value::Int(v.as_byte().unwrap_or(0) as i32)
        })
        .unwrap();
        assert!(reg.has_edge(&Type::Byte, &Type::Int));
    }

    #[test]
    fn test_edge_inspection() {
        let mut reg = ConversionRegistry::new();
        reg.register_fallible(Type::Int, Type::Byte, int_to_byte)
            .unwrap();
        reg.register_infallible(Type::Byte, Type::Int, |v| {
            Value::Int(v.as_byte().unwrap_or(0) as i32)
        })
        .unwrap();

        let narrowing = reg.edge(&Type::Int, &Type::Byte).unwrap();
        assert!(narrowing.is_fallible());
        assert_eq!(narrowing.source(), &Type::Int);
        assert_eq!(narrowing.target(), &Type::Byte);

        let widening = reg.edge(&Type::Byte, &Type::Int).unwrap();
        assert!(!widening.is_fallible());

        assert!(reg.edge(&Type::Int, &Type::Str).is_none());
    }

    #[test]
    fn test_builtin_identity_edges() {
        let reg = ConversionRegistry::with_builtins();
        assert!(reg.has_edge(&Type::Str, &Type::Str));
        let cloned = reg.convert(&Value::from("hello"), &Type::Str).unwrap();
        assert_eq!(cloned, Value::from("hello"));
    }
}
