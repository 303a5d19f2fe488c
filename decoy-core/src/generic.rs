//! Type-level matchers for open generic members

use crate::types::TypeDesc;
use std::fmt;

/// Constraint on one generic type argument of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeMatcher {
    /// The type argument must be exactly this type.
    Exact(TypeDesc),
    AnyType,
    AnyReferenceType,
    AnyValueType,
    /// The type argument must be assignable to the given type.
    AssignableFrom(TypeDesc),
}

impl TypeMatcher {
    pub fn matches(&self, ty: &TypeDesc) -> bool {
        match self {
            TypeMatcher::Exact(expected) => expected == ty,
            TypeMatcher::AnyType => true,
            TypeMatcher::AnyReferenceType => !ty.is_value_type(),
            TypeMatcher::AnyValueType => ty.is_value_type(),
            TypeMatcher::AssignableFrom(target) => target.is_assignable_from(ty),
        }
    }
}

impl fmt::Display for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeMatcher::Exact(ty) => write!(f, "{}", ty),
            TypeMatcher::AnyType => write!(f, "AnyType"),
            TypeMatcher::AnyReferenceType => write!(f, "AnyReferenceType"),
            TypeMatcher::AnyValueType => write!(f, "AnyValueType"),
            TypeMatcher::AssignableFrom(target) => write!(f, "AssignableFrom<{}>", target),
        }
    }
}

impl From<TypeDesc> for TypeMatcher {
    fn from(ty: TypeDesc) -> Self {
        TypeMatcher::Exact(ty)
    }
}
