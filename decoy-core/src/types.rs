//! Neutral type model
//!
//! Matchers, members and default values all reason about types at runtime.
//! [`TypeDesc`] is the small closed vocabulary they share, with the
//! assignability rules the matcher framework needs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-defined type known only by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedType {
    pub name: String,
    /// Value types reject null unless wrapped in [`TypeDesc::Nullable`].
    pub value_type: bool,
    /// Names of every type or interface this type can be assigned to.
    pub supertypes: Vec<String>,
}

impl NamedType {
    /// A reference type with no supertypes.
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: false,
            supertypes: Vec::new(),
        }
    }

    /// A value type with no supertypes.
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: true,
            supertypes: Vec::new(),
        }
    }

    /// Add a supertype this type can be assigned to.
    pub fn with_supertype(mut self, name: impl Into<String>) -> Self {
        self.supertypes.push(name.into());
        self
    }

    fn is_subtype_of(&self, name: &str) -> bool {
        self.name == name || self.supertypes.iter().any(|s| s == name)
    }
}

/// Runtime type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDesc {
    /// No value (void return)
    Unit,
    Bool,
    Int,
    UInt,
    Float,
    Str,
    /// Top type, every value is assignable to it
    Object,
    Array(Box<TypeDesc>),
    /// Enumerable sequence
    Seq(Box<TypeDesc>),
    Tuple(Vec<TypeDesc>),
    Nullable(Box<TypeDesc>),
    /// A mockable interface, by name
    Interface(String),
    Named(NamedType),
    /// A call description passed around as data
    Expr,
    /// Open generic type parameter of a member
    Param(String),
}

impl TypeDesc {
    pub fn array(elem: TypeDesc) -> Self {
        TypeDesc::Array(Box::new(elem))
    }

    pub fn seq(elem: TypeDesc) -> Self {
        TypeDesc::Seq(Box::new(elem))
    }

    pub fn nullable(inner: TypeDesc) -> Self {
        TypeDesc::Nullable(Box::new(inner))
    }

    pub fn interface(name: impl Into<String>) -> Self {
        TypeDesc::Interface(name.into())
    }

    /// Whether values of this type are copied rather than referenced.
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeDesc::Bool
            | TypeDesc::Int
            | TypeDesc::UInt
            | TypeDesc::Float
            | TypeDesc::Tuple(_)
            | TypeDesc::Nullable(_) => true,
            TypeDesc::Named(named) => named.value_type,
            _ => false,
        }
    }

    /// Whether `null` is a legal value of this type.
    pub fn accepts_null(&self) -> bool {
        match self {
            TypeDesc::Nullable(_) | TypeDesc::Param(_) => true,
            TypeDesc::Unit => false,
            other => !other.is_value_type(),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, TypeDesc::Unit)
    }

    /// Element type of arrays and sequences.
    pub fn element_type(&self) -> Option<&TypeDesc> {
        match self {
            TypeDesc::Array(elem) | TypeDesc::Seq(elem) => Some(elem),
            _ => None,
        }
    }

    /// Whether a value statically typed `other` can be stored in `self`.
    pub fn is_assignable_from(&self, other: &TypeDesc) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (TypeDesc::Object, other) => !other.is_unit(),
            (TypeDesc::Param(_), _) | (_, TypeDesc::Param(_)) => true,
            (TypeDesc::Nullable(inner), TypeDesc::Nullable(other_inner)) => {
                inner.is_assignable_from(other_inner)
            }
            (TypeDesc::Nullable(inner), other) => inner.is_assignable_from(other),
            (TypeDesc::Seq(elem), TypeDesc::Array(other_elem))
            | (TypeDesc::Seq(elem), TypeDesc::Seq(other_elem))
            | (TypeDesc::Array(elem), TypeDesc::Array(other_elem)) => {
                elem.is_assignable_from(other_elem)
            }
            (TypeDesc::Tuple(items), TypeDesc::Tuple(other_items)) => {
                items.len() == other_items.len()
                    && items
                        .iter()
                        .zip(other_items)
                        .all(|(a, b)| a.is_assignable_from(b))
            }
            (TypeDesc::Interface(name), TypeDesc::Named(named))
            | (TypeDesc::Named(NamedType { name, .. }), TypeDesc::Named(named)) => {
                named.is_subtype_of(name)
            }
            _ => false,
        }
    }

    /// Whether two types can ever describe the same value.
    ///
    /// Used to reject matchers that could never match a parameter.
    pub fn is_compatible_with(&self, other: &TypeDesc) -> bool {
        self.is_assignable_from(other) || other.is_assignable_from(self)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Unit => write!(f, "void"),
            TypeDesc::Bool => write!(f, "bool"),
            TypeDesc::Int => write!(f, "int"),
            TypeDesc::UInt => write!(f, "uint"),
            TypeDesc::Float => write!(f, "float"),
            TypeDesc::Str => write!(f, "string"),
            TypeDesc::Object => write!(f, "object"),
            TypeDesc::Array(elem) => write!(f, "{}[]", elem),
            TypeDesc::Seq(elem) => write!(f, "seq<{}>", elem),
            TypeDesc::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            TypeDesc::Nullable(inner) => write!(f, "{}?", inner),
            TypeDesc::Interface(name) => write!(f, "{}", name),
            TypeDesc::Named(named) => write!(f, "{}", named.name),
            TypeDesc::Expr => write!(f, "expr"),
            TypeDesc::Param(name) => write!(f, "{}", name),
        }
    }
}
