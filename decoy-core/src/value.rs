//! Dynamic argument and return values
//!
//! Intercepted calls carry their arguments as [`Value`]s. The [`ArgValue`]
//! trait bridges between plain Rust types and values so that typed matchers,
//! callbacks and return functions can be written against real types.

use crate::expr::Expr;
use crate::types::{NamedType, TypeDesc};
use crate::MockId;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

// ============================================================================
// OPAQUE OBJECTS
// ============================================================================

/// Payload of a [`Value::Object`].
///
/// Implemented for every `PartialEq + Debug` type, so any plain struct can be
/// passed through the engine.
pub trait ObjectData: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn ObjectData) -> bool;
}

impl<T> ObjectData for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn ObjectData) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }
}

/// A user-defined value with a named type.
#[derive(Clone)]
pub struct ObjectValue {
    pub ty: NamedType,
    data: Arc<dyn ObjectData>,
}

impl ObjectValue {
    pub fn new<T: ObjectData>(ty: NamedType, data: T) -> Self {
        Self {
            ty,
            data: Arc::new(data),
        }
    }

    /// Borrow the payload as a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref::<T>()
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &ObjectValue) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.data.eq_dyn(other.data.as_ref())
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.data)
    }
}

// ============================================================================
// MOCK HANDLES
// ============================================================================

/// A mock instance as seen from inside the value model.
///
/// The engine crate implements this for its mock state; the core crate only
/// needs identity and the set of interfaces the instance answers to.
pub trait MockObject: Send + Sync {
    fn mock_id(&self) -> MockId;

    /// Name of the primary mocked interface.
    fn interface_name(&self) -> &str;

    /// Whether this instance can stand in for the named interface.
    fn implements(&self, interface: &str) -> bool;

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Shared handle to a mock instance.
///
/// A handle is normally strong. [`MockRef::downgrade`] gives a weak handle
/// that keeps identity and interface name but not the mock itself, for
/// places that would otherwise close a reference cycle.
#[derive(Clone)]
pub struct MockRef(Handle);

#[derive(Clone)]
enum Handle {
    Strong(Arc<dyn MockObject>),
    Weak {
        id: MockId,
        interface: Arc<str>,
        object: Weak<dyn MockObject>,
    },
}

impl MockRef {
    pub fn new(object: Arc<dyn MockObject>) -> Self {
        Self(Handle::Strong(object))
    }

    /// Weak handle to the same mock.
    pub fn downgrade(&self) -> Self {
        match &self.0 {
            Handle::Strong(object) => Self(Handle::Weak {
                id: object.mock_id(),
                interface: Arc::from(object.interface_name()),
                object: Arc::downgrade(object),
            }),
            Handle::Weak { .. } => self.clone(),
        }
    }

    pub fn is_weak(&self) -> bool {
        matches!(self.0, Handle::Weak { .. })
    }

    pub fn id(&self) -> MockId {
        match &self.0 {
            Handle::Strong(object) => object.mock_id(),
            Handle::Weak { id, .. } => *id,
        }
    }

    pub fn interface_name(&self) -> &str {
        match &self.0 {
            Handle::Strong(object) => object.interface_name(),
            Handle::Weak { interface, .. } => interface,
        }
    }

    /// False once a weak handle's mock has been dropped.
    pub fn implements(&self, interface: &str) -> bool {
        self.object().is_some_and(|object| object.implements(interface))
    }

    /// Recover the concrete state behind the handle.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.object()?.as_any_arc().downcast::<T>().ok()
    }

    fn object(&self) -> Option<Arc<dyn MockObject>> {
        match &self.0 {
            Handle::Strong(object) => Some(Arc::clone(object)),
            Handle::Weak { object, .. } => object.upgrade(),
        }
    }
}

impl PartialEq for MockRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for MockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mock<{}:{}>", self.interface_name(), short_id(self.id()))
    }
}

/// Last eight hex digits of a mock id, enough to tell instances apart in
/// diagnostics.
pub fn short_id(id: MockId) -> String {
    let simple = id.simple().to_string();
    simple[simple.len() - 8..].to_string()
}

// ============================================================================
// VALUE
// ============================================================================

/// A dynamically typed argument or return value.
#[derive(Clone)]
pub enum Value {
    Null,
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Array { elem: TypeDesc, items: Vec<Value> },
    /// Enumerable sequence
    Seq { elem: TypeDesc, items: Vec<Value> },
    Tuple(Vec<Value>),
    Object(ObjectValue),
    Mock(MockRef),
    /// A call description passed as data
    Expr(Arc<Expr>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn array(elem: TypeDesc, items: Vec<Value>) -> Self {
        Value::Array { elem, items }
    }

    pub fn seq(elem: TypeDesc, items: Vec<Value>) -> Self {
        Value::Seq { elem, items }
    }

    pub fn object<T: ObjectData>(ty: NamedType, data: T) -> Self {
        Value::Object(ObjectValue::new(ty, data))
    }

    /// Convert any [`ArgValue`] into a value.
    pub fn of<T: ArgValue>(value: T) -> Self {
        value.into_value()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Items of arrays and sequences.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Array { items, .. } | Value::Seq { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn as_mock(&self) -> Option<&MockRef> {
        match self {
            Value::Mock(m) => Some(m),
            _ => None,
        }
    }

    /// Runtime type of this value, `None` for null.
    pub fn type_desc(&self) -> Option<TypeDesc> {
        let ty = match self {
            Value::Null => return None,
            Value::Unit => TypeDesc::Unit,
            Value::Bool(_) => TypeDesc::Bool,
            Value::Int(_) => TypeDesc::Int,
            Value::UInt(_) => TypeDesc::UInt,
            Value::Float(_) => TypeDesc::Float,
            Value::Str(_) => TypeDesc::Str,
            Value::Array { elem, .. } => TypeDesc::array(elem.clone()),
            Value::Seq { elem, .. } => TypeDesc::seq(elem.clone()),
            Value::Tuple(items) => TypeDesc::Tuple(
                items
                    .iter()
                    .map(|v| v.type_desc().unwrap_or(TypeDesc::Object))
                    .collect(),
            ),
            Value::Object(o) => TypeDesc::Named(o.ty.clone()),
            Value::Mock(m) => TypeDesc::Interface(m.interface_name().to_string()),
            Value::Expr(_) => TypeDesc::Expr,
        };
        Some(ty)
    }

    /// Reference identity: objects compare by allocation, mocks by id and
    /// everything else by value.
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Expr(a), Value::Expr(b)) => Arc::ptr_eq(a, b),
            (a, b) => a == b,
        }
    }

    /// Equality that treats any two sequences element-wise, regardless of
    /// whether they are arrays or enumerables.
    pub fn sequence_eq(&self, other: &Value) -> bool {
        match (self.as_sequence(), other.as_sequence()) {
            (Some(a), Some(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.sequence_eq(y))
            }
            _ => self == other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Int(a), Value::UInt(b)) | (Value::UInt(b), Value::Int(a)) => {
                u64::try_from(*a).map_or(false, |a| a == *b)
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (
                Value::Array { elem: ea, items: a },
                Value::Array { elem: eb, items: b },
            )
            | (Value::Seq { elem: ea, items: a }, Value::Seq { elem: eb, items: b }) => {
                ea == eb && a == b
            }
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Mock(a), Value::Mock(b)) => a == b,
            (Value::Expr(a), Value::Expr(b)) => a.shape() == b.shape(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array { items, .. } => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Value::Seq { items, .. } => {
                write!(f, "seq[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Value::Object(o) => write!(f, "{:?}", o),
            Value::Mock(m) => write!(f, "{:?}", m),
            Value::Expr(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl TypeDesc {
    /// Whether a runtime value can be stored in a slot of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ty, Value::Null) => ty.accepts_null(),
            (TypeDesc::Object | TypeDesc::Param(_), Value::Mock(_)) => true,
            (TypeDesc::Interface(name), Value::Mock(mock)) => mock.implements(name),
            (TypeDesc::Nullable(inner), value) => inner.accepts(value),
            (TypeDesc::Int, Value::UInt(u)) => i64::try_from(*u).is_ok(),
            (TypeDesc::UInt, Value::Int(i)) => *i >= 0,
            (TypeDesc::Tuple(types), Value::Tuple(items)) => {
                types.len() == items.len() && types.iter().zip(items).all(|(t, v)| t.accepts(v))
            }
            (ty, value) => value
                .type_desc()
                .map_or(false, |actual| ty.is_assignable_from(&actual)),
        }
    }
}

// ============================================================================
// TYPED CONVERSIONS
// ============================================================================

/// Conversion between a Rust type and [`Value`].
pub trait ArgValue: Sized + 'static {
    /// Type descriptor for this Rust type.
    fn type_desc() -> TypeDesc;

    fn into_value(self) -> Value;

    /// `None` when the value does not hold this type.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! signed_arg_value {
    ($($t:ty),*) => {$(
        impl ArgValue for $t {
            fn type_desc() -> TypeDesc {
                TypeDesc::Int
            }

            fn into_value(self) -> Value {
                Value::Int(self as i64)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Int(i) => <$t>::try_from(*i).ok(),
                    Value::UInt(u) => <$t>::try_from(*u).ok(),
                    _ => None,
                }
            }
        }

        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                v.into_value()
            }
        }
    )*};
}

macro_rules! unsigned_arg_value {
    ($($t:ty),*) => {$(
        impl ArgValue for $t {
            fn type_desc() -> TypeDesc {
                TypeDesc::UInt
            }

            fn into_value(self) -> Value {
                Value::UInt(self as u64)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::UInt(u) => <$t>::try_from(*u).ok(),
                    Value::Int(i) => <$t>::try_from(*i).ok(),
                    _ => None,
                }
            }
        }

        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                v.into_value()
            }
        }
    )*};
}

signed_arg_value!(i8, i16, i32, i64, isize);
unsigned_arg_value!(u8, u16, u32, u64, usize);

impl ArgValue for bool {
    fn type_desc() -> TypeDesc {
        TypeDesc::Bool
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl ArgValue for f64 {
    fn type_desc() -> TypeDesc {
        TypeDesc::Float
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl ArgValue for f32 {
    fn type_desc() -> TypeDesc {
        TypeDesc::Float
    }

    fn into_value(self) -> Value {
        Value::Float(self as f64)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x as f32),
            _ => None,
        }
    }
}

impl ArgValue for String {
    fn type_desc() -> TypeDesc {
        TypeDesc::Str
    }

    fn into_value(self) -> Value {
        Value::Str(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl ArgValue for () {
    fn type_desc() -> TypeDesc {
        TypeDesc::Unit
    }

    fn into_value(self) -> Value {
        Value::Unit
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Unit | Value::Null => Some(()),
            _ => None,
        }
    }
}

impl ArgValue for MockRef {
    fn type_desc() -> TypeDesc {
        TypeDesc::Object
    }

    fn into_value(self) -> Value {
        Value::Mock(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_mock().cloned()
    }
}

/// Untyped passthrough, for delegates that take any argument.
impl ArgValue for Value {
    fn type_desc() -> TypeDesc {
        TypeDesc::Object
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// `Option<T>` is the nullable form of `T`.
impl<T: ArgValue> ArgValue for Option<T> {
    fn type_desc() -> TypeDesc {
        let inner = T::type_desc();
        if inner.is_value_type() {
            TypeDesc::nullable(inner)
        } else {
            inner
        }
    }

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ArgValue> ArgValue for Vec<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::array(T::type_desc())
    }

    fn into_value(self) -> Value {
        Value::Array {
            elem: T::type_desc(),
            items: self.into_iter().map(ArgValue::into_value).collect(),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_sequence()?
            .iter()
            .map(T::from_value)
            .collect::<Option<Vec<_>>>()
    }
}

impl<A: ArgValue, B: ArgValue> ArgValue for (A, B) {
    fn type_desc() -> TypeDesc {
        TypeDesc::Tuple(vec![A::type_desc(), B::type_desc()])
    }

    fn into_value(self) -> Value {
        Value::Tuple(vec![self.0.into_value(), self.1.into_value()])
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Tuple(items) if items.len() == 2 => {
                Some((A::from_value(&items[0])?, B::from_value(&items[1])?))
            }
            _ => None,
        }
    }
}

impl<A: ArgValue, B: ArgValue, C: ArgValue> ArgValue for (A, B, C) {
    fn type_desc() -> TypeDesc {
        TypeDesc::Tuple(vec![A::type_desc(), B::type_desc(), C::type_desc()])
    }

    fn into_value(self) -> Value {
        Value::Tuple(vec![
            self.0.into_value(),
            self.1.into_value(),
            self.2.into_value(),
        ])
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Tuple(items) if items.len() == 3 => Some((
                A::from_value(&items[0])?,
                B::from_value(&items[1])?,
                C::from_value(&items[2])?,
            )),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<MockRef> for Value {
    fn from(m: MockRef) -> Self {
        Value::Mock(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_integer_round_trip_respects_range() {
        assert_eq!(i32::from_value(&Value::Int(7)), Some(7));
        assert_eq!(u8::from_value(&Value::Int(300)), None);
        assert_eq!(u8::from_value(&Value::Int(-1)), None);
        assert_eq!(i64::from_value(&Value::str("7")), None);
    }

    #[test]
    fn test_option_is_nullable() {
        assert_eq!(Option::<i32>::type_desc(), TypeDesc::nullable(TypeDesc::Int));
        assert_eq!(Option::<String>::type_desc(), TypeDesc::Str);
        assert_eq!(Option::<String>::from_value(&Value::Null), Some(None));
        assert_eq!(String::from_value(&Value::Null), None);
    }

    #[test]
    fn test_sequence_eq_crosses_array_and_seq() {
        let array = Value::array(TypeDesc::Int, vec![Value::Int(1), Value::Int(2)]);
        let seq = Value::seq(TypeDesc::Int, vec![Value::Int(1), Value::Int(2)]);
        assert_ne!(array, seq);
        assert!(array.sequence_eq(&seq));
        assert!(!array.sequence_eq(&Value::seq(TypeDesc::Int, vec![Value::Int(1)])));
    }

    #[test]
    fn test_object_equality_and_identity() {
        let ty = NamedType::value("Point");
        let a = Value::object(ty.clone(), Point { x: 1, y: 2 });
        let b = Value::object(ty, Point { x: 1, y: 2 });
        assert_eq!(a, b);
        assert!(!a.same_ref(&b));
        assert!(a.same_ref(&a.clone()));
    }

    #[test]
    fn test_mixed_sign_integers_compare_numerically() {
        assert_eq!(Value::Int(3), Value::UInt(3));
        assert_ne!(Value::Int(-3), Value::UInt(3));
    }

    #[test]
    fn test_accepts() {
        assert!(TypeDesc::Str.accepts(&Value::Null));
        assert!(!TypeDesc::Int.accepts(&Value::Null));
        assert!(TypeDesc::nullable(TypeDesc::Int).accepts(&Value::Int(1)));
        assert!(TypeDesc::Object.accepts(&Value::str("x")));
        assert!(!TypeDesc::Str.accepts(&Value::Int(1)));
        assert!(TypeDesc::Int.accepts(&Value::UInt(4)));
        assert!(!TypeDesc::UInt.accepts(&Value::Int(-4)));
        let pair = TypeDesc::Tuple(vec![TypeDesc::Int, TypeDesc::Str]);
        assert!(pair.accepts(&Value::Tuple(vec![Value::Int(1), Value::Null])));
        assert!(!pair.accepts(&Value::Tuple(vec![Value::Int(1)])));
        let ints = Value::array(TypeDesc::Int, vec![Value::Int(1)]);
        assert!(TypeDesc::seq(TypeDesc::Int).accepts(&ints));
    }

    #[test]
    fn test_display() {
        let v = Value::Tuple(vec![Value::Int(1), Value::str("a"), Value::Null]);
        assert_eq!(v.to_string(), "(1, \"a\", null)");
    }
}
