//! Argument matchers
//!
//! An [`ArgumentMatcher`] is a predicate over a single argument value and the
//! parameter type it was declared with. Matchers are immutable once built and
//! cheap to clone.
//!
//! Besides the predicate, every matcher carries a [`MatcherShape`]: the part
//! of its configuration that is fixed when the call description is written.
//! Shapes decide whether two setups describe "the same" expectation, so a
//! predicate closure is identified by its closure type, never by the values
//! it captured.

use crate::expr::ExprShape;
use crate::types::TypeDesc;
use crate::value::Value;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

pub(crate) type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub(crate) type LazyValue = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// Where the value of a constant or by-ref matcher came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    /// Written directly into the call description
    Literal(Value),
    /// Produced by a captured closure, identified by closure type
    Captured(TypeId),
}

/// Structural identity of a matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherShape {
    Always,
    Typed {
        name: &'static str,
        ty: TypeDesc,
        allow_null: bool,
        closure: Option<TypeId>,
        data: Vec<Value>,
    },
    Constant(ValueSource),
    ByRef(ValueSource),
    Variadic(Vec<MatcherShape>),
    Expression(ExprShape),
    Lazy(TypeId),
}

#[derive(Clone)]
enum MatcherKind {
    Always,
    Typed {
        allow_null: bool,
        predicate: Predicate,
    },
    Constant(Value),
    ByRef(Value),
    Variadic(Vec<ArgumentMatcher>),
    Expression(ExprShape),
    Lazy(LazyValue),
}

/// Predicate over one argument.
#[derive(Clone)]
pub struct ArgumentMatcher {
    ty: TypeDesc,
    kind: MatcherKind,
    rendering: String,
    shape: MatcherShape,
}

impl ArgumentMatcher {
    /// Matches anything, including values of unrelated types.
    pub fn always() -> Self {
        Self {
            ty: TypeDesc::Object,
            kind: MatcherKind::Always,
            rendering: "_".to_string(),
            shape: MatcherShape::Always,
        }
    }

    /// Typed predicate matcher.
    ///
    /// The predicate only runs for values the matcher type accepts; null only
    /// reaches it when `allow_null` is set and the type is null-compatible.
    pub(crate) fn typed(
        name: &'static str,
        ty: TypeDesc,
        allow_null: bool,
        closure: Option<TypeId>,
        data: Vec<Value>,
        rendering: String,
        predicate: Predicate,
    ) -> Self {
        Self {
            shape: MatcherShape::Typed {
                name,
                ty: ty.clone(),
                allow_null,
                closure,
                data,
            },
            ty,
            kind: MatcherKind::Typed {
                allow_null,
                predicate,
            },
            rendering,
        }
    }

    pub(crate) fn constant(value: Value, source: ValueSource) -> Self {
        Self {
            ty: value.type_desc().unwrap_or(TypeDesc::Object),
            rendering: value.to_string(),
            kind: MatcherKind::Constant(value),
            shape: MatcherShape::Constant(source),
        }
    }

    pub(crate) fn by_ref(value: Value, source: ValueSource) -> Self {
        Self {
            ty: value.type_desc().unwrap_or(TypeDesc::Object),
            rendering: format!("Ref({})", value),
            kind: MatcherKind::ByRef(value),
            shape: MatcherShape::ByRef(source),
        }
    }

    pub(crate) fn variadic(elem: TypeDesc, matchers: Vec<ArgumentMatcher>) -> Self {
        let rendering = format!(
            "Params({})",
            matchers
                .iter()
                .map(|m| m.rendering.clone())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            ty: TypeDesc::array(elem),
            shape: MatcherShape::Variadic(matchers.iter().map(|m| m.shape.clone()).collect()),
            kind: MatcherKind::Variadic(matchers),
            rendering,
        }
    }

    pub(crate) fn expression(shape: ExprShape, rendering: String) -> Self {
        Self {
            ty: TypeDesc::Expr,
            rendering: format!("Expr({})", rendering),
            shape: MatcherShape::Expression(shape.clone()),
            kind: MatcherKind::Expression(shape),
        }
    }

    pub(crate) fn lazy(label: &str, origin: TypeId, thunk: LazyValue) -> Self {
        Self {
            ty: TypeDesc::Object,
            rendering: format!("Lazy({})", label),
            kind: MatcherKind::Lazy(thunk),
            shape: MatcherShape::Lazy(origin),
        }
    }

    /// Declared value type of the matcher.
    pub fn ty(&self) -> &TypeDesc {
        &self.ty
    }

    pub fn shape(&self) -> &MatcherShape {
        &self.shape
    }

    pub fn rendering(&self) -> &str {
        &self.rendering
    }

    pub fn is_always(&self) -> bool {
        matches!(self.kind, MatcherKind::Always)
    }

    /// Whether this matcher places no constraint on the parameter type.
    pub(crate) fn is_untyped(&self) -> bool {
        matches!(
            self.kind,
            MatcherKind::Always | MatcherKind::Lazy(_) | MatcherKind::ByRef(Value::Null)
        ) || matches!(self.kind, MatcherKind::Constant(Value::Null))
    }

    /// Whether `value`, passed to a parameter of type `declared`, satisfies
    /// this matcher.
    pub fn matches(&self, value: &Value, declared: &TypeDesc) -> bool {
        match &self.kind {
            MatcherKind::Always => true,
            MatcherKind::Typed {
                allow_null,
                predicate,
            } => {
                // Open generic matchers take the parameter's closed type.
                let ty = match &self.ty {
                    TypeDesc::Param(_) => declared,
                    ty => ty,
                };
                if value.is_null() {
                    *allow_null && ty.accepts_null() && predicate(value)
                } else {
                    ty.accepts(value) && predicate(value)
                }
            }
            MatcherKind::Constant(expected) => expected.sequence_eq(value),
            MatcherKind::ByRef(expected) => expected.same_ref(value),
            MatcherKind::Variadic(matchers) => match value {
                Value::Array { elem, items } => {
                    items.len() == matchers.len()
                        && matchers
                            .iter()
                            .zip(items)
                            .all(|(m, item)| m.matches(item, elem))
                }
                _ => false,
            },
            MatcherKind::Expression(expected) => match value {
                Value::Expr(expr) => &expr.shape() == expected,
                _ => false,
            },
            MatcherKind::Lazy(thunk) => match thunk() {
                Some(expected) => expected.sequence_eq(value),
                None => false,
            },
        }
    }
}

impl fmt::Display for ArgumentMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendering)
    }
}

impl fmt::Debug for ArgumentMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentMatcher")
            .field("ty", &self.ty)
            .field("rendering", &self.rendering)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg;

    #[test]
    fn test_any_string_on_object_parameter() {
        let m = arg::any::<String>();
        assert!(m.matches(&Value::Null, &TypeDesc::Object));
        assert!(m.matches(&Value::str("x"), &TypeDesc::Object));
        assert!(!m.matches(&Value::Int(1), &TypeDesc::Object));
    }

    #[test]
    fn test_any_not_null_rejects_null() {
        let m = arg::any_not_null::<String>();
        assert!(!m.matches(&Value::Null, &TypeDesc::Object));
        assert!(m.matches(&Value::str("x"), &TypeDesc::Object));
    }

    #[test]
    fn test_value_type_rejects_null_before_predicate() {
        let m = arg::is::<i64, _>(|_| panic!("predicate must not run for null"));
        assert!(!m.matches(&Value::Null, &TypeDesc::Object));
    }

    #[test]
    fn test_nullable_predicate_sees_null() {
        let m = arg::is::<Option<i64>, _>(|v| v.is_none());
        assert!(m.matches(&Value::Null, &TypeDesc::nullable(TypeDesc::Int)));
        assert!(!m.matches(&Value::Int(3), &TypeDesc::nullable(TypeDesc::Int)));
    }

    #[test]
    fn test_constant_is_sequence_aware() {
        let m = ArgumentMatcher::constant(
            Value::array(TypeDesc::Int, vec![Value::Int(1), Value::Int(2)]),
            ValueSource::Captured(TypeId::of::<u8>()),
        );
        let seq = Value::seq(TypeDesc::Int, vec![Value::Int(1), Value::Int(2)]);
        assert!(m.matches(&seq, &TypeDesc::seq(TypeDesc::Int)));
        let shorter = Value::seq(TypeDesc::Int, vec![Value::Int(1)]);
        assert!(!m.matches(&shorter, &TypeDesc::seq(TypeDesc::Int)));
    }

    #[test]
    fn test_variadic_requires_exact_count() {
        let m = ArgumentMatcher::variadic(
            TypeDesc::Int,
            vec![arg::eq(1), arg::any::<i64>()],
        );
        let ok = Value::array(TypeDesc::Int, vec![Value::Int(1), Value::Int(9)]);
        let short = Value::array(TypeDesc::Int, vec![Value::Int(1)]);
        let wrong = Value::array(TypeDesc::Int, vec![Value::Int(2), Value::Int(9)]);
        let ty = TypeDesc::array(TypeDesc::Int);
        assert!(m.matches(&ok, &ty));
        assert!(!m.matches(&short, &ty));
        assert!(!m.matches(&wrong, &ty));
        assert!(!m.matches(&Value::Int(1), &ty));
        assert_eq!(m.rendering(), "Params(1, Any<int>())");
    }

    #[test]
    fn test_lazy_reevaluates() {
        use std::sync::atomic::{AtomicI64, Ordering};
        static CURRENT: AtomicI64 = AtomicI64::new(1);
        let m = arg::lazy("current", || Some(Value::Int(CURRENT.load(Ordering::SeqCst))));
        assert!(m.matches(&Value::Int(1), &TypeDesc::Int));
        CURRENT.store(2, Ordering::SeqCst);
        assert!(!m.matches(&Value::Int(1), &TypeDesc::Int));
        assert!(m.matches(&Value::Int(2), &TypeDesc::Int));
    }

    #[test]
    fn test_lazy_without_value_never_matches() {
        let m = arg::lazy("nothing", || None);
        assert!(!m.matches(&Value::Null, &TypeDesc::Object));
    }

    #[test]
    fn test_predicate_shape_ignores_captured_values() {
        fn threshold(limit: i64) -> ArgumentMatcher {
            arg::is::<i64, _>(move |x| *x > limit)
        }
        assert_eq!(threshold(1).shape(), threshold(100).shape());
        assert_ne!(
            threshold(1).shape(),
            arg::is::<i64, _>(|x| *x > 1).shape()
        );
    }
}
