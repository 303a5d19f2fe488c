//! Call descriptions
//!
//! An [`Expr`] is the symbolic form of "this member, called with these
//! arguments". It is what setups and call-count verification are written
//! against. A small tree is enough: every call hangs off the mock root or
//! off another call, and each argument is a constant, a matcher, or a closure
//! that is evaluated at build time ([`Expr::eval`]) or at match time
//! ([`Expr::lazy`]).

use crate::error::{ConfigError, MockResult};
use crate::generic::TypeMatcher;
use crate::matcher::{ArgumentMatcher, MatcherShape};
use crate::member::{Member, MemberKind};
use crate::types::TypeDesc;
use crate::value::Value;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Shared closure evaluated while reducing a call description.
pub type Thunk<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Node of a call description.
#[derive(Clone)]
pub enum Expr {
    /// The mocked instance itself
    Mock,
    Call(Box<CallExpr>),
    Constant(Value),
    Matcher(ArgumentMatcher),
    /// Evaluated once when the description is reduced
    Eval { origin: TypeId, thunk: Thunk<Value> },
    /// Evaluated on every match
    Lazy {
        origin: TypeId,
        label: String,
        thunk: Thunk<Option<Value>>,
    },
    /// Inline array construction
    NewArray { elem: TypeDesc, items: Vec<Expr> },
    /// Matches anything and is skipped when arguments are checked
    Unchecked,
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    /// A sub-expression evaluated once at build time.
    ///
    /// Matchers the closure hands to [`crate::arg::capture`] take the place
    /// of the returned value.
    pub fn eval<F>(thunk: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Expr::Eval {
            origin: TypeId::of::<F>(),
            thunk: Arc::new(thunk),
        }
    }

    /// A sub-expression evaluated every time the argument is matched.
    pub fn lazy<F>(label: impl Into<String>, thunk: F) -> Self
    where
        F: Fn() -> Option<Value> + Send + Sync + 'static,
    {
        Expr::Lazy {
            origin: TypeId::of::<F>(),
            label: label.into(),
            thunk: Arc::new(thunk),
        }
    }

    pub fn new_array(elem: TypeDesc, items: Vec<Expr>) -> Self {
        Expr::NewArray { elem, items }
    }

    pub fn as_call(&self) -> Option<&CallExpr> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Structural identity of this node.
    pub fn shape(&self) -> ExprShape {
        match self {
            Expr::Mock => ExprShape::Mock,
            Expr::Call(call) => call.shape(),
            Expr::Constant(value) => ExprShape::Constant(value.clone()),
            Expr::Matcher(matcher) => ExprShape::Matcher(Box::new(matcher.shape().clone())),
            Expr::Eval { origin, .. } => ExprShape::Eval(*origin),
            Expr::Lazy { origin, .. } => ExprShape::Lazy(*origin),
            Expr::NewArray { elem, items } => ExprShape::NewArray {
                elem: elem.clone(),
                items: items.iter().map(Expr::shape).collect(),
            },
            Expr::Unchecked => ExprShape::Unchecked,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Mock => write!(f, "mock"),
            Expr::Call(call) => write!(f, "{}", call),
            Expr::Constant(value) => write!(f, "{}", value),
            Expr::Matcher(matcher) => write!(f, "{}", matcher.rendering()),
            Expr::Eval { .. } => write!(f, "<eval>"),
            Expr::Lazy { label, .. } => write!(f, "{}", label),
            Expr::NewArray { items, .. } => {
                write!(f, "[")?;
                write_args(f, items)?;
                write!(f, "]")
            }
            Expr::Unchecked => write!(f, "_"),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({})", self)
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

/// Structural identity of an [`Expr`].
///
/// Captured closures are identified by their closure type, so two
/// descriptions written at the same place compare equal whatever values
/// they captured.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprShape {
    Mock,
    Call {
        target: Box<ExprShape>,
        member: Arc<Member>,
        type_args: Vec<TypeMatcher>,
        args: Vec<ExprShape>,
    },
    Constant(Value),
    Matcher(Box<MatcherShape>),
    Eval(TypeId),
    Lazy(TypeId),
    NewArray { elem: TypeDesc, items: Vec<ExprShape> },
    Unchecked,
}

// ============================================================================
// CALLS
// ============================================================================

/// A member access on the mock or on the result of another call.
#[derive(Clone)]
pub struct CallExpr {
    pub target: Expr,
    pub member: Arc<Member>,
    pub type_args: Vec<TypeMatcher>,
    pub args: Vec<Expr>,
}

impl CallExpr {
    /// Call `member` directly on the mock.
    pub fn on_mock(member: Arc<Member>) -> Self {
        Self {
            target: Expr::Mock,
            member,
            type_args: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<Expr>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, E>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Constrain the next generic type argument.
    pub fn type_arg(mut self, matcher: impl Into<TypeMatcher>) -> Self {
        self.type_args.push(matcher.into());
        self
    }

    /// Call `member` on the result of this call.
    pub fn then(self, member: Arc<Member>) -> CallExpr {
        CallExpr {
            target: Expr::Call(Box::new(self)),
            member,
            type_args: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Whether this call hangs off another call.
    pub fn is_chain(&self) -> bool {
        matches!(self.target, Expr::Call(_))
    }

    /// Split `mock.a().b()` into `[mock.a(), mock.b()]`, outermost first.
    ///
    /// Each segment is re-rooted on the mock so it can be matched against the
    /// instance that receives that part of the chain.
    pub fn segments(&self) -> MockResult<Vec<CallExpr>> {
        let mut segments = match &self.target {
            Expr::Mock => Vec::new(),
            Expr::Call(inner) => inner.segments()?,
            other => {
                return Err(ConfigError::UnsupportedExpression {
                    expression: self.to_string(),
                    reason: format!("{} is not a mock or a member access", other),
                }
                .into())
            }
        };
        segments.push(CallExpr {
            target: Expr::Mock,
            member: Arc::clone(&self.member),
            type_args: self.type_args.clone(),
            args: self.args.clone(),
        });
        Ok(segments)
    }

    pub fn shape(&self) -> ExprShape {
        ExprShape::Call {
            target: Box::new(self.target.shape()),
            member: Arc::clone(&self.member),
            type_args: self.type_args.clone(),
            args: self.args.iter().map(Expr::shape).collect(),
        }
    }
}

impl fmt::Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.member.name)?;
        match self.member.kind {
            MemberKind::Getter => Ok(()),
            MemberKind::Setter => match self.args.first() {
                Some(value) => write!(f, " = {}", value),
                None => Ok(()),
            },
            MemberKind::Method => {
                if !self.type_args.is_empty() {
                    let generics = self
                        .type_args
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "<{}>", generics)?;
                }
                write!(f, "(")?;
                write_args(f, &self.args)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Debug for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallExpr({})", self)
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

macro_rules! constant_expr {
    ($($t:ty),*) => {$(
        impl From<$t> for Expr {
            fn from(v: $t) -> Self {
                Expr::Constant(Value::from(v))
            }
        }
    )*};
}

constant_expr!(i32, i64, u32, u64, usize, bool, f64, String, &str);

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Constant(value)
    }
}

impl From<ArgumentMatcher> for Expr {
    fn from(matcher: ArgumentMatcher) -> Self {
        Expr::Matcher(matcher)
    }
}

impl From<CallExpr> for Expr {
    fn from(call: CallExpr) -> Self {
        Expr::Call(Box::new(call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg;

    fn method() -> Arc<Member> {
        Arc::new(
            Member::method("IService", "method")
                .param("a", TypeDesc::Int)
                .param("b", TypeDesc::Str)
                .returns(TypeDesc::Str),
        )
    }

    fn nested() -> Arc<Member> {
        Arc::new(Member::method("IService", "get_nested").returns(TypeDesc::interface("INested")))
    }

    fn nested_method() -> Arc<Member> {
        Arc::new(Member::method("INested", "nested_method").returns(TypeDesc::Str))
    }

    #[test]
    fn test_display() {
        let call = CallExpr::on_mock(method()).arg(1).arg(arg::any::<String>());
        assert_eq!(call.to_string(), "mock.method(1, Any<string>())");

        let setter = Arc::new(Member::setter("IService", "Name", TypeDesc::Str));
        let call = CallExpr::on_mock(setter).arg("x");
        assert_eq!(call.to_string(), "mock.Name = \"x\"");
    }

    #[test]
    fn test_segments() {
        let chain = CallExpr::on_mock(nested()).then(nested_method());
        assert!(chain.is_chain());
        assert_eq!(chain.to_string(), "mock.get_nested().nested_method()");
        let segments = chain.segments().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].to_string(), "mock.get_nested()");
        assert_eq!(segments[1].to_string(), "mock.nested_method()");
    }

    #[test]
    fn test_segments_reject_foreign_target() {
        let call = CallExpr {
            target: Expr::constant(1),
            member: method(),
            type_args: Vec::new(),
            args: Vec::new(),
        };
        assert!(call.segments().is_err());
    }

    #[test]
    fn test_shape_ignores_captured_values() {
        fn captured(n: i64) -> CallExpr {
            CallExpr::on_mock(method())
                .arg(Expr::eval(move || Value::Int(n)))
                .arg("a")
        }
        assert_eq!(captured(1).shape(), captured(2).shape());
        let literal = CallExpr::on_mock(method()).arg(1).arg("a");
        assert_ne!(captured(1).shape(), literal.shape());
    }

    #[test]
    fn test_shape_distinguishes_constants() {
        let a = CallExpr::on_mock(method()).arg(1).arg("a");
        let b = CallExpr::on_mock(method()).arg(2).arg("a");
        assert_ne!(a.shape(), b.shape());
    }
}
