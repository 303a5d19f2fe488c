//! Expectations
//!
//! An [`Expectation`] is a single-segment call description reduced to what
//! dispatch needs: the member, one matcher per parameter, the generic type
//! matchers, and the values to assign to `out` parameters. Reduction happens
//! once, when the setup is registered, so every configuration error surfaces
//! there.

use crate::error::{ConfigError, MockResult};
use crate::expr::{CallExpr, Expr, ExprShape};
use crate::generic::TypeMatcher;
use crate::invocation::Invocation;
use crate::matcher::{ArgumentMatcher, ValueSource};
use crate::member::{Member, MemberKind, Param, ParamMode};
use crate::observer::MatcherObserver;
use crate::types::TypeDesc;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// One position of a reduced call description.
#[derive(Debug, Clone)]
struct ArgSlot {
    matcher: ArgumentMatcher,
    /// Unchecked slots are skipped during matching.
    checked: bool,
}

/// Reduced, immutable form of a single call description.
#[derive(Clone)]
pub struct Expectation {
    member: Arc<Member>,
    type_args: Vec<TypeMatcher>,
    slots: Vec<ArgSlot>,
    out_values: Vec<(usize, Value)>,
    rendering: String,
    shape: ExprShape,
}

impl Expectation {
    /// Reduce a call made directly on the mock.
    pub fn from_call(call: &CallExpr) -> MockResult<Self> {
        if !matches!(call.target, Expr::Mock) {
            return Err(ConfigError::UnsupportedExpression {
                expression: call.to_string(),
                reason: "only calls made directly on the mock can be reduced; split chains into segments first".to_string(),
            }
            .into());
        }

        let member = Arc::clone(&call.member);
        if call.type_args.len() != member.generic_params.len() {
            return Err(ConfigError::GenericArgumentCount {
                member: member.to_string(),
                expected: member.generic_params.len(),
                actual: call.type_args.len(),
            }
            .into());
        }
        if call.args.len() != member.params.len() {
            return Err(ConfigError::ArgumentCount {
                member: member.to_string(),
                expected: member.params.len(),
                actual: call.args.len(),
            }
            .into());
        }

        let mut slots = Vec::with_capacity(call.args.len());
        let mut out_values = Vec::new();
        for (position, (param, arg)) in member.params.iter().zip(&call.args).enumerate() {
            let slot = match param.mode {
                ParamMode::Out => {
                    if let Some(value) = out_value(arg)? {
                        out_values.push((position, value));
                    }
                    ArgSlot {
                        matcher: ArgumentMatcher::always(),
                        checked: true,
                    }
                }
                ParamMode::In | ParamMode::Ref => reduce_by_ref(param, arg)?,
                ParamMode::Params => match arg {
                    Expr::NewArray { elem, items } => {
                        let matchers = items
                            .iter()
                            .map(|item| reduce_element(param, elem, item))
                            .collect::<MockResult<Vec<_>>>()?;
                        ArgSlot {
                            matcher: ArgumentMatcher::variadic(elem.clone(), matchers),
                            checked: true,
                        }
                    }
                    other => reduce(param, other)?,
                },
                ParamMode::Value => reduce(param, arg)?,
            };
            slots.push(slot);
        }

        let rendering = render(&member, &call.type_args, &slots, &out_values);
        Ok(Self {
            member,
            type_args: call.type_args.clone(),
            slots,
            out_values,
            rendering,
            shape: call.shape(),
        })
    }

    pub fn member(&self) -> &Arc<Member> {
        &self.member
    }

    pub fn type_args(&self) -> &[TypeMatcher] {
        &self.type_args
    }

    pub fn matchers(&self) -> impl Iterator<Item = &ArgumentMatcher> {
        self.slots.iter().map(|s| &s.matcher)
    }

    /// Values captured for `out` parameters, by position.
    pub fn out_values(&self) -> &[(usize, Value)] {
        &self.out_values
    }

    pub fn shape(&self) -> &ExprShape {
        &self.shape
    }

    /// Diagnostic form, e.g. `mock.method(1, Any<int>())`.
    pub fn rendering(&self) -> &str {
        &self.rendering
    }

    /// Whether an invocation satisfies this expectation.
    pub fn matches_invocation(&self, invocation: &Invocation) -> bool {
        if !self.same_member(invocation) {
            return false;
        }
        let generic_args = invocation.generic_args();
        if generic_args.len() != self.type_args.len()
            || !self
                .type_args
                .iter()
                .zip(generic_args)
                .all(|(m, ty)| m.matches(ty))
        {
            return false;
        }
        let args = invocation.args();
        if args.len() != self.slots.len() {
            return false;
        }
        self.slots
            .iter()
            .zip(&self.member.params)
            .zip(args)
            .filter(|((slot, _), _)| slot.checked)
            .all(|((slot, param), value)| {
                let declared = self.member.closed_type(&param.ty, generic_args);
                slot.matcher.matches(value, &declared)
            })
    }

    /// Same member, arguments not considered. Used to list near misses.
    pub fn partially_matches(&self, invocation: &Invocation) -> bool {
        self.same_member(invocation)
    }

    fn same_member(&self, invocation: &Invocation) -> bool {
        Arc::ptr_eq(&self.member, invocation.member()) || *self.member == **invocation.member()
    }
}

impl PartialEq for Expectation {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendering)
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("member", &self.member.to_string())
            .field("rendering", &self.rendering)
            .finish()
    }
}

// ============================================================================
// REDUCTION
// ============================================================================

/// Run an [`Expr::Eval`] thunk with an observer active.
///
/// Returns the last matcher the thunk produced, if any, and its value.
fn evaluate(thunk: &(dyn Fn() -> Value + Send + Sync)) -> MockResult<(Option<ArgumentMatcher>, Value)> {
    let observer = MatcherObserver::activate();
    let value = thunk();
    let mut observed = observer.release()?;
    if observed.len() > 1 {
        tracing::warn!(
            count = observed.len(),
            kept = %observed[observed.len() - 1],
            "argument expression captured several matchers; only the last one is used"
        );
    }
    Ok((observed.pop(), value))
}

fn unsupported(param: &Param, arg: &Expr, reason: &str) -> ConfigError {
    ConfigError::UnsupportedExpression {
        expression: arg.to_string(),
        reason: format!("{} (parameter {})", reason, param.name),
    }
}

fn out_value(arg: &Expr) -> MockResult<Option<Value>> {
    match arg {
        Expr::Constant(value) => Ok(Some(value.clone())),
        Expr::Eval { thunk, .. } => {
            let (observed, value) = evaluate(thunk.as_ref())?;
            Ok(if observed.is_some() || value.is_null() {
                None
            } else {
                Some(value)
            })
        }
        _ => Ok(None),
    }
}

fn reduce_by_ref(param: &Param, arg: &Expr) -> MockResult<ArgSlot> {
    let matcher = match arg {
        Expr::Matcher(m) => guard(param, &param.ty, m.clone())?,
        Expr::Constant(value) => {
            check_value(param, &param.ty, value)?;
            ArgumentMatcher::by_ref(value.clone(), ValueSource::Literal(value.clone()))
        }
        Expr::Eval { origin, thunk } => match evaluate(thunk.as_ref())? {
            (Some(m), _) => guard(param, &param.ty, m)?,
            (None, value) => {
                check_value(param, &param.ty, &value)?;
                ArgumentMatcher::by_ref(value, ValueSource::Captured(*origin))
            }
        },
        Expr::Lazy { .. } | Expr::Unchecked => return reduce(param, arg),
        other => return Err(unsupported(param, other, "by-ref arguments must be values or matchers").into()),
    };
    Ok(ArgSlot {
        matcher,
        checked: true,
    })
}

fn reduce(param: &Param, arg: &Expr) -> MockResult<ArgSlot> {
    if let Expr::Unchecked = arg {
        return Ok(ArgSlot {
            matcher: ArgumentMatcher::always(),
            checked: false,
        });
    }
    Ok(ArgSlot {
        matcher: reduce_element(param, &param.ty, arg)?,
        checked: true,
    })
}

/// Reduce one argument expression against the type `ty`.
fn reduce_element(param: &Param, ty: &TypeDesc, arg: &Expr) -> MockResult<ArgumentMatcher> {
    match arg {
        Expr::Constant(value) => {
            check_value(param, ty, value)?;
            Ok(ArgumentMatcher::constant(
                value.clone(),
                ValueSource::Literal(value.clone()),
            ))
        }
        Expr::Matcher(m) => guard(param, ty, m.clone()),
        Expr::Eval { origin, thunk } => match evaluate(thunk.as_ref())? {
            (Some(m), _) => guard(param, ty, m),
            (None, value) => {
                check_value(param, ty, &value)?;
                Ok(ArgumentMatcher::constant(value, ValueSource::Captured(*origin)))
            }
        },
        Expr::Lazy {
            origin,
            label,
            thunk,
        } => Ok(ArgumentMatcher::lazy(label, *origin, Arc::clone(thunk))),
        Expr::NewArray { elem, items } => {
            let constants = items
                .iter()
                .map(|item| match item {
                    Expr::Constant(v) => Some(v.clone()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>();
            match constants {
                Some(values) => {
                    let value = Value::array(elem.clone(), values);
                    check_value(param, ty, &value)?;
                    Ok(ArgumentMatcher::constant(value.clone(), ValueSource::Literal(value)))
                }
                None => {
                    let matchers = items
                        .iter()
                        .map(|item| reduce_element(param, elem, item))
                        .collect::<MockResult<Vec<_>>>()?;
                    Ok(ArgumentMatcher::variadic(elem.clone(), matchers))
                }
            }
        }
        Expr::Unchecked => Ok(ArgumentMatcher::always()),
        Expr::Mock | Expr::Call(_) => {
            Err(unsupported(param, arg, "member accesses cannot be used as arguments").into())
        }
    }
}

/// Reject matchers that could never match the parameter type.
fn guard(param: &Param, ty: &TypeDesc, matcher: ArgumentMatcher) -> MockResult<ArgumentMatcher> {
    let open = matches!(ty, TypeDesc::Param(_)) || matches!(matcher.ty(), TypeDesc::Param(_));
    if open || matcher.is_untyped() || matcher.ty().is_compatible_with(ty) {
        Ok(matcher)
    } else {
        Err(ConfigError::IncompatibleMatcher {
            param: param.name.clone(),
            matcher_type: matcher.ty().to_string(),
            param_type: ty.to_string(),
        }
        .into())
    }
}

fn check_value(param: &Param, ty: &TypeDesc, value: &Value) -> MockResult<()> {
    if ty.accepts(value) {
        Ok(())
    } else {
        Err(ConfigError::IncompatibleArgument {
            param: param.name.clone(),
            value: value.to_string(),
            param_type: ty.to_string(),
        }
        .into())
    }
}

fn render(
    member: &Member,
    type_args: &[TypeMatcher],
    slots: &[ArgSlot],
    out_values: &[(usize, Value)],
) -> String {
    let args = slots
        .iter()
        .zip(&member.params)
        .enumerate()
        .map(|(i, (slot, param))| match param.mode {
            ParamMode::Out => match out_values.iter().find(|(p, _)| *p == i) {
                Some((_, value)) => format!("out {}", value),
                None => "out _".to_string(),
            },
            _ => slot.matcher.rendering().to_string(),
        })
        .collect::<Vec<_>>();
    match member.kind {
        MemberKind::Getter => format!("mock.{}", member.name),
        MemberKind::Setter => format!(
            "mock.{} = {}",
            member.name,
            args.first().map(String::as_str).unwrap_or("_")
        ),
        MemberKind::Method => {
            let generics = if type_args.is_empty() {
                String::new()
            } else {
                format!(
                    "<{}>",
                    type_args
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            format!("mock.{}{}({})", member.name, generics, args.join(", "))
        }
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

    fn try_parse() -> Arc<Member> {
        Arc::new(
            Member::method("IService", "try_parse")
                .param("input", TypeDesc::Str)
                .param_with_mode("result", TypeDesc::Int, ParamMode::Out)
                .returns(TypeDesc::Bool),
        )
    }

    fn sum() -> Arc<Member> {
        Arc::new(
            Member::method("IService", "sum")
                .param_with_mode("values", TypeDesc::array(TypeDesc::Int), ParamMode::Params)
                .returns(TypeDesc::Int),
        )
    }

    fn swap() -> Arc<Member> {
        Arc::new(
            Member::method("IService", "swap")
                .param_with_mode("value", TypeDesc::Int, ParamMode::Ref)
                .returns(TypeDesc::Bool),
        )
    }

    fn echo() -> Arc<Member> {
        Arc::new(
            Member::method("IService", "echo")
                .generic("T")
                .param("value", TypeDesc::Param("T".to_string()))
                .returns(TypeDesc::Param("T".to_string())),
        )
    }

    #[test]
    fn test_constant_and_matcher_arguments() {
        let call = CallExpr::on_mock(method()).arg(1).arg(arg::any::<String>());
        let exp = Expectation::from_call(&call).unwrap();
        assert_eq!(exp.rendering(), "mock.method(1, Any<string>())");

        let hit = Invocation::new(method(), vec![Value::Int(1), Value::str("a")]);
        let miss = Invocation::new(method(), vec![Value::Int(2), Value::str("a")]);
        assert!(exp.matches_invocation(&hit));
        assert!(!exp.matches_invocation(&miss));
        assert!(exp.partially_matches(&miss));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let call = CallExpr::on_mock(method()).arg(1);
        let err = Expectation::from_call(&call).unwrap_err();
        assert!(matches!(
            err,
            crate::MockError::Config(ConfigError::ArgumentCount { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_incompatible_matcher_is_rejected() {
        let call = CallExpr::on_mock(method()).arg(arg::any::<String>()).arg("a");
        let err = Expectation::from_call(&call).unwrap_err();
        assert!(matches!(
            err,
            crate::MockError::Config(ConfigError::IncompatibleMatcher { .. })
        ));
    }

    #[test]
    fn test_incompatible_constant_is_rejected() {
        let call = CallExpr::on_mock(method()).arg("one").arg("a");
        let err = Expectation::from_call(&call).unwrap_err();
        assert!(matches!(
            err,
            crate::MockError::Config(ConfigError::IncompatibleArgument { .. })
        ));
    }

    #[test]
    fn test_out_parameter_records_value() {
        let call = CallExpr::on_mock(try_parse()).arg("42").arg(42);
        let exp = Expectation::from_call(&call).unwrap();
        assert_eq!(exp.out_values(), &[(1, Value::Int(42))]);
        assert_eq!(exp.rendering(), "mock.try_parse(\"42\", out 42)");

        // The out slot matches whatever the caller passes in.
        let inv = Invocation::new(try_parse(), vec![Value::str("42"), Value::Int(-1)]);
        assert!(exp.matches_invocation(&inv));
    }

    #[test]
    fn test_params_decompose_inline_array() {
        let call = CallExpr::on_mock(sum()).arg(Expr::new_array(
            TypeDesc::Int,
            vec![Expr::constant(1), arg::any::<i32>().into()],
        ));
        let exp = Expectation::from_call(&call).unwrap();
        assert_eq!(exp.rendering(), "mock.sum(Params(1, Any<int>()))");

        fn ints(xs: &[i64]) -> Value {
            Value::array(TypeDesc::Int, xs.iter().map(|x| Value::Int(*x)).collect())
        }
        assert!(exp.matches_invocation(&Invocation::new(sum(), vec![ints(&[1, 5])])));
        assert!(!exp.matches_invocation(&Invocation::new(sum(), vec![ints(&[1])])));
        assert!(!exp.matches_invocation(&Invocation::new(sum(), vec![ints(&[2, 5])])));
    }

    #[test]
    fn test_eval_uses_observed_matcher() {
        let call = CallExpr::on_mock(method())
            .arg(Expr::eval(|| arg::capture(arg::is::<i32, _>(|x| *x > 10))))
            .arg("a");
        let exp = Expectation::from_call(&call).unwrap();
        assert_eq!(exp.rendering(), "mock.method(Is<int>(predicate), \"a\")");
        let inv = Invocation::new(method(), vec![Value::Int(11), Value::str("a")]);
        assert!(exp.matches_invocation(&inv));
        assert!(!MatcherObserver::is_active());
    }

    #[test]
    fn test_eval_without_matcher_becomes_constant() {
        let n = 5;
        let call = CallExpr::on_mock(method())
            .arg(Expr::eval(move || Value::Int(n)))
            .arg("a");
        let exp = Expectation::from_call(&call).unwrap();
        assert_eq!(exp.rendering(), "mock.method(5, \"a\")");
    }

    #[test]
    fn test_last_captured_matcher_wins() {
        let call = CallExpr::on_mock(method())
            .arg(Expr::eval(|| {
                arg::capture(arg::is::<i32, _>(|x| *x < 0));
                arg::capture(arg::is::<i32, _>(|x| *x > 10))
            }))
            .arg("a");
        let exp = Expectation::from_call(&call).unwrap();
        let above = Invocation::new(method(), vec![Value::Int(11), Value::str("a")]);
        let below = Invocation::new(method(), vec![Value::Int(-1), Value::str("a")]);
        assert!(exp.matches_invocation(&above));
        assert!(!exp.matches_invocation(&below));
        assert!(!MatcherObserver::is_active());
    }

    #[test]
    fn test_incompatible_by_ref_constant_is_rejected() {
        let call = CallExpr::on_mock(swap()).arg("seven");
        let err = Expectation::from_call(&call).unwrap_err();
        assert!(matches!(
            err,
            crate::MockError::Config(ConfigError::IncompatibleArgument { ref param, .. })
                if param == "value"
        ));

        let captured = CallExpr::on_mock(swap()).arg(Expr::eval(|| Value::str("seven")));
        assert!(Expectation::from_call(&captured).is_err());

        let exp = Expectation::from_call(&CallExpr::on_mock(swap()).arg(7)).unwrap();
        assert!(exp.matches_invocation(&Invocation::new(swap(), vec![Value::Int(7)])));
    }

    #[test]
    fn test_unchecked_positions_are_skipped() {
        let call = CallExpr::on_mock(method()).arg(Expr::Unchecked).arg("a");
        let exp = Expectation::from_call(&call).unwrap();
        let inv = Invocation::new(method(), vec![Value::Int(99), Value::str("a")]);
        assert!(exp.matches_invocation(&inv));
    }

    #[test]
    fn test_generic_type_matchers() {
        let call = CallExpr::on_mock(echo())
            .type_arg(TypeMatcher::AnyValueType)
            .arg(arg::any_of(TypeDesc::Param("T".to_string())));
        let exp = Expectation::from_call(&call).unwrap();
        assert_eq!(exp.rendering(), "mock.echo<AnyValueType>(Any<T>())");

        let int = Invocation::new(echo(), vec![Value::Int(1)]).with_generic_args(vec![TypeDesc::Int]);
        let string =
            Invocation::new(echo(), vec![Value::str("a")]).with_generic_args(vec![TypeDesc::Str]);
        assert!(exp.matches_invocation(&int));
        assert!(!exp.matches_invocation(&string));
    }

    #[test]
    fn test_generic_arguments_required() {
        let call = CallExpr::on_mock(echo()).arg(1);
        let err = Expectation::from_call(&call).unwrap_err();
        assert!(matches!(
            err,
            crate::MockError::Config(ConfigError::GenericArgumentCount { .. })
        ));
    }

    #[test]
    fn test_call_as_argument_is_unsupported() {
        let inner = CallExpr::on_mock(method()).arg(1).arg("a");
        let call = CallExpr::on_mock(method()).arg(1).arg(inner);
        assert!(Expectation::from_call(&call).is_err());
    }

    #[test]
    fn test_structural_equality() {
        let a = Expectation::from_call(&CallExpr::on_mock(method()).arg(1).arg("a")).unwrap();
        let b = Expectation::from_call(&CallExpr::on_mock(method()).arg(1).arg("a")).unwrap();
        let c = Expectation::from_call(&CallExpr::on_mock(method()).arg(2).arg("a")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_getter_rendering() {
        let getter = Arc::new(Member::getter("IService", "Name", TypeDesc::Str));
        let exp = Expectation::from_call(&CallExpr::on_mock(getter)).unwrap();
        assert_eq!(exp.rendering(), "mock.Name");
    }
}
