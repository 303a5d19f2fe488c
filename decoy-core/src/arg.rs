//! Matcher factory functions
//!
//! These are the building blocks call descriptions are written with:
//!
//! ```ignore
//! CallExpr::on_mock(method)
//!     .arg(arg::any::<i32>())
//!     .arg(arg::is::<String, _>(|s| s.starts_with("a")));
//! ```

use crate::error::{ConfigError, MockResult};
use crate::expr::{CallExpr, Expr};
use crate::matcher::{ArgumentMatcher, ValueSource};
use crate::observer::MatcherObserver;
use crate::types::TypeDesc;
use crate::value::{ArgValue, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Any value of `T`, including null when `T` is null-compatible.
pub fn any<T: ArgValue>() -> ArgumentMatcher {
    any_of(T::type_desc())
}

/// Any non-null value of `T`.
pub fn any_not_null<T: ArgValue>() -> ArgumentMatcher {
    let ty = T::type_desc();
    ArgumentMatcher::typed(
        "AnyNotNull",
        ty.clone(),
        false,
        None,
        Vec::new(),
        format!("AnyNotNull<{}>()", ty),
        Arc::new(|_| true),
    )
}

/// Any value of a runtime type. `TypeDesc::Param` matches whatever the
/// generic parameter is closed over.
pub fn any_of(ty: TypeDesc) -> ArgumentMatcher {
    ArgumentMatcher::typed(
        "Any",
        ty.clone(),
        true,
        None,
        Vec::new(),
        format!("Any<{}>()", ty),
        Arc::new(|_| true),
    )
}

/// Values of `T` satisfying `predicate`. Use `Option<T>` to see nulls.
pub fn is<T, F>(predicate: F) -> ArgumentMatcher
where
    T: ArgValue,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let ty = T::type_desc();
    ArgumentMatcher::typed(
        "Is",
        ty.clone(),
        true,
        Some(TypeId::of::<F>()),
        Vec::new(),
        format!("Is<{}>(predicate)", ty),
        Arc::new(move |value| T::from_value(value).map_or(false, |v| predicate(&v))),
    )
}

/// Untyped predicate over the raw value, checked against `ty`.
pub fn is_value<F>(ty: TypeDesc, predicate: F) -> ArgumentMatcher
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    ArgumentMatcher::typed(
        "Is",
        ty.clone(),
        true,
        Some(TypeId::of::<F>()),
        Vec::new(),
        format!("Is<{}>(predicate)", ty),
        Arc::new(predicate),
    )
}

/// One of the given values.
pub fn is_in<T: ArgValue>(values: impl IntoIterator<Item = T>) -> ArgumentMatcher {
    membership::<T>("In", values, true)
}

/// None of the given values.
pub fn is_not_in<T: ArgValue>(values: impl IntoIterator<Item = T>) -> ArgumentMatcher {
    membership::<T>("NotIn", values, false)
}

fn membership<T: ArgValue>(
    name: &'static str,
    values: impl IntoIterator<Item = T>,
    wanted: bool,
) -> ArgumentMatcher {
    let values: Vec<Value> = values.into_iter().map(ArgValue::into_value).collect();
    let rendering = format!("{}({})", name, render_list(&values));
    let candidates = values.clone();
    ArgumentMatcher::typed(
        name,
        T::type_desc(),
        true,
        None,
        values,
        rendering,
        Arc::new(move |value| candidates.iter().any(|c| c.sequence_eq(value)) == wanted),
    )
}

/// Whether the bounds of [`in_range`] are part of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeKind {
    Inclusive,
    Exclusive,
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeKind::Inclusive => write!(f, "Inclusive"),
            RangeKind::Exclusive => write!(f, "Exclusive"),
        }
    }
}

/// Values of `T` between `from` and `to`.
pub fn in_range<T>(from: T, to: T, kind: RangeKind) -> ArgumentMatcher
where
    T: ArgValue + PartialOrd + Clone + Send + Sync,
{
    let data = vec![
        from.clone().into_value(),
        to.clone().into_value(),
        Value::str(kind.to_string()),
    ];
    let rendering = format!("InRange({}, {}, {})", data[0], data[1], kind);
    ArgumentMatcher::typed(
        "InRange",
        T::type_desc(),
        false,
        None,
        data,
        rendering,
        Arc::new(move |value| {
            T::from_value(value).map_or(false, |v| match kind {
                RangeKind::Inclusive => from <= v && v <= to,
                RangeKind::Exclusive => from < v && v < to,
            })
        }),
    )
}

/// Strings matching a regular expression.
pub fn matches_regex(pattern: &str) -> MockResult<ArgumentMatcher> {
    let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok(ArgumentMatcher::typed(
        "Regex",
        TypeDesc::Str,
        false,
        None,
        vec![Value::str(pattern)],
        format!("Regex({:?})", pattern),
        Arc::new(move |value| matches!(value, Value::Str(s) if regex.is_match(s))),
    ))
}

/// Equal to `value`. Sequences compare element-wise.
pub fn eq(value: impl Into<Value>) -> ArgumentMatcher {
    let value = value.into();
    ArgumentMatcher::constant(value.clone(), ValueSource::Literal(value))
}

/// The same reference as `value`.
pub fn by_ref(value: impl Into<Value>) -> ArgumentMatcher {
    let value = value.into();
    ArgumentMatcher::by_ref(value.clone(), ValueSource::Literal(value))
}

/// A variadic array of exactly these elements.
pub fn variadic(elem: TypeDesc, matchers: Vec<ArgumentMatcher>) -> ArgumentMatcher {
    ArgumentMatcher::variadic(elem, matchers)
}

/// Equal to whatever `thunk` yields at match time.
pub fn lazy<F>(label: &str, thunk: F) -> ArgumentMatcher
where
    F: Fn() -> Option<Value> + Send + Sync + 'static,
{
    ArgumentMatcher::lazy(label, TypeId::of::<F>(), Arc::new(thunk))
}

/// A call description argument structurally equal to `call`.
pub fn expression(call: CallExpr) -> ArgumentMatcher {
    let expr = Expr::from(call);
    ArgumentMatcher::expression(expr.shape(), expr.to_string())
}

/// Hand `matcher` to the innermost active observer.
///
/// Meant to be called from inside [`Expr::eval`] thunks, so helper
/// functions can produce matchers at build time. Returns the placeholder
/// value the thunk should yield.
pub fn capture(matcher: ArgumentMatcher) -> Value {
    let rendering = matcher.rendering().to_string();
    if !MatcherObserver::observe(matcher) {
        tracing::warn!(matcher = %rendering, "matcher captured with no active observer");
    }
    Value::Null
}

fn render_list(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderings() {
        assert_eq!(any::<String>().rendering(), "Any<string>()");
        assert_eq!(any_not_null::<i32>().rendering(), "AnyNotNull<int>()");
        assert_eq!(is::<i32, _>(|x| *x > 0).rendering(), "Is<int>(predicate)");
        assert_eq!(is_in(vec![1, 2]).rendering(), "In(1, 2)");
        assert_eq!(is_not_in(vec![3]).rendering(), "NotIn(3)");
        assert_eq!(
            in_range(1, 5, RangeKind::Inclusive).rendering(),
            "InRange(1, 5, Inclusive)"
        );
        assert_eq!(matches_regex("^a").unwrap().rendering(), "Regex(\"^a\")");
        assert_eq!(lazy("x", || None).rendering(), "Lazy(x)");
    }

    #[test]
    fn test_is_in_and_not_in() {
        let m = is_in(vec![1, 2]);
        assert!(m.matches(&Value::Int(2), &TypeDesc::Int));
        assert!(!m.matches(&Value::Int(3), &TypeDesc::Int));
        let m = is_not_in(vec![1, 2]);
        assert!(m.matches(&Value::Int(3), &TypeDesc::Int));
        assert!(!m.matches(&Value::Int(1), &TypeDesc::Int));
    }

    #[test]
    fn test_in_range_kinds() {
        let inclusive = in_range(1, 5, RangeKind::Inclusive);
        let exclusive = in_range(1, 5, RangeKind::Exclusive);
        assert!(inclusive.matches(&Value::Int(5), &TypeDesc::Int));
        assert!(!exclusive.matches(&Value::Int(5), &TypeDesc::Int));
        assert!(exclusive.matches(&Value::Int(3), &TypeDesc::Int));
        assert!(!inclusive.matches(&Value::Null, &TypeDesc::Object));
        assert_ne!(inclusive.shape(), exclusive.shape());
    }

    #[test]
    fn test_regex() {
        let m = matches_regex("^[a-z]+$").unwrap();
        assert!(m.matches(&Value::str("abc"), &TypeDesc::Str));
        assert!(!m.matches(&Value::str("ABC"), &TypeDesc::Str));
        assert!(!m.matches(&Value::Null, &TypeDesc::Str));
    }

    #[test]
    fn test_invalid_regex_is_configuration_error() {
        let err = matches_regex("(").unwrap_err();
        assert!(err.reason().is_configuration());
    }

    #[test]
    fn test_eq_and_by_ref() {
        assert_eq!(eq(1).rendering(), "1");
        assert!(eq("a").matches(&Value::str("a"), &TypeDesc::Str));
        assert_eq!(by_ref(7).rendering(), "Ref(7)");
        assert!(by_ref(7).matches(&Value::Int(7), &TypeDesc::Int));
    }

    #[test]
    fn test_membership_shape_tracks_values() {
        assert_eq!(is_in(vec![1, 2]).shape(), is_in(vec![1, 2]).shape());
        assert_ne!(is_in(vec![1, 2]).shape(), is_in(vec![1, 3]).shape());
    }

    #[test]
    fn test_capture_feeds_observer() {
        let observer = MatcherObserver::activate();
        assert_eq!(capture(any::<i32>()), Value::Null);
        let seen = observer.release().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].rendering(), "Any<int>()");
    }
}
