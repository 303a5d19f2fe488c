//! decoy Test Utilities
//!
//! Shared test infrastructure for the decoy workspace:
//! - Fixture interfaces and their member descriptors
//! - Hand-written stand-ins that forward typed calls to an interceptor
//! - Proptest generators for values and call counts
//! - Custom assertions on `MockError` reasons

// Re-export the types most tests need
pub use decoy_core::{
    arg, CallCount, CallExpr, ConfigError, DispatchError, Expr, Interface, InterfaceCatalog,
    Invocation, Member, MockBehavior, MockConfig, MockError, MockErrorReason, MockResult,
    ParamMode, TypeDesc, Value, VerifyError,
};
pub use decoy_engine::{Interceptor, Mock, MockFactory, Outcome, UserError};

use decoy_core::{ArgValue, MockRef, WellKnown};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// FIXTURE INTERFACES
// ============================================================================

pub mod fixtures {
    //! `IService`, `INested` and a marker interface, registered in a catalog.

    use super::*;

    pub const SERVICE: &str = "IService";
    pub const NESTED: &str = "INested";
    pub const BASE: &str = "IBase";
    pub const DISPOSABLE: &str = "IDisposable";

    /// Member descriptors of the fixture interfaces.
    pub mod members {
        use super::*;

        pub fn method() -> Arc<Member> {
            Arc::new(
                Member::method(SERVICE, "method")
                    .param("a", TypeDesc::Int)
                    .param("b", TypeDesc::Str)
                    .returns(TypeDesc::Str),
            )
        }

        pub fn get_nested() -> Arc<Member> {
            Arc::new(Member::method(SERVICE, "get_nested").returns(TypeDesc::interface(NESTED)))
        }

        pub fn name_get() -> Arc<Member> {
            Arc::new(Member::getter(SERVICE, "Name", TypeDesc::Str))
        }

        pub fn name_set() -> Arc<Member> {
            Arc::new(Member::setter(SERVICE, "Name", TypeDesc::Str))
        }

        pub fn try_parse() -> Arc<Member> {
            Arc::new(
                Member::method(SERVICE, "try_parse")
                    .param("input", TypeDesc::Str)
                    .param_with_mode("result", TypeDesc::Int, ParamMode::Out)
                    .returns(TypeDesc::Bool),
            )
        }

        pub fn sum() -> Arc<Member> {
            Arc::new(
                Member::method(SERVICE, "sum")
                    .param_with_mode("values", TypeDesc::array(TypeDesc::Int), ParamMode::Params)
                    .returns(TypeDesc::Int),
            )
        }

        pub fn echo() -> Arc<Member> {
            Arc::new(
                Member::method(SERVICE, "echo")
                    .generic("T")
                    .param("value", TypeDesc::Param("T".to_string()))
                    .returns(TypeDesc::Param("T".to_string())),
            )
        }

        pub fn do_work() -> Arc<Member> {
            Arc::new(Member::method(SERVICE, "do_work"))
        }

        /// Declared on `IBase`, inherited by `IService`.
        pub fn id_get() -> Arc<Member> {
            Arc::new(Member::getter(BASE, "Id", TypeDesc::Int))
        }

        pub fn id_set() -> Arc<Member> {
            Arc::new(Member::setter(BASE, "Id", TypeDesc::Int))
        }

        pub fn nested_method() -> Arc<Member> {
            Arc::new(Member::method(NESTED, "nested_method").returns(TypeDesc::Str))
        }

        pub fn child() -> Arc<Member> {
            Arc::new(Member::method(NESTED, "child").returns(TypeDesc::interface(NESTED)))
        }

        pub fn dispose() -> Arc<Member> {
            Arc::new(Member::method(DISPOSABLE, "dispose"))
        }
    }

    fn with_members(mut interface: Interface, list: Vec<Arc<Member>>) -> Interface {
        interface.members.extend(list);
        interface
    }

    pub fn base_interface() -> Interface {
        with_members(
            Interface::new(BASE),
            vec![members::id_get(), members::id_set()],
        )
    }

    pub fn service_interface() -> Interface {
        with_members(
            Interface::new(SERVICE).extends(BASE),
            vec![
                members::method(),
                members::get_nested(),
                members::name_get(),
                members::name_set(),
                members::try_parse(),
                members::sum(),
                members::echo(),
                members::do_work(),
            ],
        )
    }

    pub fn nested_interface() -> Interface {
        with_members(
            Interface::new(NESTED),
            vec![members::nested_method(), members::child()],
        )
    }

    pub fn disposable_interface() -> Interface {
        with_members(Interface::new(DISPOSABLE), vec![members::dispose()])
    }

    /// Catalog holding every fixture interface.
    pub fn catalog() -> Arc<InterfaceCatalog> {
        Arc::new(InterfaceCatalog::with_interfaces([
            base_interface(),
            service_interface(),
            nested_interface(),
            disposable_interface(),
        ]))
    }

    pub fn loose_service() -> Mock {
        service(MockConfig::loose())
    }

    pub fn strict_service() -> Mock {
        service(MockConfig::strict())
    }

    /// An `IService` mock.
    ///
    /// # Panics
    /// Panics if `config` does not validate.
    pub fn service(config: MockConfig) -> Mock {
        Mock::new(catalog(), SERVICE, config).expect("fixture mock")
    }
}

// ============================================================================
// STAND-INS
// ============================================================================

/// Errors surfaced by the hand-written stand-ins.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Mock(#[from] MockError),

    /// The error a setup was configured to raise, unchanged.
    #[error("{0}")]
    Thrown(UserError),

    #[error("{member} answered {value}, which is not a {expected}")]
    Conversion {
        member: String,
        value: String,
        expected: String,
    },
}

impl ProxyError {
    /// The mock error, if this is one.
    pub fn mock_error(&self) -> Option<&MockError> {
        match self {
            ProxyError::Mock(e) => Some(e),
            _ => None,
        }
    }

    pub fn thrown(&self) -> Option<&UserError> {
        match self {
            ProxyError::Thrown(e) => Some(e),
            _ => None,
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Forwarding core shared by the stand-ins.
struct StandIn {
    interceptor: Arc<dyn Interceptor>,
    base_calls: AtomicUsize,
}

impl StandIn {
    fn new(interceptor: Arc<dyn Interceptor>) -> Self {
        Self {
            interceptor,
            base_calls: AtomicUsize::new(0),
        }
    }

    /// Forward `invocation` and convert the answer. `base` is the stand-in's
    /// own implementation, run when the interceptor defers to it.
    fn forward<T, B>(&self, invocation: &mut Invocation, base: B) -> ProxyResult<T>
    where
        T: ArgValue,
        B: FnOnce(&Invocation) -> T,
    {
        match self.interceptor.intercept(invocation)? {
            Outcome::Value(value) => convert(invocation.member(), &value),
            Outcome::Throw(error) => Err(ProxyError::Thrown(error)),
            Outcome::CallBase => {
                self.base_calls.fetch_add(1, Ordering::Relaxed);
                Ok(base(invocation))
            }
        }
    }

    fn call<T, B>(&self, member: Arc<Member>, args: Vec<Value>, base: B) -> ProxyResult<T>
    where
        T: ArgValue,
        B: FnOnce(&Invocation) -> T,
    {
        let mut invocation = Invocation::new(member, args);
        self.forward(&mut invocation, base)
    }

    fn describe(&self) -> ProxyResult<String> {
        self.call(WellKnown::to_string(), vec![], |_| "stand-in".to_string())
    }

    fn equals(&self, other: Value) -> ProxyResult<bool> {
        self.call(WellKnown::equals(), vec![other], |_| false)
    }

    fn hash_code(&self) -> ProxyResult<i64> {
        self.call(WellKnown::hash_code(), vec![], |_| 0)
    }

    fn mock(&self) -> ProxyResult<Option<Mock>> {
        let handle: Option<MockRef> = self.call(WellKnown::mock_accessor(), vec![], |_| None)?;
        Ok(handle.as_ref().and_then(Mock::from_handle))
    }
}

fn convert<T: ArgValue>(member: &Member, value: &Value) -> ProxyResult<T> {
    T::from_value(value).ok_or_else(|| ProxyError::Conversion {
        member: member.to_string(),
        value: value.to_string(),
        expected: T::type_desc().to_string(),
    })
}

fn nested_from(handle: Option<MockRef>) -> Option<NestedProxy> {
    handle
        .as_ref()
        .and_then(Mock::from_handle)
        .map(|mock| NestedProxy::new(Arc::new(mock)))
}

/// Typed `IService` stand-in.
pub struct ServiceProxy {
    inner: StandIn,
}

impl ServiceProxy {
    pub fn new(interceptor: Arc<dyn Interceptor>) -> Self {
        Self {
            inner: StandIn::new(interceptor),
        }
    }

    pub fn for_mock(mock: &Mock) -> Self {
        Self::new(Arc::new(mock.clone()))
    }

    /// How many calls ran the stand-in's own implementation.
    pub fn base_calls(&self) -> usize {
        self.inner.base_calls.load(Ordering::Relaxed)
    }

    pub fn method(&self, a: i32, b: &str) -> ProxyResult<Option<String>> {
        self.inner.call(
            fixtures::members::method(),
            vec![Value::from(a), Value::str(b)],
            |_| Some(format!("base:{}:{}", a, b)),
        )
    }

    pub fn get_nested(&self) -> ProxyResult<Option<NestedProxy>> {
        let handle = self
            .inner
            .call(fixtures::members::get_nested(), vec![], |_| None)?;
        Ok(nested_from(handle))
    }

    pub fn name(&self) -> ProxyResult<Option<String>> {
        self.inner
            .call(fixtures::members::name_get(), vec![], |_| None)
    }

    pub fn set_name(&self, value: Option<&str>) -> ProxyResult<()> {
        let value = value.map_or(Value::Null, Value::str);
        self.inner
            .call(fixtures::members::name_set(), vec![value], |_| ())
    }

    pub fn id(&self) -> ProxyResult<i32> {
        self.inner.call(fixtures::members::id_get(), vec![], |_| 0)
    }

    pub fn set_id(&self, value: i32) -> ProxyResult<()> {
        self.inner
            .call(fixtures::members::id_set(), vec![Value::from(value)], |_| ())
    }

    /// `result` receives whatever the mock writes into the `out` slot.
    pub fn try_parse(&self, input: &str, result: &mut i32) -> ProxyResult<bool> {
        let mut invocation = Invocation::new(
            fixtures::members::try_parse(),
            vec![Value::str(input), Value::from(*result)],
        );
        let parsed = input.parse::<i32>().ok();
        let base_out = Cell::new(None);
        let answer = self.inner.forward(&mut invocation, |_| {
            base_out.set(parsed);
            parsed.is_some()
        })?;
        match base_out.get() {
            Some(value) => *result = value,
            None => {
                if let Some(written) = invocation.arg(1).and_then(i32::from_value) {
                    *result = written;
                }
            }
        }
        Ok(answer)
    }

    pub fn sum(&self, values: &[i32]) -> ProxyResult<i32> {
        let total: i32 = values.iter().sum();
        self.inner.call(
            fixtures::members::sum(),
            vec![values.to_vec().into_value()],
            move |_| total,
        )
    }

    /// Generic member; the closed type argument is `T`'s descriptor.
    pub fn echo<T: ArgValue + Clone>(&self, value: T) -> ProxyResult<T> {
        let mut invocation = Invocation::new(
            fixtures::members::echo(),
            vec![value.clone().into_value()],
        )
        .with_generic_args(vec![T::type_desc()]);
        self.inner.forward(&mut invocation, move |_| value)
    }

    pub fn do_work(&self) -> ProxyResult<()> {
        self.inner.call(fixtures::members::do_work(), vec![], |_| ())
    }

    pub fn describe(&self) -> ProxyResult<String> {
        self.inner.describe()
    }

    pub fn equals(&self, other: Value) -> ProxyResult<bool> {
        self.inner.equals(other)
    }

    pub fn hash_code(&self) -> ProxyResult<i64> {
        self.inner.hash_code()
    }

    /// The mock behind this stand-in, through the accessor member.
    pub fn mock(&self) -> ProxyResult<Option<Mock>> {
        self.inner.mock()
    }
}

/// Typed `INested` stand-in.
pub struct NestedProxy {
    inner: StandIn,
}

impl NestedProxy {
    pub fn new(interceptor: Arc<dyn Interceptor>) -> Self {
        Self {
            inner: StandIn::new(interceptor),
        }
    }

    pub fn nested_method(&self) -> ProxyResult<Option<String>> {
        self.inner
            .call(fixtures::members::nested_method(), vec![], |_| None)
    }

    pub fn child(&self) -> ProxyResult<Option<NestedProxy>> {
        let handle = self
            .inner
            .call(fixtures::members::child(), vec![], |_| None)?;
        Ok(nested_from(handle))
    }

    pub fn mock(&self) -> ProxyResult<Option<Mock>> {
        self.inner.mock()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for decoy values and call counts.

    use super::*;
    use proptest::prelude::*;

    /// Generate a call count expectation of any kind.
    pub fn arb_call_count() -> impl Strategy<Value = CallCount> {
        prop_oneof![
            Just(CallCount::at_least_once()),
            Just(CallCount::at_most_once()),
            Just(CallCount::once()),
            Just(CallCount::never()),
            (0usize..20).prop_map(CallCount::at_least),
            (0usize..20).prop_map(CallCount::at_most),
            (0usize..20).prop_map(CallCount::exactly),
            (0usize..10, 0usize..10).prop_map(|(a, b)| CallCount::inclusive_between(a, a + b)),
            (0usize..10, 2usize..10).prop_map(|(a, b)| CallCount::exclusive_between(a, a + b)),
        ]
    }

    /// Generate a short identifier-like string.
    pub fn arb_word() -> impl Strategy<Value = String> {
        "[a-z]{1,12}"
    }

    /// Generate arguments for `IService.method`.
    pub fn arb_method_args() -> impl Strategy<Value = (i32, String)> {
        (any::<i32>(), arb_word())
    }

    /// Generate a scalar value.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            arb_word().prop_map(Value::Str),
        ]
    }

    /// Generate a vector of small integers for `IService.sum`.
    pub fn arb_summands() -> impl Strategy<Value = Vec<i32>> {
        prop::collection::vec(-1000i32..1000, 0..8)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on mock results.

    use super::*;

    /// Assert that a result failed with the given reason.
    #[track_caller]
    pub fn assert_reason<T: std::fmt::Debug>(result: &MockResult<T>, reason: MockErrorReason) {
        match result {
            Err(e) => assert_eq!(e.reason(), reason, "unexpected error: {}", e),
            Ok(v) => panic!("Expected {} error, got Ok({:?})", reason, v),
        }
    }

    /// Assert that a stand-in call failed with the given mock error reason.
    #[track_caller]
    pub fn assert_proxy_reason<T: std::fmt::Debug>(
        result: &ProxyResult<T>,
        reason: MockErrorReason,
    ) {
        match result {
            Err(ProxyError::Mock(e)) => assert_eq!(e.reason(), reason, "unexpected error: {}", e),
            other => panic!("Expected {} error, got: {:?}", reason, other),
        }
    }

    /// Assert that a result is a configuration-phase error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &MockResult<T>) {
        match result {
            Err(MockError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a result is a verification error whose message contains
    /// `needle`.
    #[track_caller]
    pub fn assert_verify_error_contains<T: std::fmt::Debug>(result: &MockResult<T>, needle: &str) {
        match result {
            Err(e @ MockError::Verify(_)) => {
                let message = e.to_string();
                assert!(
                    message.contains(needle),
                    "Expected verification message containing {:?}, got:\n{}",
                    needle,
                    message
                );
            }
            other => panic!("Expected Verify error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_contains_fixtures() {
        let catalog = fixtures::catalog();
        assert!(catalog.get(fixtures::SERVICE).is_some());
        assert!(catalog.inherits(fixtures::SERVICE, fixtures::BASE));
        let service = catalog.get(fixtures::SERVICE).unwrap();
        assert_eq!(*service.method("method").unwrap(), *fixtures::members::method());
    }

    #[test]
    fn test_loose_proxy_defaults() {
        let mock = fixtures::loose_service();
        let proxy = ServiceProxy::for_mock(&mock);
        assert_eq!(proxy.method(1, "a").unwrap(), None);
        assert_eq!(proxy.sum(&[1, 2]).unwrap(), 0);
        assert!(proxy.get_nested().unwrap().is_none());
        assert_eq!(proxy.mock().unwrap(), Some(mock.clone()));
        assert_eq!(mock.invocations().unwrap().len(), 3);
    }
}
