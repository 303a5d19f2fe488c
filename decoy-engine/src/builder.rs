//! Fluent setup configuration
//!
//! [`SetupBuilder`] is what `Mock::setup` hands back. Every method checks
//! what it can against the member descriptor right away, so a mistyped
//! delegate or a second response fails at configuration time rather than on
//! the first call.
//!
//! Typed helpers come in 0 to 3 argument forms; anything else goes through
//! the raw `&[Value]` variants.

use crate::behavior::{BehaviorChain, CallbackFn, Delay, ErrorFn, Step, UserError, ValueFn};
use crate::mock::Mock;
use crate::setup::Setup;
use decoy_core::{
    ArgValue, CallCount, ConfigError, DispatchError, Member, MockError, MockResult, TypeDesc,
    Value,
};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Configures one registered setup.
pub struct SetupBuilder {
    mock: Mock,
    member: Arc<Member>,
    setup: Arc<Setup>,
}

impl SetupBuilder {
    pub(crate) fn new(mock: Mock, member: Arc<Member>, setup: Arc<Setup>) -> Self {
        Self {
            mock,
            member,
            setup,
        }
    }

    /// The mock that owns the setup; for chains, the innermost child.
    pub fn mock(&self) -> &Mock {
        &self.mock
    }

    pub fn setup(&self) -> &Arc<Setup> {
        &self.setup
    }

    fn chain(&self) -> MockResult<MutexGuard<'_, BehaviorChain>> {
        let chain: &Mutex<BehaviorChain> =
            self.setup
                .chain()
                .ok_or_else(|| ConfigError::UnsupportedExpression {
                    expression: self.setup.rendering().to_string(),
                    reason: "setup has no configurable behavior".to_string(),
                })?;
        chain
            .lock()
            .map_err(|_| MockError::lock_poisoned("behavior chain"))
    }

    fn set_response(&self, step: Step) -> MockResult<&Self> {
        self.chain()?.set_response(step, self.setup.rendering())?;
        Ok(self)
    }

    fn push_step(&self, step: Step) -> MockResult<&Self> {
        self.chain()?.push_step(step, self.setup.rendering())?;
        Ok(self)
    }

    // ========================================================================
    // CONFIGURATION CHECKS
    // ========================================================================

    fn return_mismatch(&self, actual: String) -> MockError {
        ConfigError::ReturnTypeMismatch {
            member: self.member.to_string(),
            expected: self.member.returns.to_string(),
            actual,
        }
        .into()
    }

    /// A fixed return value must be storable in the declared return type.
    fn check_return_value(&self, value: &Value) -> MockResult<()> {
        let declared = &self.member.returns;
        if declared.is_unit() {
            return Err(self.return_mismatch(describe_value(value)));
        }
        if matches!(declared, TypeDesc::Param(_)) || declared.accepts(value) {
            return Ok(());
        }
        Err(self.return_mismatch(describe_value(value)))
    }

    /// A mock returning itself keeps only a weak handle in its own setup.
    fn stored(&self, value: Value) -> Value {
        match value {
            Value::Mock(handle) if handle.id() == self.mock.id() => {
                Value::Mock(handle.downgrade())
            }
            other => other,
        }
    }

    /// A delegate's result type must be able to describe the return type.
    fn check_return_type(&self, ty: &TypeDesc) -> MockResult<()> {
        let declared = &self.member.returns;
        let ok = if declared.is_unit() {
            ty.is_unit()
        } else {
            !ty.is_unit() && declared.is_compatible_with(ty)
        };
        if ok {
            Ok(())
        } else {
            Err(self.return_mismatch(ty.to_string()))
        }
    }

    /// Typed delegates must take every declared parameter, in order, with
    /// compatible types.
    fn check_delegate(&self, types: &[TypeDesc]) -> MockResult<()> {
        if types.len() != self.member.params.len() {
            return Err(ConfigError::DelegateArity {
                member: self.member.to_string(),
                delegate: types.len(),
                declared: self.member.params.len(),
            }
            .into());
        }
        for (position, (ty, param)) in types.iter().zip(&self.member.params).enumerate() {
            if !ty.is_compatible_with(&param.ty) {
                return Err(ConfigError::DelegateParameterType {
                    member: self.member.to_string(),
                    position,
                    delegate_type: ty.to_string(),
                    param_type: param.ty.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    // ========================================================================
    // RESPONSES
    // ========================================================================

    /// Return `value` on every matching call.
    pub fn returns<T: ArgValue>(&self, value: T) -> MockResult<&Self> {
        self.returns_value(value.into_value())
    }

    pub fn returns_value(&self, value: impl Into<Value>) -> MockResult<&Self> {
        let value = value.into();
        self.check_return_value(&value)?;
        self.set_response(Step::Return(self.stored(value)))
    }

    /// Compute the return value from the raw arguments.
    pub fn returns_with<F>(&self, f: F) -> MockResult<&Self>
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        if self.member.is_void() {
            return Err(self.return_mismatch("<function>".to_string()));
        }
        let compute: ValueFn = Arc::new(move |args| Ok(f(args)));
        self.set_response(Step::Compute(compute))
    }

    /// Compute the return value without looking at the arguments.
    pub fn returns_with0<R, F>(&self, f: F) -> MockResult<&Self>
    where
        R: ArgValue,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.check_return_type(&R::type_desc())?;
        let compute: ValueFn = Arc::new(move |_| Ok(f().into_value()));
        self.set_response(Step::Compute(compute))
    }

    pub fn returns_with1<A, R, F>(&self, f: F) -> MockResult<&Self>
    where
        A: ArgValue,
        R: ArgValue,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.check_delegate(&[A::type_desc()])?;
        self.check_return_type(&R::type_desc())?;
        let member = Arc::clone(&self.member);
        let compute: ValueFn =
            Arc::new(move |args| Ok(f(arg_at(&member, args, 0)?).into_value()));
        self.set_response(Step::Compute(compute))
    }

    pub fn returns_with2<A, B, R, F>(&self, f: F) -> MockResult<&Self>
    where
        A: ArgValue,
        B: ArgValue,
        R: ArgValue,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        self.check_delegate(&[A::type_desc(), B::type_desc()])?;
        self.check_return_type(&R::type_desc())?;
        let member = Arc::clone(&self.member);
        let compute: ValueFn = Arc::new(move |args| {
            Ok(f(arg_at(&member, args, 0)?, arg_at(&member, args, 1)?).into_value())
        });
        self.set_response(Step::Compute(compute))
    }

    pub fn returns_with3<A, B, C, R, F>(&self, f: F) -> MockResult<&Self>
    where
        A: ArgValue,
        B: ArgValue,
        C: ArgValue,
        R: ArgValue,
        F: Fn(A, B, C) -> R + Send + Sync + 'static,
    {
        self.check_delegate(&[A::type_desc(), B::type_desc(), C::type_desc()])?;
        self.check_return_type(&R::type_desc())?;
        let member = Arc::clone(&self.member);
        let compute: ValueFn = Arc::new(move |args| {
            Ok(f(
                arg_at(&member, args, 0)?,
                arg_at(&member, args, 1)?,
                arg_at(&member, args, 2)?,
            )
            .into_value())
        });
        self.set_response(Step::Compute(compute))
    }

    /// Raise `error` on every matching call. The caller gets the same error
    /// back, not a wrapper.
    pub fn throws<E>(&self, error: E) -> MockResult<&Self>
    where
        E: Error + Send + Sync + 'static,
    {
        self.set_response(Step::Throw(Arc::new(error)))
    }

    /// Raise an error computed from the raw arguments.
    pub fn throws_with<E, F>(&self, f: F) -> MockResult<&Self>
    where
        E: Error + Send + Sync + 'static,
        F: Fn(&[Value]) -> E + Send + Sync + 'static,
    {
        let compute: ErrorFn = Arc::new(move |args| Ok(Arc::new(f(args)) as UserError));
        self.set_response(Step::ComputeThrow(compute))
    }

    /// Defer to the stand-in's own implementation.
    pub fn call_base(&self) -> MockResult<&Self> {
        self.set_response(Step::CallBase)
    }

    /// Complete a void call without doing anything.
    pub fn no_op(&self) -> MockResult<&Self> {
        if !self.member.is_void() {
            return Err(self.return_mismatch("void".to_string()));
        }
        self.set_response(Step::NoOp)
    }

    // ========================================================================
    // SEQUENCES
    // ========================================================================

    /// Append a value to the response sequence.
    pub fn then_returns<T: ArgValue>(&self, value: T) -> MockResult<&Self> {
        self.then_returns_value(value.into_value())
    }

    pub fn then_returns_value(&self, value: impl Into<Value>) -> MockResult<&Self> {
        let value = value.into();
        self.check_return_value(&value)?;
        self.push_step(Step::Return(self.stored(value)))
    }

    pub fn then_throws<E>(&self, error: E) -> MockResult<&Self>
    where
        E: Error + Send + Sync + 'static,
    {
        self.push_step(Step::Throw(Arc::new(error)))
    }

    pub fn then_call_base(&self) -> MockResult<&Self> {
        self.push_step(Step::CallBase)
    }

    pub fn then_no_op(&self) -> MockResult<&Self> {
        if !self.member.is_void() {
            return Err(self.return_mismatch("void".to_string()));
        }
        self.push_step(Step::NoOp)
    }

    // ========================================================================
    // CALLBACKS
    // ========================================================================

    /// Run `f` with the raw arguments before the response.
    pub fn callback<F>(&self, f: F) -> MockResult<&Self>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let callback: CallbackFn = Arc::new(move |args| {
            f(args);
            Ok(())
        });
        self.chain()?.add_pre_callback(callback);
        Ok(self)
    }

    pub fn callback0<F>(&self, f: F) -> MockResult<&Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callback(move |_| f())
    }

    pub fn callback1<A, F>(&self, f: F) -> MockResult<&Self>
    where
        A: ArgValue,
        F: Fn(A) + Send + Sync + 'static,
    {
        self.check_delegate(&[A::type_desc()])?;
        let member = Arc::clone(&self.member);
        let callback: CallbackFn = Arc::new(move |args| {
            f(arg_at(&member, args, 0)?);
            Ok(())
        });
        self.chain()?.add_pre_callback(callback);
        Ok(self)
    }

    pub fn callback2<A, B, F>(&self, f: F) -> MockResult<&Self>
    where
        A: ArgValue,
        B: ArgValue,
        F: Fn(A, B) + Send + Sync + 'static,
    {
        self.check_delegate(&[A::type_desc(), B::type_desc()])?;
        let member = Arc::clone(&self.member);
        let callback: CallbackFn = Arc::new(move |args| {
            f(arg_at(&member, args, 0)?, arg_at(&member, args, 1)?);
            Ok(())
        });
        self.chain()?.add_pre_callback(callback);
        Ok(self)
    }

    pub fn callback3<A, B, C, F>(&self, f: F) -> MockResult<&Self>
    where
        A: ArgValue,
        B: ArgValue,
        C: ArgValue,
        F: Fn(A, B, C) + Send + Sync + 'static,
    {
        self.check_delegate(&[A::type_desc(), B::type_desc(), C::type_desc()])?;
        let member = Arc::clone(&self.member);
        let callback: CallbackFn = Arc::new(move |args| {
            f(
                arg_at(&member, args, 0)?,
                arg_at(&member, args, 1)?,
                arg_at(&member, args, 2)?,
            );
            Ok(())
        });
        self.chain()?.add_pre_callback(callback);
        Ok(self)
    }

    /// Run `f` with the raw arguments after the response is resolved.
    pub fn after_return<F>(&self, f: F) -> MockResult<&Self>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let callback: CallbackFn = Arc::new(move |args| {
            f(args);
            Ok(())
        });
        self.chain()?.add_post_callback(callback);
        Ok(self)
    }

    pub fn after_return1<A, F>(&self, f: F) -> MockResult<&Self>
    where
        A: ArgValue,
        F: Fn(A) + Send + Sync + 'static,
    {
        self.check_delegate(&[A::type_desc()])?;
        let member = Arc::clone(&self.member);
        let callback: CallbackFn = Arc::new(move |args| {
            f(arg_at(&member, args, 0)?);
            Ok(())
        });
        self.chain()?.add_post_callback(callback);
        Ok(self)
    }

    // ========================================================================
    // ARGUMENTS, LIMITS, DELAYS
    // ========================================================================

    /// Write `value` into the `ref`/`out` slot at `position` on every call.
    pub fn assign_out(&self, position: usize, value: impl Into<Value>) -> MockResult<&Self> {
        let value = value.into();
        let param = self
            .member
            .params
            .get(position)
            .filter(|p| p.mode.is_by_ref())
            .ok_or_else(|| ConfigError::NotByRef {
                member: self.member.to_string(),
                position,
            })?;
        if !matches!(param.ty, TypeDesc::Param(_)) && !param.ty.accepts(&value) {
            return Err(ConfigError::IncompatibleArgument {
                param: param.name.clone(),
                value: value.to_string(),
                param_type: param.ty.to_string(),
            }
            .into());
        }
        self.chain()?.assign(position, value);
        Ok(self)
    }

    /// Fail once the setup has run more than `limit` times.
    pub fn execution_limit(&self, limit: u32) -> MockResult<&Self> {
        self.chain()?.set_limit(limit, self.setup.rendering())?;
        Ok(self)
    }

    /// Block for `delay` before returning.
    pub fn delay(&self, delay: Duration) -> MockResult<&Self> {
        self.chain()?.set_delay(Delay::Fixed(delay));
        Ok(self)
    }

    /// Block for a delay computed from the 1-based call index.
    pub fn delay_with<F>(&self, f: F) -> MockResult<&Self>
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.chain()?.set_delay(Delay::PerCall(Arc::new(f)));
        Ok(self)
    }

    // ========================================================================
    // VERIFICATION
    // ========================================================================

    /// Include this setup in `Mock::verify`.
    pub fn verifiable(&self) -> &Self {
        self.setup.mark_verifiable();
        self
    }

    /// Include this setup in `Mock::verify` with an expected call count.
    pub fn verifiable_times(&self, times: CallCount) -> MockResult<&Self> {
        self.setup.set_expected_calls(times)?;
        Ok(self)
    }
}

impl fmt::Debug for SetupBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupBuilder")
            .field("mock", &self.mock.name())
            .field("setup", &self.setup.rendering())
            .finish()
    }
}

fn arg_at<A: ArgValue>(member: &Member, args: &[Value], position: usize) -> MockResult<A> {
    let value = args.get(position).unwrap_or(&Value::Null);
    A::from_value(value).ok_or_else(|| {
        DispatchError::ArgumentConversion {
            member: member.to_string(),
            position,
            expected: A::type_desc().to_string(),
            value: value.to_string(),
        }
        .into()
    })
}

fn describe_value(value: &Value) -> String {
    value
        .type_desc()
        .map_or_else(|| "null".to_string(), |t| t.to_string())
}
