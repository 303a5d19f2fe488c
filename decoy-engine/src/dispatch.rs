//! Invocation dispatch
//!
//! Stand-ins turn every call they receive into an [`Invocation`] and hand it
//! to an [`Interceptor`]. For a [`Mock`] the decision order is:
//!
//! 1. the mock accessor answers with the mock itself;
//! 2. the newest matching setup runs;
//! 3. unmatched identity members (`to_string`, `equals`, `hash_code`) get
//!    identity answers and are not logged;
//! 4. anything else is an error on strict mocks, and a default value (or the
//!    base implementation when `call_base` is set) on loose ones.

use crate::behavior::UserError;
use crate::mock::Mock;
use crate::setup::Resolution;
use decoy_core::{
    ConfigError, DispatchError, Invocation, MemberKind, MockResult, Value, WellKnown,
};
use std::fmt;
use std::sync::Arc;

/// What the stand-in should do with an intercepted call.
#[derive(Clone)]
pub enum Outcome {
    /// Return this value (`Unit` for void members).
    Value(Value),
    /// Raise the configured error.
    Throw(UserError),
    /// Run the stand-in's own implementation.
    CallBase,
}

impl Outcome {
    /// The returned value, if any.
    pub fn value(self) -> Option<Value> {
        match self {
            Outcome::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&UserError> {
        match self {
            Outcome::Throw(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_call_base(&self) -> bool {
        matches!(self, Outcome::CallBase)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(v) => write!(f, "Value({})", v),
            Outcome::Throw(e) => write!(f, "Throw({})", e),
            Outcome::CallBase => write!(f, "CallBase"),
        }
    }
}

/// Receives the calls a stand-in intercepts.
pub trait Interceptor: Send + Sync {
    /// Decide the outcome of `invocation`. `out` and `ref` slots may be
    /// written back into the invocation.
    fn intercept(&self, invocation: &mut Invocation) -> MockResult<Outcome>;
}

impl Interceptor for Mock {
    fn intercept(&self, invocation: &mut Invocation) -> MockResult<Outcome> {
        let member = Arc::clone(invocation.member());
        if WellKnown::is_mock_accessor(&member) {
            return Ok(Outcome::Value(Value::Mock(self.handle())));
        }

        tracing::trace!(mock = %self, invocation = %invocation, "dispatching");

        let matched = self.registry().find_last(|s| s.matches(invocation))?;
        let result = match matched {
            Some(setup) => setup
                .execute(invocation, self)
                .and_then(|resolution| self.resolve(resolution, invocation)),
            None if WellKnown::is_identity_member(&member) => {
                return Ok(Outcome::Value(self.identity_answer(invocation)));
            }
            None => self.unmatched(invocation),
        };

        if let Ok(Outcome::Value(value)) = &result {
            invocation.set_return_value(value.clone());
        }
        // Failed calls are logged too; verification counts them.
        self.log().append(Arc::new(self.detached(invocation)))?;
        result
    }
}

impl Mock {
    /// Log copy of `invocation` that holds this mock only weakly.
    fn detached(&self, invocation: &Invocation) -> Invocation {
        let mut entry = invocation.clone();
        let own = |value: &Value| match value {
            Value::Mock(handle) if handle.id() == self.id() && !handle.is_weak() => {
                Some(Value::Mock(handle.downgrade()))
            }
            _ => None,
        };
        if let Some(value) = entry.return_value().and_then(own) {
            entry.set_return_value(value);
        }
        let args: Vec<(usize, Value)> = entry
            .args()
            .iter()
            .enumerate()
            .filter_map(|(position, value)| own(value).map(|v| (position, v)))
            .collect();
        for (position, value) in args {
            entry.set_arg(position, value);
        }
        entry
    }

    /// Turn a setup's resolution into the stand-in's outcome.
    fn resolve(&self, resolution: Resolution, invocation: &Invocation) -> MockResult<Outcome> {
        Ok(match resolution {
            Resolution::Value(value) => Outcome::Value(value),
            Resolution::Throw(error) => Outcome::Throw(error),
            Resolution::CallBase => Outcome::CallBase,
            Resolution::Default => Outcome::Value(self.default_answer(invocation)),
            Resolution::Missing if self.is_strict() => {
                return Err(ConfigError::ResponseRequired {
                    member: invocation.member().to_string(),
                    return_type: invocation.return_type().to_string(),
                }
                .into());
            }
            Resolution::Missing => Outcome::Value(self.default_answer(invocation)),
        })
    }

    fn unmatched(&self, invocation: &Invocation) -> MockResult<Outcome> {
        if self.is_strict() {
            let candidates = self
                .registry()
                .find_all(|s| s.partially_matches(invocation))?
                .iter()
                .map(|s| s.rendering().to_string())
                .collect::<Vec<_>>();
            tracing::warn!(
                mock = %self,
                invocation = %invocation,
                candidates = candidates.len(),
                "strict mock received a call with no matching setup"
            );
            return Err(DispatchError::NoSetup {
                signature: invocation.to_string(),
                candidates,
            }
            .into());
        }
        if self.config().call_base {
            return Ok(Outcome::CallBase);
        }
        Ok(Outcome::Value(self.default_answer(invocation)))
    }

    fn default_answer(&self, invocation: &Invocation) -> Value {
        let member = invocation.member();
        if member.is_void() {
            return Value::Unit;
        }
        self.default_for(member, &invocation.return_type())
    }

    fn identity_answer(&self, invocation: &Invocation) -> Value {
        let member = invocation.member();
        match member.name.as_str() {
            "to_string" => Value::str(self.name()),
            "equals" => Value::Bool(
                invocation
                    .arg(0)
                    .and_then(Value::as_mock)
                    .map_or(false, |other| other.id() == self.id()),
            ),
            "hash_code" => {
                let (high, low) = self.id().as_u64_pair();
                Value::Int((high ^ low) as i64)
            }
            _ if member.kind == MemberKind::Method && member.is_void() => Value::Unit,
            _ => self.default_for(member, &invocation.return_type()),
        }
    }
}
