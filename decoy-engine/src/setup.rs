//! Setups
//!
//! A [`Setup`] pairs a reduced call description with what happens when an
//! invocation matches it. Once registered, a setup only changes through its
//! flags, its behavior chain counters and stored property values.

use crate::behavior::{BehaviorChain, Execution, Planned, Step, UserError};
use crate::mock::Mock;
use bitflags::bitflags;
use decoy_core::{
    CallCount, ConfigError, DispatchError, Expectation, ExprShape, Invocation, MemberKind,
    MockError, MockResult, SetupId, Value,
};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_SETUP: AtomicU64 = AtomicU64::new(1);

bitflags! {
    /// Mutable state of a setup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SetupFlags: u8 {
        /// At least one invocation matched.
        const MATCHED = 0b0001;
        /// A later, structurally equal setup replaced this one.
        const OVERRIDDEN = 0b0010;
        /// Checked by `verify`.
        const VERIFIABLE = 0b0100;
        /// Implicitly checked by `verify` (nested chain segments).
        const EXPECTED = 0b1000;
    }
}

/// Gate evaluated before a setup is allowed to match.
pub type Condition = Arc<dyn Fn() -> bool + Send + Sync>;

/// Identity of a setup for override detection.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupKey {
    Call {
        shape: ExprShape,
        /// Closure type of the condition, if any
        condition: Option<TypeId>,
    },
    AllProperties { interface: String },
}

/// What a setup does when it matches.
pub enum SetupKind {
    Call { chain: Arc<Mutex<BehaviorChain>> },
    /// Single stored property value
    Property { value: Mutex<Value> },
    /// Values for every property of the covered interfaces
    AllProperties {
        interfaces: HashSet<String>,
        values: Mutex<HashMap<String, Value>>,
    },
    /// A chain segment answered by a child mock
    Nested { child: Mock },
}

/// Result of running a matched setup.
#[derive(Debug, Clone)]
pub enum Resolution {
    Value(Value),
    Throw(UserError),
    CallBase,
    /// Answer with the member's default value
    Default,
    /// Nothing configured for a non-void member
    Missing,
}

/// A registered setup.
pub struct Setup {
    id: SetupId,
    key: SetupKey,
    expectation: Option<Expectation>,
    rendering: String,
    condition: Option<Condition>,
    flags: AtomicU8,
    expected_calls: Mutex<Option<CallCount>>,
    kind: SetupKind,
}

impl Setup {
    fn new(
        key: SetupKey,
        expectation: Option<Expectation>,
        rendering: String,
        condition: Option<(TypeId, Condition)>,
        kind: SetupKind,
        flags: SetupFlags,
    ) -> Self {
        let (key, condition) = match (key, condition) {
            (SetupKey::Call { shape, .. }, Some((origin, condition))) => (
                SetupKey::Call {
                    shape,
                    condition: Some(origin),
                },
                Some(condition),
            ),
            (key, condition) => (key, condition.map(|(_, c)| c)),
        };
        Self {
            id: NEXT_SETUP.fetch_add(1, Ordering::Relaxed),
            key,
            expectation,
            rendering,
            condition,
            flags: AtomicU8::new(flags.bits()),
            expected_calls: Mutex::new(None),
            kind,
        }
    }

    /// Plain call setup with its own behavior chain.
    pub fn call(expectation: Expectation, condition: Option<(TypeId, Condition)>) -> Self {
        let chain = BehaviorChain::with_assignments(expectation.out_values().to_vec());
        let key = SetupKey::Call {
            shape: expectation.shape().clone(),
            condition: None,
        };
        let rendering = expectation.rendering().to_string();
        Self::new(
            key,
            Some(expectation),
            rendering,
            condition,
            SetupKind::Call {
                chain: Arc::new(Mutex::new(chain)),
            },
            SetupFlags::empty(),
        )
    }

    /// Property stub answering both accessors of the getter's property.
    pub fn property(getter: Expectation, initial: Value) -> Self {
        let key = SetupKey::Call {
            shape: getter.shape().clone(),
            condition: None,
        };
        let rendering = getter.rendering().to_string();
        Self::new(
            key,
            Some(getter),
            rendering,
            None,
            SetupKind::Property {
                value: Mutex::new(initial),
            },
            SetupFlags::empty(),
        )
    }

    /// Stub every property of `interfaces`; the first name is the mocked one.
    pub fn all_properties(interfaces: Vec<String>) -> Self {
        let primary = interfaces.first().cloned().unwrap_or_default();
        Self::new(
            SetupKey::AllProperties {
                interface: primary.clone(),
            },
            None,
            format!("mock.<all properties of {}>", primary),
            None,
            SetupKind::AllProperties {
                interfaces: interfaces.into_iter().collect(),
                values: Mutex::new(HashMap::new()),
            },
            SetupFlags::empty(),
        )
    }

    /// Chain segment answered by `child`. Always expected.
    pub fn nested(expectation: Expectation, child: Mock) -> Self {
        let key = SetupKey::Call {
            shape: expectation.shape().clone(),
            condition: None,
        };
        let rendering = expectation.rendering().to_string();
        Self::new(
            key,
            Some(expectation),
            rendering,
            None,
            SetupKind::Nested { child },
            SetupFlags::EXPECTED,
        )
    }

    pub fn id(&self) -> SetupId {
        self.id
    }

    pub fn key(&self) -> &SetupKey {
        &self.key
    }

    pub fn expectation(&self) -> Option<&Expectation> {
        self.expectation.as_ref()
    }

    pub fn kind(&self) -> &SetupKind {
        &self.kind
    }

    /// Diagnostic form of the call description.
    pub fn rendering(&self) -> &str {
        &self.rendering
    }

    pub fn flags(&self) -> SetupFlags {
        SetupFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    fn set_flag(&self, flag: SetupFlags) {
        self.flags.fetch_or(flag.bits(), Ordering::AcqRel);
    }

    pub fn is_matched(&self) -> bool {
        self.flags().contains(SetupFlags::MATCHED)
    }

    pub fn is_overridden(&self) -> bool {
        self.flags().contains(SetupFlags::OVERRIDDEN)
    }

    /// Whether `verify` checks this setup.
    pub fn is_expected(&self) -> bool {
        self.flags()
            .intersects(SetupFlags::VERIFIABLE | SetupFlags::EXPECTED)
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    pub(crate) fn mark_overridden(&self) {
        self.set_flag(SetupFlags::OVERRIDDEN);
    }

    pub fn mark_verifiable(&self) {
        self.set_flag(SetupFlags::VERIFIABLE);
    }

    /// Expect exactly this many matching calls instead of "at least one".
    pub fn set_expected_calls(&self, times: CallCount) -> MockResult<()> {
        let mut slot = self
            .expected_calls
            .lock()
            .map_err(|_| MockError::lock_poisoned("setup call count"))?;
        *slot = Some(times);
        drop(slot);
        self.mark_verifiable();
        Ok(())
    }

    pub fn expected_calls(&self) -> Option<CallCount> {
        self.expected_calls.lock().ok().and_then(|slot| *slot)
    }

    /// Behavior chain of a plain call setup.
    pub fn chain(&self) -> Option<&Arc<Mutex<BehaviorChain>>> {
        match &self.kind {
            SetupKind::Call { chain } => Some(chain),
            _ => None,
        }
    }

    /// Child mock of a nested setup.
    pub fn child(&self) -> Option<&Mock> {
        match &self.kind {
            SetupKind::Nested { child } => Some(child),
            _ => None,
        }
    }

    /// Sequence steps not yet consumed.
    pub fn remaining_steps(&self) -> usize {
        self.chain()
            .and_then(|chain| chain.lock().ok().map(|c| c.remaining_steps()))
            .unwrap_or(0)
    }

    /// Whether `invocation` should be answered by this setup.
    pub fn matches(&self, invocation: &Invocation) -> bool {
        if self.is_overridden() {
            return false;
        }
        if let Some(condition) = &self.condition {
            if !condition() {
                return false;
            }
        }
        let member = invocation.member();
        match (&self.kind, &self.expectation) {
            (SetupKind::Property { .. }, Some(getter)) => member.same_property(getter.member()),
            (SetupKind::AllProperties { interfaces, .. }, _) => {
                member.is_property() && interfaces.contains(&member.interface)
            }
            (_, Some(expectation)) => expectation.matches_invocation(invocation),
            (_, None) => false,
        }
    }

    /// Same member as `invocation`, arguments not considered.
    pub fn partially_matches(&self, invocation: &Invocation) -> bool {
        !self.is_overridden()
            && self
                .expectation
                .as_ref()
                .map_or(false, |e| e.partially_matches(invocation))
    }

    /// Run this setup for a matched invocation.
    pub fn execute(&self, invocation: &mut Invocation, owner: &Mock) -> MockResult<Resolution> {
        self.set_flag(SetupFlags::MATCHED);
        invocation.set_matched_setup(self.id);

        match &self.kind {
            SetupKind::Call { chain } => self.execute_chain(chain, invocation),
            SetupKind::Property { value } => {
                let mut stored = value
                    .lock()
                    .map_err(|_| MockError::lock_poisoned("property value"))?;
                Ok(match invocation.member().kind {
                    MemberKind::Setter => {
                        *stored = invocation.arg(0).cloned().unwrap_or(Value::Null);
                        Resolution::Value(Value::Unit)
                    }
                    _ => Resolution::Value(stored.clone()),
                })
            }
            SetupKind::AllProperties { values, .. } => {
                let member = Arc::clone(invocation.member());
                match member.kind {
                    MemberKind::Setter => {
                        let value = invocation.arg(0).cloned().unwrap_or(Value::Null);
                        values
                            .lock()
                            .map_err(|_| MockError::lock_poisoned("property values"))?
                            .insert(member.name.clone(), value);
                        Ok(Resolution::Value(Value::Unit))
                    }
                    _ => {
                        let stored = values
                            .lock()
                            .map_err(|_| MockError::lock_poisoned("property values"))?
                            .get(&member.name)
                            .cloned();
                        let value = match stored {
                            Some(value) => value,
                            None => {
                                // Resolved without the lock held: a child mock
                                // default may re-enter this mock.
                                let default = owner.default_for(&member, &member.returns);
                                values
                                    .lock()
                                    .map_err(|_| MockError::lock_poisoned("property values"))?
                                    .entry(member.name.clone())
                                    .or_insert(default)
                                    .clone()
                            }
                        };
                        Ok(Resolution::Value(value))
                    }
                }
            }
            SetupKind::Nested { child } => Ok(Resolution::Value(Value::Mock(child.handle()))),
        }
    }

    fn execute_chain(
        &self,
        chain: &Mutex<BehaviorChain>,
        invocation: &mut Invocation,
    ) -> MockResult<Resolution> {
        let execution = chain
            .lock()
            .map_err(|_| MockError::lock_poisoned("behavior chain"))?
            .plan();

        for (position, value) in &execution.assignments {
            invocation.set_arg(*position, value.clone());
        }

        let outcome = respond(&execution, invocation);

        if let Some((limit, count)) = execution.limit_exceeded() {
            return Err(DispatchError::ExecutionLimitExceeded {
                setup: self.rendering.clone(),
                limit,
                count,
            }
            .into());
        }

        // Chain lock is released; a per-call delay may re-enter the mock.
        if let Some(delay) = execution.delay() {
            std::thread::sleep(delay);
        }

        outcome
    }

    /// Failure line for verification, `None` when satisfied.
    pub fn verification_failure(&self, log: &[Arc<Invocation>]) -> Option<String> {
        if let Some(times) = self.expected_calls() {
            let count = log
                .iter()
                .filter(|inv| inv.matched_setup() == Some(self.id))
                .count();
            if !times.validate(count) {
                return Some(times.failure_message(&self.rendering, count));
            }
        } else if !self.is_matched() {
            return Some(self.rendering.clone());
        }
        match self.remaining_steps() {
            0 => None,
            remaining => Some(format!(
                "{}: {} sequence step(s) remaining",
                self.rendering, remaining
            )),
        }
    }

    /// Mark every logged invocation this setup answered as verified.
    pub fn mark_invocations_verified(&self, log: &[Arc<Invocation>]) {
        log.iter()
            .filter(|inv| inv.matched_setup() == Some(self.id))
            .for_each(|inv| inv.mark_verified());
    }
}

/// Callbacks and response of one planned call.
fn respond(execution: &Execution, invocation: &Invocation) -> MockResult<Resolution> {
    for callback in &execution.pre {
        callback(invocation.args())?;
    }

    let resolution = match &execution.response {
        Planned::Step(Step::Return(value)) => Resolution::Value(value.clone()),
        Planned::Step(Step::Compute(f)) => Resolution::Value(f(invocation.args())?),
        Planned::Step(Step::Throw(error)) => Resolution::Throw(Arc::clone(error)),
        Planned::Step(Step::ComputeThrow(f)) => Resolution::Throw(f(invocation.args())?),
        Planned::Step(Step::CallBase) => Resolution::CallBase,
        Planned::Step(Step::NoOp) => Resolution::Value(Value::Unit),
        Planned::Exhausted => Resolution::Default,
        Planned::Missing if invocation.member().is_void() => Resolution::Value(Value::Unit),
        Planned::Missing => Resolution::Missing,
    };

    for callback in &execution.post {
        callback(invocation.args())?;
    }

    Ok(resolution)
}

impl fmt::Debug for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setup")
            .field("id", &self.id)
            .field("rendering", &self.rendering)
            .field("flags", &self.flags())
            .finish()
    }
}

impl fmt::Display for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendering)
    }
}

/// Reject a call description that is not a property accessor.
pub(crate) fn require_property(expectation: &Expectation, kind: MemberKind) -> MockResult<()> {
    if expectation.member().kind == kind {
        Ok(())
    } else {
        Err(ConfigError::NotAProperty {
            expression: expectation.rendering().to_string(),
        }
        .into())
    }
}
