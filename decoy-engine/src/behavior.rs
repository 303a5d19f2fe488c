//! Behavior chains
//!
//! A [`BehaviorChain`] holds everything a plain call setup does when it
//! matches: argument write-backs, callbacks around the response, the response
//! itself (single or sequenced), an optional execution limit and a delay.
//!
//! The chain lives behind its setup's mutex. Executing it is split in two:
//! [`BehaviorChain::plan`] advances the counters and the sequence under the
//! lock and hands back an [`Execution`], which is then run with no lock held
//! so user closures may call back into the mock.

use decoy_core::{ConfigError, MockResult, Value};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error configured by the user, handed back unchanged.
pub type UserError = Arc<dyn Error + Send + Sync>;

/// Computes a return value from the invocation arguments.
pub type ValueFn = Arc<dyn Fn(&[Value]) -> MockResult<Value> + Send + Sync>;

/// Computes an error from the invocation arguments.
pub type ErrorFn = Arc<dyn Fn(&[Value]) -> MockResult<UserError> + Send + Sync>;

/// Side effect run before or after the response.
pub type CallbackFn = Arc<dyn Fn(&[Value]) -> MockResult<()> + Send + Sync>;

/// Delay as a function of the 1-based call index.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// One response.
#[derive(Clone)]
pub enum Step {
    Return(Value),
    Compute(ValueFn),
    Throw(UserError),
    ComputeThrow(ErrorFn),
    /// Defer to the stand-in's base implementation.
    CallBase,
    /// Complete without a value (void members only).
    NoOp,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Return(v) => write!(f, "Returns({})", v),
            Step::Compute(_) => write!(f, "Returns(<function>)"),
            Step::Throw(e) => write!(f, "Throws({})", e),
            Step::ComputeThrow(_) => write!(f, "Throws(<function>)"),
            Step::CallBase => write!(f, "CallBase"),
            Step::NoOp => write!(f, "NoOp"),
        }
    }
}

#[derive(Debug, Default)]
enum ResponseSlot {
    #[default]
    Empty,
    Single(Step),
    Sequence(VecDeque<Step>),
}

/// How long to block after the response.
#[derive(Clone)]
pub enum Delay {
    Fixed(Duration),
    PerCall(DelayFn),
}

impl Delay {
    /// Duration for the 1-based call `index`. Runs user code for
    /// [`Delay::PerCall`], so never call it with the chain locked.
    pub fn for_call(&self, index: u32) -> Duration {
        match self {
            Delay::Fixed(d) => *d,
            Delay::PerCall(f) => f(index),
        }
    }
}

/// Response part of an [`Execution`].
#[derive(Debug, Clone)]
pub enum Planned {
    Step(Step),
    /// No response configured
    Missing,
    /// Every sequence step has been consumed
    Exhausted,
}

/// Snapshot of what one call to a setup must do.
pub struct Execution {
    pub assignments: Vec<(usize, Value)>,
    pub pre: Vec<CallbackFn>,
    pub response: Planned,
    pub post: Vec<CallbackFn>,
    /// `(limit, count)` when a limit is configured
    pub limit: Option<(u32, u32)>,
    pub delay: Option<Delay>,
    /// 1-based index of this call
    pub call: u32,
}

impl Execution {
    /// Whether the configured execution limit has been passed.
    pub fn limit_exceeded(&self) -> Option<(u32, u32)> {
        self.limit.filter(|(limit, count)| count > limit)
    }

    /// Evaluate the configured delay for this call.
    pub fn delay(&self) -> Option<Duration> {
        self.delay.as_ref().map(|d| d.for_call(self.call))
    }
}

/// Ordered behavior slots of a plain call setup.
#[derive(Default)]
pub struct BehaviorChain {
    assignments: Vec<(usize, Value)>,
    pre: Vec<CallbackFn>,
    response: ResponseSlot,
    post: Vec<CallbackFn>,
    limit: Option<u32>,
    delay: Option<Delay>,
    calls: u32,
}

impl BehaviorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the values captured for `out` parameters.
    pub fn with_assignments(assignments: Vec<(usize, Value)>) -> Self {
        Self {
            assignments,
            ..Self::default()
        }
    }

    /// Write `value` into argument slot `position` on every call.
    pub fn assign(&mut self, position: usize, value: Value) {
        self.assignments.retain(|(p, _)| *p != position);
        self.assignments.push((position, value));
    }

    pub fn add_pre_callback(&mut self, callback: CallbackFn) {
        self.pre.push(callback);
    }

    pub fn add_post_callback(&mut self, callback: CallbackFn) {
        self.post.push(callback);
    }

    /// Set the single response. Fails if any response is already configured.
    pub fn set_response(&mut self, step: Step, setup: &str) -> MockResult<()> {
        match &self.response {
            ResponseSlot::Empty => {
                self.response = ResponseSlot::Single(step);
                Ok(())
            }
            existing => Err(ConfigError::ResponseAlreadySet {
                setup: setup.to_string(),
                existing: describe(existing),
            }
            .into()),
        }
    }

    /// Append a step to the response sequence.
    pub fn push_step(&mut self, step: Step, setup: &str) -> MockResult<()> {
        match &mut self.response {
            ResponseSlot::Empty => {
                self.response = ResponseSlot::Sequence(VecDeque::from([step]));
                Ok(())
            }
            ResponseSlot::Sequence(steps) => {
                steps.push_back(step);
                Ok(())
            }
            existing => Err(ConfigError::ResponseAlreadySet {
                setup: setup.to_string(),
                existing: describe(existing),
            }
            .into()),
        }
    }

    pub fn set_limit(&mut self, limit: u32, setup: &str) -> MockResult<()> {
        if limit < 1 {
            return Err(ConfigError::InvalidExecutionLimit {
                setup: setup.to_string(),
                limit,
            }
            .into());
        }
        if self.limit.is_some() {
            return Err(ConfigError::ExecutionLimitAlreadySet {
                setup: setup.to_string(),
            }
            .into());
        }
        self.limit = Some(limit);
        Ok(())
    }

    pub fn set_delay(&mut self, delay: Delay) {
        self.delay = Some(delay);
    }

    pub fn has_response(&self) -> bool {
        !matches!(self.response, ResponseSlot::Empty)
    }

    /// Sequence steps not yet consumed.
    pub fn remaining_steps(&self) -> usize {
        match &self.response {
            ResponseSlot::Sequence(steps) => steps.len(),
            _ => 0,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// Advance the chain for one call.
    pub fn plan(&mut self) -> Execution {
        self.calls = self.calls.saturating_add(1);
        let response = match &mut self.response {
            ResponseSlot::Empty => Planned::Missing,
            ResponseSlot::Single(step) => Planned::Step(step.clone()),
            ResponseSlot::Sequence(steps) => match steps.pop_front() {
                Some(step) => Planned::Step(step),
                None => Planned::Exhausted,
            },
        };
        Execution {
            assignments: self.assignments.clone(),
            pre: self.pre.clone(),
            response,
            post: self.post.clone(),
            limit: self.limit.map(|limit| (limit, self.calls)),
            delay: self.delay.clone(),
            call: self.calls,
        }
    }
}

fn describe(slot: &ResponseSlot) -> String {
    match slot {
        ResponseSlot::Empty => "nothing".to_string(),
        ResponseSlot::Single(step) => format!("{:?}", step),
        ResponseSlot::Sequence(steps) => format!("sequence of {} step(s)", steps.len()),
    }
}

impl fmt::Debug for BehaviorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorChain")
            .field("response", &self.response)
            .field("pre_callbacks", &self.pre.len())
            .field("post_callbacks", &self.post.len())
            .field("limit", &self.limit)
            .field("calls", &self.calls)
            .finish()
    }
}
