//! Intercepted calls

use crate::member::{Member, ParamMode};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{SetupId, Timestamp};
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_INVOCATION: AtomicU64 = AtomicU64::new(1);

/// One concrete call forwarded by a stand-in.
///
/// Argument slots are mutable so that `ref`/`out` parameters can be written
/// back, and the return slot is filled in by dispatch. Once logged, only the
/// verified flag changes.
#[derive(Debug)]
pub struct Invocation {
    sequence: u64,
    member: Arc<Member>,
    generic_args: Vec<TypeDesc>,
    args: Vec<Value>,
    return_value: Option<Value>,
    matched_setup: Option<SetupId>,
    verified: AtomicBool,
    timestamp: Timestamp,
}

impl Invocation {
    pub fn new(member: Arc<Member>, args: Vec<Value>) -> Self {
        Self {
            sequence: NEXT_INVOCATION.fetch_add(1, Ordering::Relaxed),
            member,
            generic_args: Vec::new(),
            args,
            return_value: None,
            matched_setup: None,
            verified: AtomicBool::new(false),
            timestamp: Utc::now(),
        }
    }

    /// Close an open generic member with concrete type arguments.
    pub fn with_generic_args(mut self, generic_args: Vec<TypeDesc>) -> Self {
        self.generic_args = generic_args;
        self
    }

    /// Process-wide call order.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn member(&self) -> &Arc<Member> {
        &self.member
    }

    pub fn generic_args(&self) -> &[TypeDesc] {
        &self.generic_args
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut [Value] {
        &mut self.args
    }

    pub fn arg(&self, position: usize) -> Option<&Value> {
        self.args.get(position)
    }

    /// Write a by-ref or out argument. Positions past the end are ignored.
    pub fn set_arg(&mut self, position: usize, value: Value) {
        if let Some(slot) = self.args.get_mut(position) {
            *slot = value;
        }
    }

    /// Values of every `out` and `ref` slot, by position.
    pub fn by_ref_args(&self) -> Vec<(usize, &Value)> {
        self.member
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p.mode, ParamMode::Ref | ParamMode::Out))
            .filter_map(|(i, _)| self.args.get(i).map(|v| (i, v)))
            .collect()
    }

    /// Declared return type with generic parameters closed.
    pub fn return_type(&self) -> TypeDesc {
        self.member.closed_type(&self.member.returns, &self.generic_args)
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = Some(value);
    }

    pub fn matched_setup(&self) -> Option<SetupId> {
        self.matched_setup
    }

    pub fn set_matched_setup(&mut self, setup: SetupId) {
        self.matched_setup = Some(setup);
    }

    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    pub fn mark_verified(&self) {
        self.verified.store(true, Ordering::Release);
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Clone for Invocation {
    fn clone(&self) -> Self {
        Self {
            sequence: self.sequence,
            member: Arc::clone(&self.member),
            generic_args: self.generic_args.clone(),
            args: self.args.clone(),
            return_value: self.return_value.clone(),
            matched_setup: self.matched_setup,
            verified: AtomicBool::new(self.is_verified()),
            timestamp: self.timestamp,
        }
    }
}

/// Renders the call as `IService.method<int>(1, "a")`.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.member.interface, self.member.name)?;
        if !self.generic_args.is_empty() {
            let generics = self
                .generic_args
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "<{}>", generics)?;
        }
        match self.member.kind {
            crate::member::MemberKind::Getter => Ok(()),
            crate::member::MemberKind::Setter => {
                write!(f, " = {}", self.args.first().unwrap_or(&Value::Null))
            }
            crate::member::MemberKind::Method => {
                let args = self
                    .args
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({})", args)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse() -> Arc<Member> {
        Arc::new(
            Member::method("IService", "try_parse")
                .param("input", TypeDesc::Str)
                .param_with_mode("result", TypeDesc::Int, ParamMode::Out)
                .returns(TypeDesc::Bool),
        )
    }

    #[test]
    fn test_display_method() {
        let inv = Invocation::new(parse(), vec![Value::str("42"), Value::Int(0)]);
        assert_eq!(inv.to_string(), "IService.try_parse(\"42\", 0)");
    }

    #[test]
    fn test_display_generic_and_property() {
        let echo = Arc::new(Member::method("IService", "echo").generic("T"));
        let inv = Invocation::new(echo, vec![]).with_generic_args(vec![TypeDesc::Int]);
        assert_eq!(inv.to_string(), "IService.echo<int>()");

        let set = Arc::new(Member::setter("IService", "Name", TypeDesc::Str));
        let inv = Invocation::new(set, vec![Value::str("x")]);
        assert_eq!(inv.to_string(), "IService.Name = \"x\"");
    }

    #[test]
    fn test_out_slot_write_back() {
        let mut inv = Invocation::new(parse(), vec![Value::str("42"), Value::Int(0)]);
        inv.set_arg(1, Value::Int(42));
        inv.set_arg(9, Value::Int(1));
        assert_eq!(inv.by_ref_args(), vec![(1, &Value::Int(42))]);
    }

    #[test]
    fn test_clone_keeps_verified_flag_independent() {
        let inv = Invocation::new(parse(), vec![Value::str("1"), Value::Int(0)]);
        inv.mark_verified();
        let copy = inv.clone();
        assert!(copy.is_verified());
        assert_eq!(copy.sequence(), inv.sequence());
    }

    #[test]
    fn test_sequences_increase() {
        let a = Invocation::new(parse(), vec![]);
        let b = Invocation::new(parse(), vec![]);
        assert!(b.sequence() > a.sequence());
    }
}
