//! Default values
//!
//! Loose mocks answer unmatched non-void calls with a default value. The
//! table is pluggable through [`DefaultValueProvider`]; [`PolicyDefaults`]
//! covers the usual choices from a [`DefaultValuePolicy`].

use crate::mock::Mock;
use decoy_core::{
    DefaultValuePolicy, InterfaceDefault, Member, SequenceDefault, StringDefault, TypeDesc, Value,
};
use std::collections::HashMap;

/// Resolves the value a mock returns when nothing else decides.
pub trait DefaultValueProvider: Send + Sync {
    /// Default for `ty`, the closed return type of `member` on `owner`.
    fn default_value(&self, ty: &TypeDesc, member: &Member, owner: &Mock) -> Value;
}

/// Policy-driven default table with per-type overrides.
#[derive(Debug, Clone, Default)]
pub struct PolicyDefaults {
    policy: DefaultValuePolicy,
    overrides: HashMap<TypeDesc, Value>,
}

impl PolicyDefaults {
    pub fn new(policy: DefaultValuePolicy) -> Self {
        Self {
            policy,
            overrides: HashMap::new(),
        }
    }

    /// Always answer `ty` with `value`.
    pub fn with_override(mut self, ty: TypeDesc, value: impl Into<Value>) -> Self {
        self.overrides.insert(ty, value.into());
        self
    }

    pub fn policy(&self) -> &DefaultValuePolicy {
        &self.policy
    }

    fn empty_or_null(setting: SequenceDefault, empty: Value) -> Value {
        match setting {
            SequenceDefault::Empty => empty,
            SequenceDefault::Null => Value::Null,
        }
    }
}

impl DefaultValueProvider for PolicyDefaults {
    fn default_value(&self, ty: &TypeDesc, member: &Member, owner: &Mock) -> Value {
        if let Some(value) = self.overrides.get(ty) {
            return value.clone();
        }
        match ty {
            TypeDesc::Unit => Value::Unit,
            TypeDesc::Bool => Value::Bool(false),
            TypeDesc::Int => Value::Int(0),
            TypeDesc::UInt => Value::UInt(0),
            TypeDesc::Float => Value::Float(0.0),
            TypeDesc::Str => match self.policy.strings {
                StringDefault::Null => Value::Null,
                StringDefault::Empty => Value::str(""),
            },
            TypeDesc::Array(elem) => {
                Self::empty_or_null(self.policy.arrays, Value::array((**elem).clone(), Vec::new()))
            }
            TypeDesc::Seq(elem) => {
                Self::empty_or_null(self.policy.sequences, Value::seq((**elem).clone(), Vec::new()))
            }
            TypeDesc::Tuple(items) => Value::Tuple(
                items
                    .iter()
                    .map(|item| self.default_value(item, member, owner))
                    .collect(),
            ),
            TypeDesc::Interface(_) => match self.policy.interfaces {
                InterfaceDefault::Null => Value::Null,
                InterfaceDefault::Mock => match owner.default_child(member, ty) {
                    Ok(child) => Value::Mock(child.handle()),
                    Err(e) => {
                        tracing::debug!(member = %member, error = %e, "no child mock for default value");
                        Value::Null
                    }
                },
            },
            TypeDesc::Nullable(_)
            | TypeDesc::Object
            | TypeDesc::Named(_)
            | TypeDesc::Expr
            | TypeDesc::Param(_) => Value::Null,
        }
    }
}
