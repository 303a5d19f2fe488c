//! Configuration types

use crate::error::{ConfigError, MockResult};
use serde::{Deserialize, Serialize};

/// How a mock answers invocations that no setup matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockBehavior {
    /// Unmatched invocations are errors.
    Strict,
    /// Unmatched invocations return default values.
    #[default]
    Loose,
}

/// Default for string members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringDefault {
    #[default]
    Null,
    Empty,
}

/// Default for arrays and enumerable sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceDefault {
    #[default]
    Empty,
    Null,
}

/// Default for interface-typed members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceDefault {
    #[default]
    Null,
    /// A fresh child mock, created once per member
    Mock,
}

/// Table of default values returned by loose mocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultValuePolicy {
    pub strings: StringDefault,
    pub arrays: SequenceDefault,
    pub sequences: SequenceDefault,
    pub interfaces: InterfaceDefault,
}

impl DefaultValuePolicy {
    /// Empty collections and child mocks instead of nulls.
    pub fn mock() -> Self {
        Self {
            strings: StringDefault::Empty,
            arrays: SequenceDefault::Empty,
            sequences: SequenceDefault::Empty,
            interfaces: InterfaceDefault::Mock,
        }
    }
}

/// Per-mock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub behavior: MockBehavior,
    /// Unmatched invocations on a loose mock fall through to the base
    /// implementation.
    pub call_base: bool,
    pub default_values: DefaultValuePolicy,
    /// Name used in diagnostics instead of the generated one.
    pub name: Option<String>,
}

impl MockConfig {
    pub fn strict() -> Self {
        Self {
            behavior: MockBehavior::Strict,
            ..Self::default()
        }
    }

    pub fn loose() -> Self {
        Self::default()
    }

    pub fn with_call_base(mut self, call_base: bool) -> Self {
        self.call_base = call_base;
        self
    }

    pub fn with_default_values(mut self, policy: DefaultValuePolicy) -> Self {
        self.default_values = policy;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_strict(&self) -> bool {
        self.behavior == MockBehavior::Strict
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> MockResult<Self> {
        let config: MockConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MockResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "name".to_string(),
                    value: format!("{:?}", name),
                    reason: "name must not be blank".to_string(),
                }
                .into());
            }
        }

        if self.call_base && self.behavior == MockBehavior::Strict {
            return Err(ConfigError::InvalidValue {
                field: "call_base".to_string(),
                value: "true".to_string(),
                reason: "call_base only applies to unmatched invocations, which a strict mock rejects".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
