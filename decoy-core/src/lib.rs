//! decoy Core - Call Descriptions and Matchers
//!
//! The vocabulary shared by every decoy crate: the runtime type model,
//! dynamic values, member descriptors, argument matchers, call descriptions
//! and the expectations they reduce to. Nothing in here knows how a mock
//! stores setups or dispatches calls; that lives in `decoy-engine`.

pub mod arg;
pub mod call_count;
pub mod config;
pub mod error;
pub mod expectation;
pub mod expr;
pub mod generic;
pub mod invocation;
pub mod matcher;
pub mod member;
pub mod observer;
pub mod types;
pub mod value;

pub use call_count::{CallCount, CallCountKind};
pub use config::{
    DefaultValuePolicy, InterfaceDefault, MockBehavior, MockConfig, SequenceDefault, StringDefault,
};
pub use error::{ConfigError, DispatchError, MockError, MockErrorReason, MockResult, VerifyError};
pub use expectation::Expectation;
pub use expr::{CallExpr, Expr, ExprShape, Thunk};
pub use generic::TypeMatcher;
pub use invocation::Invocation;
pub use matcher::{ArgumentMatcher, MatcherShape, ValueSource};
pub use member::{
    Interface, InterfaceCatalog, Member, MemberKind, Param, ParamMode, WellKnown, MOCKED_INTERFACE,
    OBJECT_INTERFACE,
};
pub use observer::MatcherObserver;
pub use types::{NamedType, TypeDesc};
pub use value::{short_id, ArgValue, MockObject, MockRef, ObjectData, ObjectValue, Value};

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Mock instance identifier, UUIDv7 so ids sort by creation time.
pub type MockId = Uuid;

/// Setup identifier, unique within a process.
pub type SetupId = u64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 mock id.
pub fn new_mock_id() -> MockId {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_ids_are_unique() {
        let a = new_mock_id();
        let b = new_mock_id();
        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 7);
    }
}
