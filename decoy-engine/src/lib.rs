//! decoy Engine - Setups, Dispatch and Verification
//!
//! Runtime side of a mock. Stand-ins forward every intercepted call here:
//!
//! ```text
//! stand-in call
//!     ↓
//! Invocation (member + dynamic args)
//!     ↓
//! Mock::intercept ── mock accessor / identity members
//!     ↓
//! SetupRegistry::find_last (newest matching, non-overridden)
//!     ↓
//! Setup::execute (behavior chain, property store, nested child)
//!     ↓
//! InvocationLog ← every dispatched call
//!     ↓
//! verify / verify_all / verify_received / verify_no_other_calls
//! ```

pub mod behavior;
pub mod builder;
pub mod defaults;
pub mod dispatch;
pub mod factory;
pub mod log;
pub mod mock;
pub mod registry;
pub mod setup;
pub mod verify;

#[cfg(test)]
mod test_support;

pub use behavior::{BehaviorChain, Delay, Execution, Planned, Step, UserError};
pub use builder::SetupBuilder;
pub use defaults::{DefaultValueProvider, PolicyDefaults};
pub use dispatch::{Interceptor, Outcome};
pub use factory::MockFactory;
pub use log::InvocationLog;
pub use mock::{ConditionalSetup, Mock, MockInner};
pub use registry::SetupRegistry;
pub use setup::{Condition, Resolution, Setup, SetupFlags, SetupKey, SetupKind};

// Re-export the call description vocabulary so most users need one import
pub use decoy_core::{
    arg, CallCount, CallExpr, ConfigError, DispatchError, Expr, Interface, InterfaceCatalog,
    Invocation, Member, MockBehavior, MockConfig, MockError, MockErrorReason, MockResult,
    TypeDesc, Value, VerifyError,
};
