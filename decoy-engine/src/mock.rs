//! Mock instances
//!
//! A [`Mock`] is a cheap handle to shared per-instance state: the mocked
//! interface, the setup registry and the invocation log. Stand-ins forward
//! calls to it through [`crate::Interceptor`]; tests configure it through
//! the `setup*` entry points and check it with the `verify*` family.

use crate::builder::SetupBuilder;
use crate::defaults::{DefaultValueProvider, PolicyDefaults};
use crate::log::InvocationLog;
use crate::registry::SetupRegistry;
use crate::setup::{require_property, Condition, Setup, SetupKey};
use decoy_core::{
    new_mock_id, short_id, CallExpr, ConfigError, Expectation, Interface, InterfaceCatalog,
    Invocation, Member, MemberKind, MockConfig, MockError, MockId, MockObject, MockRef,
    MockResult, TypeDesc, Value, MOCKED_INTERFACE, OBJECT_INTERFACE,
};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

/// Shared state behind a [`Mock`] handle.
pub struct MockInner {
    id: MockId,
    interface: Arc<Interface>,
    extra_interfaces: RwLock<Vec<String>>,
    catalog: Arc<InterfaceCatalog>,
    config: MockConfig,
    defaults: Arc<dyn DefaultValueProvider>,
    pub(crate) setups: SetupRegistry,
    pub(crate) log: InvocationLog,
    /// Child mocks handed out as default values, by member signature
    default_children: Mutex<HashMap<String, Mock>>,
}

impl MockInner {
    fn covers(&self, name: &str) -> bool {
        self.interface.name == name || self.catalog.inherits(&self.interface.name, name)
    }
}

impl MockObject for MockInner {
    fn mock_id(&self) -> MockId {
        self.id
    }

    fn interface_name(&self) -> &str {
        &self.interface.name
    }

    fn implements(&self, interface: &str) -> bool {
        if interface == OBJECT_INTERFACE || interface == MOCKED_INTERFACE || self.covers(interface) {
            return true;
        }
        let extras = self
            .extra_interfaces
            .read()
            .unwrap_or_else(|e| e.into_inner());
        extras
            .iter()
            .any(|extra| extra == interface || self.catalog.inherits(extra, interface))
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Handle to a mock instance.
#[derive(Clone)]
pub struct Mock {
    inner: Arc<MockInner>,
}

impl Mock {
    /// Mock the catalog interface `interface` with the policy defaults from
    /// `config`.
    pub fn new(
        catalog: Arc<InterfaceCatalog>,
        interface: &str,
        config: MockConfig,
    ) -> MockResult<Self> {
        let defaults = Arc::new(PolicyDefaults::new(config.default_values));
        Self::with_defaults(catalog, interface, config, defaults)
    }

    /// Mock with a custom default-value provider.
    pub fn with_defaults(
        catalog: Arc<InterfaceCatalog>,
        interface: &str,
        config: MockConfig,
        defaults: Arc<dyn DefaultValueProvider>,
    ) -> MockResult<Self> {
        config.validate()?;
        let interface = catalog.resolve(&TypeDesc::interface(interface))?;
        let mock = Self::build(catalog, interface, config, defaults);
        tracing::debug!(mock = %mock, "mock created");
        Ok(mock)
    }

    fn build(
        catalog: Arc<InterfaceCatalog>,
        interface: Arc<Interface>,
        config: MockConfig,
        defaults: Arc<dyn DefaultValueProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(MockInner {
                id: new_mock_id(),
                interface,
                extra_interfaces: RwLock::new(Vec::new()),
                catalog,
                config,
                defaults,
                setups: SetupRegistry::new(),
                log: InvocationLog::new(),
                default_children: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Child mock sharing this mock's behavior, catalog and defaults.
    fn child(&self, interface: Arc<Interface>) -> Mock {
        let config = MockConfig {
            name: None,
            ..self.inner.config.clone()
        };
        Self::build(
            Arc::clone(&self.inner.catalog),
            interface,
            config,
            Arc::clone(&self.inner.defaults),
        )
    }

    /// Recover the mock behind a value-level handle.
    pub fn from_handle(handle: &MockRef) -> Option<Mock> {
        handle.downcast::<MockInner>().map(|inner| Mock { inner })
    }

    /// Value-level handle to this mock.
    pub fn handle(&self) -> MockRef {
        MockRef::new(Arc::clone(&self.inner) as Arc<dyn MockObject>)
    }

    pub fn id(&self) -> MockId {
        self.inner.id
    }

    pub fn interface(&self) -> &Arc<Interface> {
        &self.inner.interface
    }

    pub fn config(&self) -> &MockConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Arc<InterfaceCatalog> {
        &self.inner.catalog
    }

    pub fn is_strict(&self) -> bool {
        self.inner.config.is_strict()
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> String {
        match &self.inner.config.name {
            Some(name) => name.clone(),
            None => format!(
                "Mock<{}:{}>",
                self.inner.interface.name,
                short_id(self.inner.id)
            ),
        }
    }

    pub(crate) fn registry(&self) -> &SetupRegistry {
        &self.inner.setups
    }

    pub(crate) fn log(&self) -> &InvocationLog {
        &self.inner.log
    }

    // ========================================================================
    // INTERFACES
    // ========================================================================

    /// Make the instance also answer to `interface`.
    pub fn add_interface(&self, interface: &str) -> MockResult<()> {
        let resolved = self.inner.catalog.resolve(&TypeDesc::interface(interface))?;
        let mut extras = self
            .inner
            .extra_interfaces
            .write()
            .map_err(|_| MockError::lock_poisoned("extra interfaces"))?;
        if !extras.contains(&resolved.name) {
            extras.push(resolved.name.clone());
        }
        Ok(())
    }

    /// Whether this instance can stand in for `interface`.
    pub fn implements(&self, interface: &str) -> bool {
        self.inner.implements(interface)
    }

    /// The mocked interface, its bases and any added interfaces.
    fn covered_interfaces(&self) -> MockResult<Vec<String>> {
        let mut names = vec![self.inner.interface.name.clone()];
        names.extend(
            self.inner
                .extra_interfaces
                .read()
                .map_err(|_| MockError::lock_poisoned("extra interfaces"))?
                .iter()
                .cloned(),
        );
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        while let Some(name) = names.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(found) = self.inner.catalog.get(&name) {
                names.extend(found.bases.iter().cloned());
            }
            ordered.push(name);
        }
        // Primary interface first.
        ordered.sort_by_key(|name| *name != self.inner.interface.name);
        Ok(ordered)
    }

    // ========================================================================
    // SETUP
    // ========================================================================

    /// Configure a call, possibly a chain such as `mock.a().b()`.
    pub fn setup(&self, call: CallExpr) -> MockResult<SetupBuilder> {
        self.register(call, None, None)
    }

    /// Configure a property getter.
    pub fn setup_get(&self, call: CallExpr) -> MockResult<SetupBuilder> {
        self.register(call, None, Some(MemberKind::Getter))
    }

    /// Configure a property setter.
    pub fn setup_set(&self, call: CallExpr) -> MockResult<SetupBuilder> {
        self.register(call, None, Some(MemberKind::Setter))
    }

    /// Give a property stored-value semantics, starting at `initial`.
    pub fn setup_property(&self, getter: CallExpr, initial: impl Into<Value>) -> MockResult<()> {
        let initial = initial.into();
        let (path, last) = Self::split(&getter)?;
        let expectation = Expectation::from_call(&last)?;
        require_property(&expectation, MemberKind::Getter)?;
        let property_type = expectation.member().returns.clone();
        if !matches!(property_type, TypeDesc::Param(_)) && !property_type.accepts(&initial) {
            return Err(ConfigError::ReturnTypeMismatch {
                member: expectation.member().to_string(),
                expected: property_type.to_string(),
                actual: initial
                    .type_desc()
                    .map_or_else(|| "null".to_string(), |t| t.to_string()),
            }
            .into());
        }
        let target = self.descend(&path)?;
        let setup = Arc::new(Setup::property(expectation, initial));
        target.inner.setups.add(Arc::clone(&setup))?;
        tracing::debug!(mock = %target, setup = %setup, "property stubbed");
        Ok(())
    }

    /// Give every property of the mocked interfaces stored-value semantics.
    pub fn setup_all_properties(&self) -> MockResult<()> {
        let setup = Arc::new(Setup::all_properties(self.covered_interfaces()?));
        self.inner.setups.add(Arc::clone(&setup))?;
        tracing::debug!(mock = %self, setup = %setup, "all properties stubbed");
        Ok(())
    }

    /// Setups registered through the returned handle only match while
    /// `condition` holds.
    pub fn when<F>(&self, condition: F) -> ConditionalSetup<'_>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        ConditionalSetup {
            mock: self,
            origin: TypeId::of::<F>(),
            condition: Arc::new(condition),
        }
    }

    fn split(call: &CallExpr) -> MockResult<(Vec<CallExpr>, CallExpr)> {
        let mut segments = call.segments()?;
        match segments.pop() {
            Some(last) => Ok((segments, last)),
            None => Err(ConfigError::UnsupportedExpression {
                expression: call.to_string(),
                reason: "call description has no member access".to_string(),
            }
            .into()),
        }
    }

    fn register(
        &self,
        call: CallExpr,
        condition: Option<(TypeId, Condition)>,
        accessor: Option<MemberKind>,
    ) -> MockResult<SetupBuilder> {
        let (path, last) = Self::split(&call)?;
        let expectation = Expectation::from_call(&last)?;
        if let Some(kind) = accessor {
            require_property(&expectation, kind)?;
        }
        let target = self.descend(&path)?;
        let member = Arc::clone(expectation.member());
        let setup = Arc::new(Setup::call(expectation, condition));
        target.inner.setups.add(Arc::clone(&setup))?;
        tracing::debug!(mock = %target, setup = %setup, "setup registered");
        Ok(SetupBuilder::new(target, member, setup))
    }

    /// Walk the leading segments of a chain, creating or reusing a nested
    /// setup for each, and return the mock that receives the last segment.
    fn descend(&self, path: &[CallExpr]) -> MockResult<Mock> {
        let expectations = path
            .iter()
            .map(Expectation::from_call)
            .collect::<MockResult<Vec<_>>>()?;
        let interfaces = expectations
            .iter()
            .map(|e| self.inner.catalog.resolve(&e.member().returns))
            .collect::<MockResult<Vec<_>>>()?;

        let mut current = self.clone();
        for (expectation, interface) in expectations.into_iter().zip(interfaces) {
            current = current.nested_child(expectation, interface)?;
        }
        Ok(current)
    }

    fn nested_child(&self, expectation: Expectation, interface: Arc<Interface>) -> MockResult<Mock> {
        let key = SetupKey::Call {
            shape: expectation.shape().clone(),
            condition: None,
        };
        let existing = self
            .inner
            .setups
            .find_last(|s| s.key() == &key && s.child().is_some())?;
        if let Some(child) = existing.as_ref().and_then(|s| s.child()) {
            return Ok(child.clone());
        }
        let child = self.child(interface);
        let setup = Arc::new(Setup::nested(expectation, child.clone()));
        self.inner.setups.add(Arc::clone(&setup))?;
        tracing::debug!(mock = %self, setup = %setup, child = %child, "nested setup registered");
        Ok(child)
    }

    // ========================================================================
    // STATE
    // ========================================================================

    /// Logged invocations, in call order.
    pub fn invocations(&self) -> MockResult<Vec<Arc<Invocation>>> {
        self.inner.log.snapshot()
    }

    /// Registered setups, overridden ones included.
    pub fn setups(&self) -> MockResult<Vec<Arc<Setup>>> {
        self.inner.setups.snapshot()
    }

    /// Drop every setup and logged invocation.
    pub fn reset(&self) -> MockResult<()> {
        self.inner.setups.clear()?;
        self.inner.log.clear()?;
        self.inner
            .default_children
            .lock()
            .map_err(|_| MockError::lock_poisoned("default children"))?
            .clear();
        Ok(())
    }

    /// Forget logged invocations but keep setups.
    pub fn clear_invocations(&self) -> MockResult<()> {
        self.inner.log.clear()
    }

    // ========================================================================
    // DEFAULTS
    // ========================================================================

    /// Child mock answering `member` when defaults are mocks. The same
    /// child is returned for every call of the member.
    pub fn default_child(&self, member: &Member, ty: &TypeDesc) -> MockResult<Mock> {
        let interface = self.inner.catalog.resolve(ty)?;
        let mut children = self
            .inner
            .default_children
            .lock()
            .map_err(|_| MockError::lock_poisoned("default children"))?;
        let child = children
            .entry(member.signature())
            .or_insert_with(|| self.child(interface))
            .clone();
        Ok(child)
    }

    /// Default value for `ty` from this mock's provider.
    pub fn default_for(&self, member: &Member, ty: &TypeDesc) -> Value {
        self.inner.defaults.default_value(ty, member, self)
    }
}

impl PartialEq for Mock {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for Mock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for Mock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mock")
            .field("name", &self.name())
            .field("setups", &self.inner.setups.len())
            .field("invocations", &self.inner.log.len())
            .finish()
    }
}

/// Entry points for setups gated by a condition.
pub struct ConditionalSetup<'a> {
    mock: &'a Mock,
    origin: TypeId,
    condition: Condition,
}

impl ConditionalSetup<'_> {
    fn gate(&self) -> Option<(TypeId, Condition)> {
        Some((self.origin, Arc::clone(&self.condition)))
    }

    pub fn setup(&self, call: CallExpr) -> MockResult<SetupBuilder> {
        self.mock.register(call, self.gate(), None)
    }

    pub fn setup_get(&self, call: CallExpr) -> MockResult<SetupBuilder> {
        self.mock.register(call, self.gate(), Some(MemberKind::Getter))
    }

    pub fn setup_set(&self, call: CallExpr) -> MockResult<SetupBuilder> {
        self.mock.register(call, self.gate(), Some(MemberKind::Setter))
    }
}
