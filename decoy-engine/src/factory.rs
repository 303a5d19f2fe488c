//! Mock factory
//!
//! Creates mocks with shared defaults and verifies all of them at once.

use crate::defaults::DefaultValueProvider;
use crate::mock::Mock;
use crate::verify::{into_result, Sweep};
use decoy_core::{InterfaceCatalog, MockConfig, MockError, MockResult};
use std::sync::{Arc, Mutex};

/// Creates mocks from one catalog and configuration, and remembers them.
pub struct MockFactory {
    catalog: Arc<InterfaceCatalog>,
    config: MockConfig,
    /// Custom provider shared by every created mock
    defaults: Option<Arc<dyn DefaultValueProvider>>,
    mocks: Mutex<Vec<Mock>>,
}

impl MockFactory {
    pub fn new(catalog: Arc<InterfaceCatalog>, config: MockConfig) -> MockResult<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            config,
            defaults: None,
            mocks: Mutex::new(Vec::new()),
        })
    }

    /// Share a custom default-value provider across every created mock.
    /// The provider then takes precedence over each mock's
    /// `default_values` policy.
    pub fn with_defaults(mut self, defaults: Arc<dyn DefaultValueProvider>) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Mock `interface` with the factory configuration.
    pub fn create(&self, interface: &str) -> MockResult<Mock> {
        self.create_with(interface, self.config.clone())
    }

    /// Mock `interface` with its own configuration. Without a custom
    /// provider, defaults follow `config.default_values`.
    pub fn create_with(&self, interface: &str, config: MockConfig) -> MockResult<Mock> {
        let catalog = Arc::clone(&self.catalog);
        let mock = match &self.defaults {
            Some(defaults) => Mock::with_defaults(catalog, interface, config, Arc::clone(defaults))?,
            None => Mock::new(catalog, interface, config)?,
        };
        self.mocks
            .lock()
            .map_err(|_| MockError::lock_poisoned("factory mocks"))?
            .push(mock.clone());
        Ok(mock)
    }

    /// Every mock created so far.
    pub fn mocks(&self) -> MockResult<Vec<Mock>> {
        Ok(self
            .mocks
            .lock()
            .map_err(|_| MockError::lock_poisoned("factory mocks"))?
            .clone())
    }

    pub fn verify(&self) -> MockResult<()> {
        self.collect(|mock| mock.sweep_failures(Sweep::Expected))
    }

    pub fn verify_all(&self) -> MockResult<()> {
        self.collect(|mock| mock.sweep_failures(Sweep::All))
    }

    pub fn verify_no_other_calls(&self) -> MockResult<()> {
        self.collect(Mock::unverified_failures)
    }

    fn collect<F>(&self, check: F) -> MockResult<()>
    where
        F: Fn(&Mock) -> MockResult<Vec<MockError>>,
    {
        let mut failures = Vec::new();
        for mock in self.mocks()? {
            failures.extend(check(&mock)?);
        }
        into_result(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::PolicyDefaults;
    use crate::test_support::{catalog, do_work, method, value};
    use decoy_core::{
        CallExpr, DefaultValuePolicy, MockErrorReason, StringDefault, TypeDesc, Value, VerifyError,
    };

    #[test]
    fn test_create_uses_factory_config() {
        let factory = MockFactory::new(catalog(), MockConfig::strict()).unwrap();
        let mock = factory.create("IService").unwrap();
        assert!(mock.is_strict());
        let loose = factory.create_with("INested", MockConfig::loose()).unwrap();
        assert!(!loose.is_strict());
        assert_eq!(factory.mocks().unwrap().len(), 2);
        assert!(factory.create("IMissing").is_err());
    }

    #[test]
    fn test_verify_aggregates_across_mocks() {
        let factory = MockFactory::new(catalog(), MockConfig::loose()).unwrap();
        let a = factory.create("IService").unwrap();
        let b = factory.create("IService").unwrap();
        a.setup(CallExpr::on_mock(do_work())).unwrap().verifiable();
        b.setup(CallExpr::on_mock(do_work())).unwrap().verifiable();

        let err = factory.verify().unwrap_err();
        assert!(matches!(
            err,
            MockError::Verify(VerifyError::Aggregate { ref failures }) if failures.len() == 2
        ));

        value(&a, do_work(), vec![]);
        let err = factory.verify().unwrap_err();
        assert_eq!(err.reason(), MockErrorReason::UnmatchedSetup);
        assert!(err.to_string().contains(&b.name()));

        value(&b, do_work(), vec![]);
        factory.verify().unwrap();
        factory.verify_all().unwrap();
        factory.verify_no_other_calls().unwrap();
    }

    #[test]
    fn test_create_with_honors_default_values() {
        let factory = MockFactory::new(catalog(), MockConfig::loose()).unwrap();
        let plain = factory.create("IService").unwrap();
        let config = MockConfig::loose().with_default_values(DefaultValuePolicy {
            strings: StringDefault::Empty,
            ..DefaultValuePolicy::default()
        });
        let empty = factory.create_with("IService", config).unwrap();

        let args = vec![Value::Int(1), Value::str("a")];
        assert_eq!(value(&plain, method(), args.clone()), Value::Null);
        assert_eq!(value(&empty, method(), args), Value::str(""));
    }

    #[test]
    fn test_custom_defaults_are_shared() {
        let provider =
            PolicyDefaults::new(DefaultValuePolicy::default()).with_override(TypeDesc::Str, "n/a");
        let factory = MockFactory::new(catalog(), MockConfig::loose())
            .unwrap()
            .with_defaults(Arc::new(provider));
        let config = MockConfig::loose().with_default_values(DefaultValuePolicy::mock());
        let mock = factory.create_with("IService", config).unwrap();
        let args = vec![Value::Int(1), Value::str("a")];
        assert_eq!(value(&mock, method(), args), Value::str("n/a"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = MockConfig::loose().with_name("  ");
        assert!(MockFactory::new(catalog(), config).is_err());
    }
}
