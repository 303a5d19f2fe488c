use decoy_engine::{CallExpr, Mock, MockConfig};
use decoy_test_utils::fixtures::{self, members};

/// Route engine events to the test harness output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An `IService` mock with `method(1, "a")` answering `"x"`.
pub fn answering_service(config: MockConfig) -> Mock {
    let mock = fixtures::service(config);
    mock.setup(CallExpr::on_mock(members::method()).arg(1).arg("a"))
        .expect("setup method")
        .returns("x".to_string())
        .expect("returns x");
    mock
}
