//! Unit-test fixtures. Integration tests use `decoy-test-utils` instead.

use crate::dispatch::{Interceptor, Outcome};
use crate::mock::Mock;
use decoy_core::{
    Interface, InterfaceCatalog, Invocation, Member, MockConfig, MockResult, ParamMode, TypeDesc,
    Value,
};
use std::sync::Arc;

pub fn method() -> Arc<Member> {
    Arc::new(
        Member::method("IService", "method")
            .param("a", TypeDesc::Int)
            .param("b", TypeDesc::Str)
            .returns(TypeDesc::Str),
    )
}

pub fn get_nested() -> Arc<Member> {
    Arc::new(Member::method("IService", "get_nested").returns(TypeDesc::interface("INested")))
}

pub fn name_get() -> Arc<Member> {
    Arc::new(Member::getter("IService", "Name", TypeDesc::Str))
}

pub fn name_set() -> Arc<Member> {
    Arc::new(Member::setter("IService", "Name", TypeDesc::Str))
}

pub fn try_parse() -> Arc<Member> {
    Arc::new(
        Member::method("IService", "try_parse")
            .param("input", TypeDesc::Str)
            .param_with_mode("result", TypeDesc::Int, ParamMode::Out)
            .returns(TypeDesc::Bool),
    )
}

pub fn echo() -> Arc<Member> {
    Arc::new(
        Member::method("IService", "echo")
            .generic("T")
            .param("value", TypeDesc::Param("T".to_string()))
            .returns(TypeDesc::Param("T".to_string())),
    )
}

pub fn do_work() -> Arc<Member> {
    Arc::new(Member::method("IService", "do_work"))
}

pub fn pair() -> Arc<Member> {
    Arc::new(
        Member::method("IService", "pair")
            .returns(TypeDesc::Tuple(vec![TypeDesc::Int, TypeDesc::Str])),
    )
}

pub fn items() -> Arc<Member> {
    Arc::new(Member::method("IService", "items").returns(TypeDesc::array(TypeDesc::Int)))
}

pub fn nested_method() -> Arc<Member> {
    Arc::new(Member::method("INested", "nested_method").returns(TypeDesc::Str))
}

pub fn catalog() -> Arc<InterfaceCatalog> {
    let mut service = Interface::new("IService");
    service.members.extend([
        method(),
        get_nested(),
        name_get(),
        name_set(),
        try_parse(),
        echo(),
        do_work(),
        pair(),
        items(),
    ]);
    let mut nested = Interface::new("INested");
    nested.members.push(nested_method());
    Arc::new(InterfaceCatalog::with_interfaces([
        service,
        nested,
        Interface::new("IDisposable"),
    ]))
}

pub fn mock(config: MockConfig) -> Mock {
    Mock::new(catalog(), "IService", config).unwrap()
}

/// Dispatch a call and return the outcome.
pub fn call(mock: &Mock, member: Arc<Member>, args: Vec<Value>) -> MockResult<Outcome> {
    mock.intercept(&mut Invocation::new(member, args))
}

/// Dispatch a call that must answer with a value.
pub fn value(mock: &Mock, member: Arc<Member>, args: Vec<Value>) -> Value {
    match call(mock, member, args) {
        Ok(Outcome::Value(v)) => v,
        other => panic!("expected a value, got {:?}", other),
    }
}
