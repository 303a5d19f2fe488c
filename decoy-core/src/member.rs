//! Member and interface descriptors
//!
//! A mock never sees Rust traits directly. The stand-in that forwards calls
//! describes each member once, and setups, invocations and verification all
//! refer to the same [`Member`] descriptors.

use crate::error::{ConfigError, MockResult};
use crate::types::TypeDesc;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// How an argument is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamMode {
    /// Plain by-value argument
    Value,
    /// Read-only reference
    In,
    /// Read-write reference
    Ref,
    /// Write-only reference, assigned by the callee
    Out,
    /// Trailing variadic array
    Params,
}

impl ParamMode {
    pub fn is_by_ref(&self) -> bool {
        matches!(self, ParamMode::In | ParamMode::Ref | ParamMode::Out)
    }

    fn prefix(&self) -> &'static str {
        match self {
            ParamMode::Value => "",
            ParamMode::In => "in ",
            ParamMode::Ref => "ref ",
            ParamMode::Out => "out ",
            ParamMode::Params => "params ",
        }
    }
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: String,
    pub ty: TypeDesc,
    pub mode: ParamMode,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {}", self.mode.prefix(), self.ty, self.name)
    }
}

/// Whether a member is a method or one side of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Getter,
    Setter,
}

/// Descriptor of one interface member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    /// Declaring interface
    pub interface: String,
    /// Method name, or property name for accessors
    pub name: String,
    pub kind: MemberKind,
    pub params: Vec<Param>,
    pub returns: TypeDesc,
    /// Names of open generic type parameters
    pub generic_params: Vec<String>,
}

impl Member {
    /// Start a method descriptor returning `void`.
    pub fn method(interface: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            name: name.into(),
            kind: MemberKind::Method,
            params: Vec::new(),
            returns: TypeDesc::Unit,
            generic_params: Vec::new(),
        }
    }

    /// Property getter.
    pub fn getter(interface: impl Into<String>, property: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            interface: interface.into(),
            name: property.into(),
            kind: MemberKind::Getter,
            params: Vec::new(),
            returns: ty,
            generic_params: Vec::new(),
        }
    }

    /// Property setter taking a single `value` argument.
    pub fn setter(interface: impl Into<String>, property: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            interface: interface.into(),
            name: property.into(),
            kind: MemberKind::Setter,
            params: vec![Param {
                name: "value".to_string(),
                ty,
                mode: ParamMode::Value,
            }],
            returns: TypeDesc::Unit,
            generic_params: Vec::new(),
        }
    }

    pub fn param(self, name: impl Into<String>, ty: TypeDesc) -> Self {
        self.param_with_mode(name, ty, ParamMode::Value)
    }

    pub fn param_with_mode(mut self, name: impl Into<String>, ty: TypeDesc, mode: ParamMode) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
            mode,
        });
        self
    }

    pub fn returns(mut self, ty: TypeDesc) -> Self {
        self.returns = ty;
        self
    }

    pub fn generic(mut self, name: impl Into<String>) -> Self {
        self.generic_params.push(name.into());
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn is_property(&self) -> bool {
        matches!(self.kind, MemberKind::Getter | MemberKind::Setter)
    }

    pub fn is_void(&self) -> bool {
        self.returns.is_unit()
    }

    /// Whether this member and `other` are the two accessors of one property.
    pub fn same_property(&self, other: &Member) -> bool {
        self.is_property()
            && other.is_property()
            && self.interface == other.interface
            && self.name == other.name
    }

    /// Type of the property this accessor belongs to.
    pub fn property_type(&self) -> Option<&TypeDesc> {
        match self.kind {
            MemberKind::Getter => Some(&self.returns),
            MemberKind::Setter => self.params.first().map(|p| &p.ty),
            MemberKind::Method => None,
        }
    }

    /// Substitute closed type arguments for this member's open parameters.
    /// Unbound parameters close to `object`.
    pub fn closed_type(&self, ty: &TypeDesc, generic_args: &[TypeDesc]) -> TypeDesc {
        match ty {
            TypeDesc::Param(name) => self
                .generic_params
                .iter()
                .position(|p| p == name)
                .and_then(|i| generic_args.get(i))
                .cloned()
                .unwrap_or(TypeDesc::Object),
            TypeDesc::Array(elem) => TypeDesc::array(self.closed_type(elem, generic_args)),
            TypeDesc::Seq(elem) => TypeDesc::seq(self.closed_type(elem, generic_args)),
            TypeDesc::Nullable(inner) => TypeDesc::nullable(self.closed_type(inner, generic_args)),
            TypeDesc::Tuple(items) => TypeDesc::Tuple(
                items
                    .iter()
                    .map(|item| self.closed_type(item, generic_args))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Full signature, e.g. `string IService.method(int a, string b)`.
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let generics = if self.generic_params.is_empty() {
            String::new()
        } else {
            format!("<{}>", self.generic_params.join(", "))
        };
        match self.kind {
            MemberKind::Method => format!(
                "{} {}.{}{}({})",
                self.returns, self.interface, self.name, generics, params
            ),
            MemberKind::Getter => format!("{} {}.{} {{ get; }}", self.returns, self.interface, self.name),
            MemberKind::Setter => format!("{}.{} {{ set; }}", self.interface, self.name),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MemberKind::Method => write!(f, "{}.{}", self.interface, self.name),
            MemberKind::Getter => write!(f, "{}.{} (get)", self.interface, self.name),
            MemberKind::Setter => write!(f, "{}.{} (set)", self.interface, self.name),
        }
    }
}

// ============================================================================
// WELL-KNOWN MEMBERS
// ============================================================================

/// Interface name of the identity members every mock answers to.
pub const OBJECT_INTERFACE: &str = "object";

/// Interface name of the back-reference accessor.
pub const MOCKED_INTERFACE: &str = "IMocked";

static TO_STRING: Lazy<Arc<Member>> =
    Lazy::new(|| Arc::new(Member::method(OBJECT_INTERFACE, "to_string").returns(TypeDesc::Str)));

static EQUALS: Lazy<Arc<Member>> = Lazy::new(|| {
    Arc::new(
        Member::method(OBJECT_INTERFACE, "equals")
            .param("other", TypeDesc::Object)
            .returns(TypeDesc::Bool),
    )
});

static HASH_CODE: Lazy<Arc<Member>> =
    Lazy::new(|| Arc::new(Member::method(OBJECT_INTERFACE, "hash_code").returns(TypeDesc::Int)));

static MOCK_ACCESSOR: Lazy<Arc<Member>> =
    Lazy::new(|| Arc::new(Member::getter(MOCKED_INTERFACE, "Mock", TypeDesc::Object)));

/// Identity members shared by every mock.
pub struct WellKnown;

impl WellKnown {
    pub fn to_string() -> Arc<Member> {
        Arc::clone(&TO_STRING)
    }

    pub fn equals() -> Arc<Member> {
        Arc::clone(&EQUALS)
    }

    pub fn hash_code() -> Arc<Member> {
        Arc::clone(&HASH_CODE)
    }

    /// Getter returning the mock that owns a stand-in.
    pub fn mock_accessor() -> Arc<Member> {
        Arc::clone(&MOCK_ACCESSOR)
    }

    pub fn is_identity_member(member: &Member) -> bool {
        member.interface == OBJECT_INTERFACE
    }

    pub fn is_mock_accessor(member: &Member) -> bool {
        member.interface == MOCKED_INTERFACE && member.kind == MemberKind::Getter
    }
}

// ============================================================================
// INTERFACES
// ============================================================================

/// A mockable interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    pub name: String,
    /// Names of inherited interfaces
    pub bases: Vec<String>,
    pub members: Vec<Arc<Member>>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    /// Add a member declared on this interface.
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(Arc::new(member));
        self
    }

    /// Add a read-write property.
    pub fn with_property(self, name: &str, ty: TypeDesc) -> Self {
        let interface = self.name.clone();
        self.with_member(Member::getter(interface.clone(), name, ty.clone()))
            .with_member(Member::setter(interface, name, ty))
    }

    /// First method with this name.
    pub fn method(&self, name: &str) -> Option<Arc<Member>> {
        self.find(name, MemberKind::Method)
    }

    pub fn getter(&self, property: &str) -> Option<Arc<Member>> {
        self.find(property, MemberKind::Getter)
    }

    pub fn setter(&self, property: &str) -> Option<Arc<Member>> {
        self.find(property, MemberKind::Setter)
    }

    fn find(&self, name: &str, kind: MemberKind) -> Option<Arc<Member>> {
        self.members
            .iter()
            .find(|m| m.name == name && m.kind == kind)
            .cloned()
    }

    /// Getters of properties that also have a setter.
    pub fn read_write_properties(&self) -> Vec<Arc<Member>> {
        self.members
            .iter()
            .filter(|m| m.kind == MemberKind::Getter)
            .filter(|g| self.setter(&g.name).is_some())
            .cloned()
            .collect()
    }
}

/// Registry of interface descriptors, shared by a family of mocks.
///
/// Nested setups use it to create child mocks for a member's return type.
#[derive(Debug, Default)]
pub struct InterfaceCatalog {
    interfaces: RwLock<HashMap<String, Arc<Interface>>>,
}

impl InterfaceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a list of interfaces.
    pub fn with_interfaces(interfaces: impl IntoIterator<Item = Interface>) -> Self {
        let catalog = Self::new();
        for interface in interfaces {
            catalog.register(interface);
        }
        catalog
    }

    /// Register or replace an interface.
    pub fn register(&self, interface: Interface) -> Arc<Interface> {
        let interface = Arc::new(interface);
        let mut map = self.interfaces.write().unwrap_or_else(|e| e.into_inner());
        map.insert(interface.name.clone(), Arc::clone(&interface));
        interface
    }

    pub fn get(&self, name: &str) -> Option<Arc<Interface>> {
        let map = self.interfaces.read().unwrap_or_else(|e| e.into_inner());
        map.get(name).cloned()
    }

    /// Resolve a type to a mockable interface.
    pub fn resolve(&self, ty: &TypeDesc) -> MockResult<Arc<Interface>> {
        match ty {
            TypeDesc::Interface(name) => self.get(name).ok_or_else(|| {
                ConfigError::Unmockable {
                    type_name: name.clone(),
                    reason: "interface is not registered in the catalog".to_string(),
                }
                .into()
            }),
            other => Err(ConfigError::Unmockable {
                type_name: other.to_string(),
                reason: "only interfaces can be mocked".to_string(),
            }
            .into()),
        }
    }

    /// Whether `interface` is `target` or inherits from it, transitively.
    pub fn inherits(&self, interface: &str, target: &str) -> bool {
        let mut pending = vec![interface.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(name) = pending.pop() {
            if name == target {
                return true;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(found) = self.get(&name) {
                pending.extend(found.bases.iter().cloned());
            }
        }
        false
    }
}
