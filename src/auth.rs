//! Operation-level authorization hook. Schemas name the operations that need
//! an authenticated caller; the authorizer decides whether this caller holds
//! the operation's capability.

use crate::resolver::ResourceHandle;

/// The engine's operations, named as schemas reference them in
/// `authenticated_operations`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List,
    Show,
    Create,
    Update,
    Patch,
    Delete,
    Trashed,
    Restore,
    Purge,
    Export,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Show => "show",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Patch => "patch",
            Operation::Delete => "delete",
            Operation::Trashed => "trashed",
            Operation::Restore => "restore",
            Operation::Purge => "purge",
            Operation::Export => "export",
        }
    }

    /// Capability checked by the authorizer. Coarser than the operation set:
    /// patch shares Update, and everything trash-related shares Delete.
    pub fn capability(&self) -> Capability {
        match self {
            Operation::List => Capability::ViewAny,
            Operation::Show => Capability::View,
            Operation::Create => Capability::Create,
            Operation::Update | Operation::Patch => Capability::Update,
            Operation::Delete | Operation::Trashed | Operation::Purge => Capability::Delete,
            Operation::Restore => Capability::Restore,
            Operation::Export => Capability::Export,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    ViewAny,
    View,
    Create,
    Update,
    Delete,
    Restore,
    Export,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewAny => "viewAny",
            Capability::View => "view",
            Capability::Create => "create",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::Restore => "restore",
            Capability::Export => "export",
        }
    }
}

/// Decides whether a caller holds a capability on a resource. Consulted only
/// for operations the schema lists as authenticated.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, capability: Capability, handle: &ResourceHandle, bearer: Option<&str>) -> bool;
}

/// Permits everything. The default for deployments that front the service with
/// their own gateway.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _capability: Capability, _handle: &ResourceHandle, _bearer: Option<&str>) -> bool {
        true
    }
}

/// Static bearer-token check.
pub struct StaticTokenAuthorizer {
    token: String,
}

impl StaticTokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenAuthorizer { token: token.into() }
    }
}

impl Authorizer for StaticTokenAuthorizer {
    fn authorize(&self, _capability: Capability, _handle: &ResourceHandle, bearer: Option<&str>) -> bool {
        bearer == Some(self.token.as_str())
    }
}
