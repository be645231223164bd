//! Owner identity resolution.
//!
//! Authentication itself lives outside this crate; storage and sync only
//! need to know "who is signed in right now, if anyone". Components take an
//! [`OwnerResolver`] at construction so the signed-out case is a typed
//! absence instead of an ambient lookup.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Identity that scopes every entity row, locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Source of the current owner identity.
pub trait OwnerResolver: Send + Sync {
    /// The currently signed-in owner, or `None` when signed out.
    fn current_owner(&self) -> Option<OwnerId>;
}

/// Fixed owner, used by the CLI and in tests.
#[derive(Debug, Clone)]
pub struct StaticOwner(OwnerId);

impl StaticOwner {
    pub fn new(id: impl Into<String>) -> Self {
        Self(OwnerId::new(id))
    }
}

impl OwnerResolver for StaticOwner {
    fn current_owner(&self) -> Option<OwnerId> {
        Some(self.0.clone())
    }
}

/// Settable owner slot for hosts where sign-in state changes at runtime.
///
/// Clones share the slot, so one handle can be given to the store and sync
/// engine while the auth layer keeps another to update on sign-in/out.
#[derive(Debug, Clone, Default)]
pub struct OwnerHandle {
    inner: Arc<RwLock<Option<OwnerId>>>,
}

impl OwnerHandle {
    /// New handle in the signed-out state.
    pub fn new() -> Self {
        Self::default()
    }

    /// New handle already signed in as `owner`.
    pub fn signed_in(owner: OwnerId) -> Self {
        let handle = Self::new();
        handle.set_owner(owner);
        handle
    }

    pub fn set_owner(&self, owner: OwnerId) {
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(owner);
    }

    pub fn clear(&self) {
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl OwnerResolver for OwnerHandle {
    fn current_owner(&self) -> Option<OwnerId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_owner_always_resolves() {
        let owner = StaticOwner::new("user-1");
        assert_eq!(owner.current_owner(), Some(OwnerId::new("user-1")));
    }

    #[test]
    fn owner_handle_starts_signed_out() {
        let handle = OwnerHandle::new();
        assert_eq!(handle.current_owner(), None);
    }

    #[test]
    fn owner_handle_clones_share_state() {
        let handle = OwnerHandle::new();
        let other = handle.clone();

        handle.set_owner(OwnerId::new("user-1"));
        assert_eq!(other.current_owner(), Some(OwnerId::new("user-1")));

        other.clear();
        assert_eq!(handle.current_owner(), None);
    }

    #[test]
    fn owner_id_serializes_as_plain_string() {
        let owner = OwnerId::new("user-1");
        let json = serde_json::to_string(&owner).unwrap();
        assert_eq!(json, "\"user-1\"");
    }
}
