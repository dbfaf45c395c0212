//! Service instance identity.
//!
//! An [`Identity`] addresses one service instance: the service name, the user
//! the instance runs on behalf of, and an instance qualifier that lets a single
//! user run several copies of the same service side by side.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SwitchboardError, SwitchboardResult};

/// Service name of the broker itself.
pub const BROKER_NAME: &str = "switchboard";

/// Service name of the catalog.
pub const CATALOG_NAME: &str = "catalog";

/// Sentinel user id: "run as whoever is connecting".
pub const INHERIT_USER_ID: &str = "inherit";

/// Sentinel user id for the root (system) user.
pub const ROOT_USER_ID: &str = "root";

/// The concrete GUID the root sentinel resolves to.
pub const ROOT_USER_GUID: &str = "505c0ee9-3013-43c0-82b0-a84f50cf8d84";

/// Address of a service instance.
///
/// Equality and ordering are lexicographic over `(name, user_id, instance)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    name: String,
    user_id: String,
    #[serde(default)]
    instance: String,
}

impl Identity {
    /// Create an identity with the default instance qualifier.
    #[must_use]
    pub fn new(name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::with_instance(name, user_id, "")
    }

    /// Create an identity with an explicit instance qualifier.
    #[must_use]
    pub fn with_instance(
        name: impl Into<String>,
        user_id: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            user_id: user_id.into(),
            instance: instance.into(),
        }
    }

    /// The identity of the broker's own instance.
    #[must_use]
    pub fn broker() -> Self {
        Self::with_instance(BROKER_NAME, ROOT_USER_GUID, BROKER_NAME)
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// User id (GUID or sentinel).
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Instance qualifier. Empty means "the default instance".
    #[must_use]
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Replace the user id.
    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
    }

    /// Replace the instance qualifier.
    pub fn set_instance(&mut self, instance: impl Into<String>) {
        self.instance = instance.into();
    }

    /// Whether this identity names the default instance of its service.
    #[must_use]
    pub fn has_default_instance(&self) -> bool {
        self.instance.is_empty() || self.instance == self.name
    }

    /// Whether `other` addresses the same `(name, instance)` pair, ignoring
    /// the user id.
    #[must_use]
    pub fn same_service_instance(&self, other: &Self) -> bool {
        self.name == other.name && self.instance == other.instance
    }

    /// Check that the identity can be used as a registry key once its
    /// sentinels are resolved.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchboardError::EmptyName`] or
    /// [`SwitchboardError::InvalidUserId`].
    pub fn validate(&self) -> SwitchboardResult<()> {
        if self.name.is_empty() {
            return Err(SwitchboardError::EmptyName);
        }
        if !is_valid_user_id(&self.user_id) {
            return Err(SwitchboardError::InvalidUserId {
                user_id: self.user_id.clone(),
            });
        }
        Ok(())
    }

    /// Canonical registry form: the root sentinel becomes its GUID, GUIDs
    /// are lower-cased and an empty instance qualifier becomes the name.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.user_id == ROOT_USER_ID {
            ROOT_USER_GUID.clone_into(&mut self.user_id);
        } else if let Ok(uuid) = Uuid::parse_str(&self.user_id) {
            self.user_id = uuid.hyphenated().to_string();
        }
        if self.instance.is_empty() {
            self.instance.clone_from(&self.name);
        }
        self
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance.is_empty() {
            write!(f, "{}@{}", self.name, self.user_id)
        } else {
            write!(f, "{}/{}@{}", self.name, self.instance, self.user_id)
        }
    }
}

/// Whether `user_id` is a GUID or the root sentinel.
///
/// The inherit sentinel is *not* valid here: it must be resolved against a
/// caller first.
#[must_use]
pub fn is_valid_user_id(user_id: &str) -> bool {
    user_id == ROOT_USER_ID || Uuid::parse_str(user_id).is_ok()
}

/// Generate a fresh synthetic user id.
#[must_use]
pub fn generate_user_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Replace an inherit sentinel with the caller's user id and validate the
/// result.
///
/// # Errors
///
/// Returns an error if the target has no name or the resulting user id is
/// not a GUID.
pub fn resolve_user_id(identity: &Identity, caller_user_id: &str) -> SwitchboardResult<Identity> {
    let mut resolved = identity.clone();
    if resolved.user_id == INHERIT_USER_ID {
        resolved.set_user_id(caller_user_id);
    }
    resolved.validate()?;
    Ok(resolved.normalized())
}
