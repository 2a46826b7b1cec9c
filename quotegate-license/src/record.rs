//! Persisted subscription types.

use crate::policy::DurationTerm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Normalizes an activation code for storage and comparison.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// A directory user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Admin-assigned id, unique and positive.
    pub id: u32,
    /// Activation code, stored uppercase.
    pub code: String,
    /// Display name, matched exactly after trimming.
    pub name: String,
}

impl User {
    #[must_use]
    pub fn new(id: u32, code: &str, name: &str) -> Self {
        Self {
            id,
            code: normalize_code(code),
            name: name.trim().to_string(),
        }
    }

    /// Returns true if this user matches a trimmed name and a normalized code.
    #[must_use]
    pub fn matches(&self, user_name: &str, code: &str) -> bool {
        self.name.trim() == user_name && normalize_code(&self.code) == code
    }
}

/// Opaque per-device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Older clients write `userName: null` for admin-issued grants.
fn nullable_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The single active grant on this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub code: String,
    /// Empty when the grant was made without a name.
    #[serde(default, deserialize_with = "nullable_name")]
    pub user_name: String,
    #[serde(default)]
    pub user: Option<User>,
    pub device_id: DeviceId,
    pub verified: bool,
    /// When the grant was made.
    #[serde(rename = "timestamp")]
    pub granted_at: DateTime<Utc>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    /// The policy term in force at grant time; `None` for no-expiry grants.
    #[serde(default)]
    pub duration: Option<DurationTerm>,
}

impl SubscriptionRecord {
    /// Returns true if the record has an expiry at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| now >= expiry)
    }

    /// Returns the normalized code.
    #[must_use]
    pub fn normalized_code(&self) -> String {
        normalize_code(&self.code)
    }
}
