//! Directory client: the remote store of users and the duration policy.
//!
//! The validator only ever talks to the directory through
//! [`DirectoryClient`]. Every failure (transport, non-JSON body, HTTP error
//! status, `success: false`) surfaces as
//! [`LicenseError::DirectoryUnavailable`](crate::LicenseError::DirectoryUnavailable).

#[cfg(feature = "online")]
pub mod http;
pub mod memory;

use crate::error::LicenseResult;
use crate::policy::DurationPolicy;
use crate::record::User;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "online")]
pub use http::HttpDirectory;
pub use memory::MemoryDirectory;

/// Connection settings for the HTTP directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the deployment, e.g. `https://quotes.example.com/`.
    pub base_url: String,
    /// Path of the subscription endpoint relative to `base_url`.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
            endpoint: "api/subscription.php".to_string(),
            timeout_secs: 30,
        }
    }
}

impl DirectoryConfig {
    /// Creates a config for `base_url` with default endpoint and timeout.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Returns the full endpoint URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}

/// Remote user and settings store.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Lists all users, ordered by id.
    async fn list_users(&self) -> LicenseResult<Vec<User>>;

    /// Fetches the global duration policy, `None` when none is configured.
    async fn get_duration_policy(&self) -> LicenseResult<Option<DurationPolicy>>;

    /// Inserts a user, or updates the one with the same id.
    async fn add_user(&self, user: &User) -> LicenseResult<()>;

    /// Replaces the user list: ids absent from `users` are deleted.
    async fn sync_users(&self, users: &[User]) -> LicenseResult<()>;

    /// Replaces the global duration policy.
    async fn save_duration_policy(&self, policy: &DurationPolicy) -> LicenseResult<()>;

    /// Deletes a user by id.
    async fn delete_user(&self, id: u32) -> LicenseResult<()>;
}
