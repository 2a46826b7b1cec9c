//! HTTP directory speaking the subscription endpoint's action protocol.
//!
//! Requests are `?action=<name>` against a single endpoint, and every
//! response is a `{success, data?, error?}` envelope.

use super::{DirectoryClient, DirectoryConfig};
use crate::error::{LicenseError, LicenseResult};
use crate::policy::{DurationPolicy, DurationTerm};
use crate::record::User;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// Settings payload: `duration` is null for "no expiry".
#[derive(Debug, Serialize, Deserialize)]
struct SettingsWire {
    #[serde(default)]
    duration: Option<DurationTerm>,
}

#[derive(Debug, Serialize)]
struct AddUserWire<'a> {
    user_id: u32,
    name: &'a str,
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct SyncUsersWire<'a> {
    users: &'a [User],
}

/// Directory client over HTTP.
pub struct HttpDirectory {
    config: DirectoryConfig,
    client: Client,
    url: String,
}

impl HttpDirectory {
    /// Creates a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` if the HTTP client cannot be built.
    pub fn new(config: DirectoryConfig) -> LicenseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LicenseError::DirectoryUnavailable(format!("http client: {e}")))?;
        let url = config.endpoint_url();
        Ok(Self {
            config,
            client,
            url,
        })
    }

    /// Returns the configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn action(&self, method: reqwest::Method, action: &str) -> RequestBuilder {
        self.client
            .request(method, &self.url)
            .query(&[("action", action)])
    }

    async fn send<T: DeserializeOwned>(
        &self,
        action: &str,
        request: RequestBuilder,
    ) -> LicenseResult<Option<T>> {
        let response = request.send().await.map_err(|e| {
            warn!(action, error = %e, "directory request failed");
            LicenseError::DirectoryUnavailable(e.to_string())
        })?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            warn!(action, %status, "directory returned a non-JSON response");
            return Err(LicenseError::DirectoryUnavailable(format!(
                "{action}: server did not return JSON (HTTP {status})"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LicenseError::DirectoryUnavailable(e.to_string()))?;
        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            LicenseError::DirectoryUnavailable(format!("{action}: malformed response: {e}"))
        })?;

        if !status.is_success() || !envelope.success {
            let message = envelope
                .error
                .unwrap_or_else(|| format!("HTTP {status}"));
            warn!(action, %status, %message, "directory rejected request");
            return Err(LicenseError::DirectoryUnavailable(format!("{action}: {message}")));
        }

        debug!(action, "directory request succeeded");
        Ok(envelope.data)
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectory {
    async fn list_users(&self) -> LicenseResult<Vec<User>> {
        let request = self.action(reqwest::Method::GET, "users");
        let users: Option<Vec<User>> = self.send("users", request).await?;
        Ok(users.unwrap_or_default())
    }

    async fn get_duration_policy(&self) -> LicenseResult<Option<DurationPolicy>> {
        let request = self.action(reqwest::Method::GET, "settings");
        let settings: Option<SettingsWire> = self.send("settings", request).await?;
        Ok(settings.map(|s| DurationPolicy::from_term(s.duration)))
    }

    async fn add_user(&self, user: &User) -> LicenseResult<()> {
        let request = self
            .action(reqwest::Method::POST, "add_user")
            .json(&AddUserWire {
                user_id: user.id,
                name: &user.name,
                code: &user.code,
            });
        self.send::<IgnoredAny>("add_user", request).await?;
        Ok(())
    }

    async fn sync_users(&self, users: &[User]) -> LicenseResult<()> {
        let request = self
            .action(reqwest::Method::POST, "sync_users")
            .json(&SyncUsersWire { users });
        self.send::<IgnoredAny>("sync_users", request).await?;
        Ok(())
    }

    async fn save_duration_policy(&self, policy: &DurationPolicy) -> LicenseResult<()> {
        let request = self
            .action(reqwest::Method::POST, "save_settings")
            .json(&SettingsWire {
                duration: policy.term(),
            });
        self.send::<IgnoredAny>("save_settings", request).await?;
        Ok(())
    }

    async fn delete_user(&self, id: u32) -> LicenseResult<()> {
        let request = self
            .action(reqwest::Method::DELETE, "delete_user")
            .query(&[("user_id", id)]);
        self.send::<IgnoredAny>("delete_user", request).await?;
        Ok(())
    }
}
