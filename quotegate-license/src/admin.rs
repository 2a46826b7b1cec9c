//! Administrator operations: inspect and repair local state, and manage the
//! directory's users and duration policy.

use crate::error::{LicenseError, LicenseResult};
use crate::policy::DurationPolicy;
use crate::record::{normalize_code, DeviceId, SubscriptionRecord, User};
use crate::validator::{Grant, LicenseValidator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Time left on the active subscription, as shown to an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TimeLeft {
    NoExpiry,
    Expired,
    Remaining { days: i64, hours: i64, minutes: i64 },
}

impl TimeLeft {
    fn between(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(expiry) = expiry else {
            return Self::NoExpiry;
        };
        let left = expiry - now;
        if left.num_milliseconds() <= 0 {
            return Self::Expired;
        }
        Self::Remaining {
            days: left.num_days(),
            hours: left.num_hours() % 24,
            minutes: left.num_minutes() % 60,
        }
    }
}

/// Snapshot of local licensing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStatus {
    pub device_id: DeviceId,
    pub record: Option<SubscriptionRecord>,
    /// Whether the active record's code is on the disabled list.
    pub code_disabled: bool,
    /// `None` without an active record.
    pub time_left: Option<TimeLeft>,
    pub disabled_codes: Vec<String>,
}

/// A user to add to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewUser {
    pub id: u32,
    pub code: String,
    /// Defaults to `User {id}` when empty.
    pub name: Option<String>,
}

/// Administrator console over a validator and its directory.
#[derive(Clone)]
pub struct AdminConsole {
    validator: Arc<LicenseValidator>,
}

impl AdminConsole {
    pub fn new(validator: Arc<LicenseValidator>) -> Self {
        Self { validator }
    }

    /// Reports the local state at `now`.
    pub fn status(&self, now: DateTime<Utc>) -> LicenseResult<AdminStatus> {
        let registry = self.validator.registry();
        let record = registry.record()?;
        let code_disabled = match &record {
            Some(record) => registry.is_disabled(&record.code)?,
            None => false,
        };
        Ok(AdminStatus {
            device_id: self.validator.device_id(),
            time_left: record.as_ref().map(|r| TimeLeft::between(r.expiry, now)),
            code_disabled,
            record,
            disabled_codes: registry.disabled_codes()?,
        })
    }

    /// Removes `code` from the disabled list.
    pub fn re_enable(&self, code: &str) -> LicenseResult<bool> {
        self.validator.registry().re_enable(code)
    }

    /// Activates a code on this device on the user's behalf.
    ///
    /// A disabled code is rejected unless `re_enable_disabled` is set, in
    /// which case it is re-enabled first.
    pub async fn activate(
        &self,
        user_name: &str,
        code: &str,
        force_accept: bool,
        re_enable_disabled: bool,
    ) -> LicenseResult<Grant> {
        let registry = self.validator.registry();
        if registry.is_disabled(code)? {
            if !re_enable_disabled {
                return Err(LicenseError::Disabled(normalize_code(code)));
            }
            registry.re_enable(code)?;
        }
        self.validator.validate(user_name, code, force_accept).await
    }

    pub async fn users(&self) -> LicenseResult<Vec<User>> {
        self.validator.directory().list_users().await
    }

    /// Adds a user after checking the id and code are free, then pushes the
    /// full list so the backend converges on it.
    pub async fn add_user(&self, new: NewUser) -> LicenseResult<User> {
        if new.id == 0 {
            return Err(LicenseError::InvalidInput("user id"));
        }
        let code = normalize_code(&new.code);
        if code.is_empty() {
            return Err(LicenseError::InvalidInput("code"));
        }
        let name = match new.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("User {}", new.id),
        };

        let directory = self.validator.directory();
        let mut users = directory.list_users().await?;
        if users.iter().any(|u| u.id == new.id) {
            return Err(LicenseError::Conflict(format!("user id {} already exists", new.id)));
        }
        if users.iter().any(|u| normalize_code(&u.code) == code) {
            return Err(LicenseError::Conflict(format!("code {code} already exists")));
        }

        let user = User::new(new.id, &code, &name);
        directory.add_user(&user).await?;
        users.push(user.clone());
        directory.sync_users(&users).await?;
        info!(id = user.id, code = %user.code, "user added");
        Ok(user)
    }

    pub async fn remove_user(&self, id: u32) -> LicenseResult<()> {
        self.validator.directory().delete_user(id).await?;
        info!(id, "user removed");
        Ok(())
    }

    /// Replaces the global duration policy. Existing grants with a different
    /// term are torn down at their next startup check.
    pub async fn save_duration_policy(&self, policy: DurationPolicy) -> LicenseResult<()> {
        self.validator.directory().save_duration_policy(&policy).await?;
        info!(%policy, "duration policy saved");
        Ok(())
    }
}
