//! License validator state machine.
//!
//! ```text
//!             validate() ok
//!   Locked ──► Validating ──────────► Active
//!     ▲            │ rejected            │ expiry / disable / violation /
//!     └────────────┘                     │ drift / manual clear
//!     ▲                                  │
//!     └──────────────────────────────────┘
//! ```
//!
//! Only the validator mutates the code registry on behalf of a user. All
//! session state lives behind one `tokio::sync::RwLock` that is never held
//! across a directory call.

use crate::clock::{Clock, SystemClock};
use crate::countdown::{describe_remaining, Remaining};
use crate::device::{get_device_id, EnvironmentProbe, SystemProbe};
use crate::directory::DirectoryClient;
use crate::error::{LicenseError, LicenseResult, Reason};
use crate::gate::{Gate, NoopGate};
use crate::policy::DurationPolicy;
use crate::record::{normalize_code, DeviceId, SubscriptionRecord, User};
use crate::registry::{Binding, CodeRegistry};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Validator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseState {
    Locked,
    Validating,
    Active,
}

impl fmt::Display for LicenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Locked => "locked",
            Self::Validating => "validating",
            Self::Active => "active",
        })
    }
}

/// Why an active or stored subscription was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    Disabled,
    Violation,
    Expired,
    SettingsDrifted,
    ManuallyCleared,
}

impl LockReason {
    /// Returns the matching reason code. A manual clear is not a rejection.
    #[must_use]
    pub fn reason(&self) -> Option<Reason> {
        match self {
            Self::Disabled => Some(Reason::Disabled),
            Self::Violation => Some(Reason::Violation),
            Self::Expired => Some(Reason::Expired),
            Self::SettingsDrifted => Some(Reason::SettingsDrifted),
            Self::ManuallyCleared => None,
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::Violation => "violation",
            Self::Expired => "expired",
            Self::SettingsDrifted => "settings_drifted",
            Self::ManuallyCleared => "manually_cleared",
        })
    }
}

/// Outcome of [`LicenseValidator::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseStatus {
    Active(SubscriptionRecord),
    /// `None` when there was simply no stored subscription.
    Locked(Option<LockReason>),
}

impl LicenseStatus {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    #[must_use]
    pub fn lock_reason(&self) -> Option<LockReason> {
        match self {
            Self::Active(_) => None,
            Self::Locked(reason) => *reason,
        }
    }
}

/// A successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// The matched directory user; `None` for a force-accepted code.
    pub user: Option<User>,
    pub record: SubscriptionRecord,
}

/// Validator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// How often a countdown re-evaluates the remaining time.
    pub tick_interval: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct Session {
    state: LicenseState,
    /// Policy fetched during the last initialize or validate.
    policy: Option<DurationPolicy>,
    /// Expiry the countdown is watching; cleared once it fires.
    armed: Option<DateTime<Utc>>,
    /// Bumped on every transition into or out of Active.
    generation: u64,
}

/// Builder for [`LicenseValidator`].
pub struct LicenseValidatorBuilder {
    storage: Arc<dyn Storage>,
    directory: Arc<dyn DirectoryClient>,
    probe: Arc<dyn EnvironmentProbe>,
    clock: Arc<dyn Clock>,
    gate: Arc<dyn Gate>,
    config: ValidatorConfig,
}

impl LicenseValidatorBuilder {
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn EnvironmentProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> LicenseValidator {
        LicenseValidator {
            registry: CodeRegistry::new(Arc::clone(&self.storage)),
            storage: self.storage,
            directory: self.directory,
            probe: self.probe,
            clock: self.clock,
            gate: self.gate,
            config: self.config,
            session: RwLock::new(Session {
                state: LicenseState::Locked,
                policy: None,
                armed: None,
                generation: 0,
            }),
        }
    }
}

/// Gates access on a verified, device-bound, unexpired subscription.
pub struct LicenseValidator {
    registry: CodeRegistry,
    storage: Arc<dyn Storage>,
    directory: Arc<dyn DirectoryClient>,
    probe: Arc<dyn EnvironmentProbe>,
    clock: Arc<dyn Clock>,
    gate: Arc<dyn Gate>,
    config: ValidatorConfig,
    session: RwLock<Session>,
}

impl LicenseValidator {
    /// Starts a builder with the system probe, the system clock and a no-op gate.
    pub fn builder(
        storage: Arc<dyn Storage>,
        directory: Arc<dyn DirectoryClient>,
    ) -> LicenseValidatorBuilder {
        LicenseValidatorBuilder {
            storage,
            directory,
            probe: Arc::new(SystemProbe),
            clock: Arc::new(SystemClock),
            gate: Arc::new(NoopGate),
            config: ValidatorConfig::default(),
        }
    }

    // ── Startup ──────────────────────────────────────────────────

    /// Re-checks the stored subscription and either unlocks or locks.
    ///
    /// Checks run in order: disabled code, binding held by another device,
    /// record written by another device, expiry, then settings drift. A
    /// failing check tears the record down and locks with its reason.
    pub async fn initialize(&self) -> LicenseResult<LicenseStatus> {
        let policy = match self.directory.get_duration_policy().await {
            Ok(policy) => Some(policy.unwrap_or_default()),
            Err(e) => {
                warn!(error = %e, "directory unavailable, skipping settings drift check");
                None
            }
        };
        self.session.write().await.policy = policy;

        let device = self.device_id();
        let Some(record) = self.registry.record()? else {
            debug!("no stored subscription");
            self.enter_locked(None).await;
            return Ok(LicenseStatus::Locked(None));
        };
        let code = record.normalized_code();

        if self.registry.is_disabled(&code)? {
            info!(%code, "stored subscription uses a disabled code");
            self.registry.clear_record()?;
            return Ok(self.lock_with(LockReason::Disabled).await);
        }

        if let Some(bound) = self.registry.binding(&code)? {
            if bound != device {
                warn!(%code, %bound, %device, "code is bound to another device");
                self.registry.disable(&code)?;
                self.registry.clear_record()?;
                return Ok(self.lock_with(LockReason::Violation).await);
            }
        }

        if record.device_id != device {
            warn!(%code, recorded = %record.device_id, %device, "subscription was granted to another device");
            self.registry.disable(&code)?;
            self.registry.clear_record()?;
            return Ok(self.lock_with(LockReason::Violation).await);
        }

        if record.is_expired_at(self.clock.now()) {
            info!(%code, "stored subscription expired");
            self.registry.clear_record()?;
            self.registry.release_binding(&code)?;
            return Ok(self.lock_with(LockReason::Expired).await);
        }

        if let Some(policy) = policy {
            if !policy.matches_record(record.duration.as_ref()) {
                warn!(%code, %policy, "duration policy changed since grant");
                self.registry.clear_record()?;
                return Ok(self.lock_with(LockReason::SettingsDrifted).await);
            }
        }

        self.enter_active(&record).await;
        Ok(LicenseStatus::Active(record))
    }

    // ── Validation ───────────────────────────────────────────────

    /// Validates a user name and code against the directory and grants a
    /// subscription on success.
    ///
    /// `force_accept` grants even when no directory user matches. Disabled
    /// codes and bindings held by other devices are still enforced.
    pub async fn validate(
        &self,
        user_name: &str,
        code: &str,
        force_accept: bool,
    ) -> LicenseResult<Grant> {
        let user_name = user_name.trim();
        let code = normalize_code(code);
        if user_name.is_empty() {
            return Err(LicenseError::InvalidInput("user name"));
        }
        if code.is_empty() {
            return Err(LicenseError::InvalidInput("code"));
        }
        if self.registry.is_disabled(&code)? {
            return Err(LicenseError::Disabled(code));
        }

        let previous = {
            let mut session = self.session.write().await;
            std::mem::replace(&mut session.state, LicenseState::Validating)
        };

        let result = self.grant(user_name, code, force_accept).await;
        if result.is_err() {
            let mut session = self.session.write().await;
            if session.state == LicenseState::Validating {
                session.state = previous;
            }
        }
        result
    }

    async fn grant(&self, user_name: &str, code: String, force_accept: bool) -> LicenseResult<Grant> {
        let users = self.directory.list_users().await?;
        let user = users.into_iter().find(|u| u.matches(user_name, &code));
        match &user {
            Some(user) => debug!(id = user.id, %code, "credentials matched"),
            None if force_accept => warn!(%code, "no directory match, accepting by override"),
            None => return Err(LicenseError::InvalidCredentials),
        }

        // Another device may have disabled the code while the directory
        // was being queried.
        if self.registry.is_disabled(&code)? {
            return Err(LicenseError::Disabled(code));
        }

        let policy = self.directory.get_duration_policy().await?.unwrap_or_default();
        self.session.write().await.policy = Some(policy);

        let device = self.device_id();
        if let Binding::Violation { bound_to } = self.registry.claim_or_verify_binding(&code, &device)? {
            warn!(%code, %bound_to, %device, "code already bound to another device");
            if self.registry.disable(&code)? {
                self.enter_locked(Some(LockReason::Violation)).await;
            }
            return Err(LicenseError::Violation {
                code,
                bound_to: bound_to.to_string(),
            });
        }

        if let Some(previous) = self.registry.record()? {
            let previous_code = previous.normalized_code();
            if previous_code != code {
                debug!(code = %previous_code, "replacing subscription for another code");
                self.registry.release_binding(&previous_code)?;
                self.registry.clear_record()?;
            }
        }

        let now = self.clock.now();
        let record = SubscriptionRecord {
            code: code.clone(),
            user_name: user_name.to_string(),
            user: user.clone(),
            device_id: device,
            verified: true,
            granted_at: now,
            expiry: policy.expiry_from(now),
            duration: policy.term(),
        };
        self.registry.set_record(&record)?;
        info!(%code, %policy, expiry = ?record.expiry, "subscription granted");

        self.enter_active(&record).await;
        Ok(Grant { user, record })
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Releases the binding, clears the record and locks. Disabled codes
    /// are left alone.
    pub async fn manual_clear(&self) -> LicenseResult<()> {
        if let Some(record) = self.registry.record()? {
            let code = record.normalized_code();
            self.registry.release_binding(&code)?;
            self.registry.clear_record()?;
            info!(%code, "subscription cleared");
        }
        self.enter_locked(Some(LockReason::ManuallyCleared)).await;
        Ok(())
    }

    // ── Countdown ────────────────────────────────────────────────

    /// One countdown step for the current session.
    pub async fn tick(&self) -> LicenseResult<Option<Remaining>> {
        let generation = self.session().await;
        self.tick_session(generation).await
    }

    /// One countdown step, only if `generation` is still the live session.
    ///
    /// The expiry transition happens at most once per session: the first
    /// step past the armed expiry disarms it and returns an exhausted
    /// reading, later steps return `None`.
    pub async fn tick_session(&self, generation: u64) -> LicenseResult<Option<Remaining>> {
        let armed = {
            let session = self.session.read().await;
            if session.generation != generation {
                return Ok(None);
            }
            match session.armed {
                Some(expiry) => expiry,
                None => return Ok(None),
            }
        };

        let remaining = describe_remaining(armed, self.clock.now());
        if !remaining.exhausted {
            return Ok(Some(remaining));
        }

        {
            let mut session = self.session.write().await;
            if session.generation != generation || session.armed.is_none() {
                return Ok(None);
            }
            session.armed = None;
        }

        if let Some(record) = self.registry.record()? {
            let code = record.normalized_code();
            self.registry.clear_record()?;
            self.registry.release_binding(&code)?;
            info!(%code, "subscription expired");
        }
        self.enter_locked(Some(LockReason::Expired)).await;
        Ok(Some(remaining))
    }

    /// Returns the live session generation.
    pub async fn session(&self) -> u64 {
        self.session.read().await.generation
    }

    // ── Accessors ────────────────────────────────────────────────

    pub async fn state(&self) -> LicenseState {
        self.session.read().await.state
    }

    /// Returns the policy seen by the last initialize or validate.
    pub async fn policy(&self) -> Option<DurationPolicy> {
        self.session.read().await.policy
    }

    /// Returns the persisted subscription record.
    pub fn record(&self) -> LicenseResult<Option<SubscriptionRecord>> {
        self.registry.record()
    }

    /// Returns this device's id, creating and persisting it on first use.
    pub fn device_id(&self) -> DeviceId {
        get_device_id(self.storage.as_ref(), self.probe.as_ref())
    }

    #[must_use]
    pub fn registry(&self) -> &CodeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn DirectoryClient> {
        &self.directory
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    // ── Transitions ──────────────────────────────────────────────

    async fn enter_active(&self, record: &SubscriptionRecord) {
        {
            let mut session = self.session.write().await;
            session.state = LicenseState::Active;
            session.armed = record.expiry;
            session.generation += 1;
        }
        self.gate.unlock(record);
    }

    async fn enter_locked(&self, reason: Option<LockReason>) {
        {
            let mut session = self.session.write().await;
            session.state = LicenseState::Locked;
            session.armed = None;
            session.generation += 1;
        }
        if let Some(reason) = reason {
            info!(%reason, "locked");
        }
        self.gate.lock(reason);
    }

    async fn lock_with(&self, reason: LockReason) -> LicenseStatus {
        self.enter_locked(Some(reason)).await;
        LicenseStatus::Locked(Some(reason))
    }
}
