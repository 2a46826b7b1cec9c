//! Code registry: disabled codes, code-to-device bindings and the active
//! subscription record.
//!
//! Every operation reads the store fresh, so two handles over the same
//! storage (or two processes over the same state file) see each other's
//! writes. Nothing here coordinates concurrent writers.

use crate::error::LicenseResult;
use crate::record::{normalize_code, DeviceId, SubscriptionRecord};
use crate::storage::{Storage, CODE_DEVICE_MAP_KEY, DISABLED_CODES_KEY, SUBSCRIPTION_KEY};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a binding claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// The code was unbound and is now bound to the caller's device.
    Claimed,
    /// The code was already bound to the caller's device.
    Verified,
    /// The code is bound to a different device.
    Violation { bound_to: DeviceId },
}

impl Binding {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Violation { .. })
    }
}

/// Handle over the persisted code registry.
#[derive(Clone)]
pub struct CodeRegistry {
    storage: Arc<dyn Storage>,
}

impl CodeRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Returns true if `code` is on the disabled list.
    pub fn is_disabled(&self, code: &str) -> LicenseResult<bool> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(false);
        }
        Ok(self.load_disabled()?.contains(&code))
    }

    /// Lists disabled codes in the order they were disabled.
    pub fn disabled_codes(&self) -> LicenseResult<Vec<String>> {
        self.load_disabled()
    }

    /// Disables `code`, drops its binding, and clears the active record if it
    /// uses this code. Returns true if the active record was cleared.
    pub fn disable(&self, code: &str) -> LicenseResult<bool> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(false);
        }

        let mut disabled = self.load_disabled()?;
        if !disabled.contains(&code) {
            disabled.push(code.clone());
            self.store_json(DISABLED_CODES_KEY, &disabled)?;
            warn!(%code, "code disabled");
        }

        self.release_binding(&code)?;

        match self.record()? {
            Some(record) if record.normalized_code() == code => {
                self.clear_record()?;
                info!(%code, "active subscription cleared for disabled code");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Removes `code` from the disabled list. Returns whether it was present.
    ///
    /// The previous binding is not restored; the next successful validation
    /// binds the code afresh.
    pub fn re_enable(&self, code: &str) -> LicenseResult<bool> {
        let code = normalize_code(code);
        let mut disabled = self.load_disabled()?;
        let before = disabled.len();
        disabled.retain(|c| c != &code);
        if disabled.len() == before {
            return Ok(false);
        }
        self.store_json(DISABLED_CODES_KEY, &disabled)?;
        info!(%code, "code re-enabled");
        Ok(true)
    }

    /// Returns the device `code` is bound to, if any.
    pub fn binding(&self, code: &str) -> LicenseResult<Option<DeviceId>> {
        let code = normalize_code(code);
        Ok(self.load_bindings()?.remove(&code))
    }

    /// Binds `code` to `device` if unbound, or checks the existing binding.
    ///
    /// A violation leaves the map untouched; the caller is expected to
    /// disable the code.
    pub fn claim_or_verify_binding(&self, code: &str, device: &DeviceId) -> LicenseResult<Binding> {
        let code = normalize_code(code);
        let mut bindings = self.load_bindings()?;
        match bindings.get(&code) {
            Some(bound) if bound == device => Ok(Binding::Verified),
            Some(bound) => Ok(Binding::Violation {
                bound_to: bound.clone(),
            }),
            None => {
                bindings.insert(code.clone(), device.clone());
                self.store_json(CODE_DEVICE_MAP_KEY, &bindings)?;
                debug!(%code, %device, "binding claimed");
                Ok(Binding::Claimed)
            }
        }
    }

    /// Drops the binding for `code`. Returns whether one existed.
    pub fn release_binding(&self, code: &str) -> LicenseResult<bool> {
        let code = normalize_code(code);
        let mut bindings = self.load_bindings()?;
        if bindings.remove(&code).is_none() {
            return Ok(false);
        }
        self.store_json(CODE_DEVICE_MAP_KEY, &bindings)?;
        debug!(%code, "binding released");
        Ok(true)
    }

    /// Returns the active subscription record. An unreadable record is
    /// removed so later reads do not trip over it again.
    pub fn record(&self) -> LicenseResult<Option<SubscriptionRecord>> {
        let Some(raw) = self.storage.get(SUBSCRIPTION_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, "discarding unreadable subscription record");
                self.storage.remove(SUBSCRIPTION_KEY)?;
                Ok(None)
            }
        }
    }

    /// Replaces the active subscription record.
    pub fn set_record(&self, record: &SubscriptionRecord) -> LicenseResult<()> {
        self.store_json(SUBSCRIPTION_KEY, record)
    }

    /// Removes the active subscription record.
    pub fn clear_record(&self) -> LicenseResult<()> {
        self.storage.remove(SUBSCRIPTION_KEY)
    }

    fn load_disabled(&self) -> LicenseResult<Vec<String>> {
        Ok(self.load_json(DISABLED_CODES_KEY)?.unwrap_or_default())
    }

    fn load_bindings(&self) -> LicenseResult<BTreeMap<String, DeviceId>> {
        Ok(self.load_json(CODE_DEVICE_MAP_KEY)?.unwrap_or_default())
    }

    /// Corrupt values read as absent rather than failing the operation.
    fn load_json<T: DeserializeOwned>(&self, key: &str) -> LicenseResult<Option<T>> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable stored value");
                Ok(None)
            }
        }
    }

    fn store_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> LicenseResult<()> {
        let json = serde_json::to_string(value)?;
        self.storage.set(key, &json)
    }
}
