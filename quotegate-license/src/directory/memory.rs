//! In-process directory with the same upsert/sync semantics as the backend.

use super::DirectoryClient;
use crate::error::{LicenseError, LicenseResult};
use crate::policy::DurationPolicy;
use crate::record::{normalize_code, User};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// Directory kept in memory, keyed by user id.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<BTreeMap<u32, User>>,
    policy: RwLock<Option<DurationPolicy>>,
    offline: AtomicBool,
    requests: AtomicUsize,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the directory with `users`.
    #[must_use]
    pub fn with_users(self, users: impl IntoIterator<Item = User>) -> Self {
        if let Ok(mut map) = self.users.write() {
            for user in users {
                upsert(&mut map, user);
            }
        }
        self
    }

    /// Seeds the directory with a duration policy.
    #[must_use]
    pub fn with_policy(self, policy: DurationPolicy) -> Self {
        if let Ok(mut slot) = self.policy.write() {
            *slot = Some(policy);
        }
        self
    }

    /// Makes every subsequent call fail with `DirectoryUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Replaces the policy without going through the client interface.
    pub fn set_policy(&self, policy: Option<DurationPolicy>) {
        if let Ok(mut slot) = self.policy.write() {
            *slot = policy;
        }
    }

    /// Number of calls served (including failed ones).
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> LicenseResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(LicenseError::DirectoryUnavailable(
                "directory is offline".to_string(),
            ));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> LicenseError {
    LicenseError::DirectoryUnavailable("directory lock poisoned".to_string())
}

fn upsert(map: &mut BTreeMap<u32, User>, user: User) {
    let user = User::new(user.id, &user.code, &user.name);
    map.insert(user.id, user);
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn list_users(&self) -> LicenseResult<Vec<User>> {
        self.check_online()?;
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.values().cloned().collect())
    }

    async fn get_duration_policy(&self) -> LicenseResult<Option<DurationPolicy>> {
        self.check_online()?;
        Ok(*self.policy.read().map_err(poisoned)?)
    }

    async fn add_user(&self, user: &User) -> LicenseResult<()> {
        self.check_online()?;
        let mut users = self.users.write().map_err(poisoned)?;
        upsert(&mut users, user.clone());
        Ok(())
    }

    async fn sync_users(&self, incoming: &[User]) -> LicenseResult<()> {
        self.check_online()?;
        let mut users = self.users.write().map_err(poisoned)?;
        users.retain(|id, _| incoming.iter().any(|u| u.id == *id));
        for user in incoming {
            // Last writer wins: another id holding the same code is dropped.
            let code = normalize_code(&user.code);
            users.retain(|id, existing| *id == user.id || normalize_code(&existing.code) != code);
            upsert(&mut users, user.clone());
        }
        Ok(())
    }

    async fn save_duration_policy(&self, policy: &DurationPolicy) -> LicenseResult<()> {
        self.check_online()?;
        *self.policy.write().map_err(poisoned)? = Some(*policy);
        Ok(())
    }

    async fn delete_user(&self, id: u32) -> LicenseResult<()> {
        self.check_online()?;
        let mut users = self.users.write().map_err(poisoned)?;
        if users.remove(&id).is_none() {
            return Err(LicenseError::DirectoryUnavailable(format!(
                "delete_user: user {id} not found"
            )));
        }
        Ok(())
    }
}
