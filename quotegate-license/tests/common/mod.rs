//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use quotegate_license::{
    Clock, DirectoryClient, EnvironmentProbe, EnvironmentSignals, Gate, LicenseError,
    LicenseResult, LicenseValidator, LockReason, ManualClock, MemoryDirectory, MemoryStorage,
    Storage, SubscriptionRecord, User, CODE_DEVICE_MAP_KEY, DISABLED_CODES_KEY,
};
use std::sync::{Arc, Mutex};

/// Fixed start time for every scenario.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn alice() -> User {
    User::new(1, "ABC123", "Alice")
}

pub fn bob() -> User {
    User::new(2, "XYZ789", "Bob")
}

/// Signals for a made-up device named `tag`.
pub fn signals(tag: &str) -> EnvironmentSignals {
    EnvironmentSignals {
        user_agent: format!("test-agent/{tag}"),
        locale: "en-US".to_string(),
        screen: "1920x1080".to_string(),
        timezone_offset: -60,
        render_signature: format!("render-{tag}"),
        concurrency: "8".to_string(),
        platform: "test".to_string(),
    }
}

/// Probe returning fixed signals, or failing.
pub struct FakeProbe {
    signals: EnvironmentSignals,
    fail: bool,
}

impl FakeProbe {
    pub fn new(tag: &str) -> Self {
        Self {
            signals: signals(tag),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            signals: signals("unused"),
            fail: true,
        }
    }
}

impl EnvironmentProbe for FakeProbe {
    fn signals(&self) -> LicenseResult<EnvironmentSignals> {
        if self.fail {
            return Err(LicenseError::Storage("probe unavailable".into()));
        }
        Ok(self.signals.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    Unlock(String),
    Lock(Option<LockReason>),
}

/// Gate recording every transition.
#[derive(Default)]
pub struct RecordingGate {
    events: Mutex<Vec<GateEvent>>,
}

impl RecordingGate {
    pub fn events(&self) -> Vec<GateEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<GateEvent> {
        self.events.lock().unwrap().last().cloned()
    }

    pub fn count_locks(&self, reason: LockReason) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == GateEvent::Lock(Some(reason)))
            .count()
    }
}

impl Gate for RecordingGate {
    fn unlock(&self, record: &SubscriptionRecord) {
        self.events
            .lock()
            .unwrap()
            .push(GateEvent::Unlock(record.code.clone()));
    }

    fn lock(&self, reason: Option<LockReason>) {
        self.events.lock().unwrap().push(GateEvent::Lock(reason));
    }
}

/// Storage where the code registry is shared between devices while the
/// device id and the active record stay local.
pub struct DeviceStorage {
    pub local: MemoryStorage,
    pub shared: Arc<MemoryStorage>,
}

impl DeviceStorage {
    fn route(&self, key: &str) -> &dyn Storage {
        if key == DISABLED_CODES_KEY || key == CODE_DEVICE_MAP_KEY {
            self.shared.as_ref()
        } else {
            &self.local
        }
    }
}

impl Storage for DeviceStorage {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        self.route(key).get(key)
    }

    fn set(&self, key: &str, value: &str) -> LicenseResult<()> {
        self.route(key).set(key, value)
    }

    fn remove(&self, key: &str) -> LicenseResult<()> {
        self.route(key).remove(key)
    }
}

/// One simulated device.
pub struct Device {
    pub validator: Arc<LicenseValidator>,
    pub gate: Arc<RecordingGate>,
    pub storage: Arc<DeviceStorage>,
}

impl Device {
    /// Rebuilds the validator over the same storage, as after a restart.
    pub fn restart(&self, world: &World, tag: &str) -> Device {
        let gate = Arc::new(RecordingGate::default());
        let validator = LicenseValidator::builder(
            Arc::clone(&self.storage) as Arc<dyn Storage>,
            Arc::clone(&world.directory) as Arc<dyn DirectoryClient>,
        )
        .probe(Arc::new(FakeProbe::new(tag)))
        .clock(Arc::clone(&world.clock) as Arc<dyn Clock>)
        .gate(Arc::clone(&gate) as Arc<dyn Gate>)
        .build();
        Device {
            validator: Arc::new(validator),
            gate,
            storage: Arc::clone(&self.storage),
        }
    }
}

/// A directory, a shared registry and a clock that devices join.
pub struct World {
    pub directory: Arc<MemoryDirectory>,
    pub shared: Arc<MemoryStorage>,
    pub clock: Arc<ManualClock>,
}

impl World {
    pub fn new(directory: MemoryDirectory) -> Self {
        Self {
            directory: Arc::new(directory),
            shared: Arc::new(MemoryStorage::new()),
            clock: Arc::new(ManualClock::new(t0())),
        }
    }

    /// A world with Alice and Bob in the directory and no policy.
    pub fn with_users() -> Self {
        Self::new(MemoryDirectory::new().with_users([alice(), bob()]))
    }

    pub fn device(&self, tag: &str) -> Device {
        let storage = Arc::new(DeviceStorage {
            local: MemoryStorage::new(),
            shared: Arc::clone(&self.shared),
        });
        let gate = Arc::new(RecordingGate::default());
        let validator = LicenseValidator::builder(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&self.directory) as Arc<dyn DirectoryClient>,
        )
        .probe(Arc::new(FakeProbe::new(tag)))
        .clock(Arc::clone(&self.clock) as Arc<dyn Clock>)
        .gate(Arc::clone(&gate) as Arc<dyn Gate>)
        .build();
        Device {
            validator: Arc::new(validator),
            gate,
            storage,
        }
    }
}
