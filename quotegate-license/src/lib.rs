//! Subscription gating for Quotegate.
//!
//! This crate decides whether a user may use the application:
//! - Name/code validation against a remote user directory
//! - Device binding: a code is usable on one device only
//! - Automatic disabling of codes seen on a second device
//! - Time-bounded grants under a global duration policy
//! - Revocation when that policy changes after a grant
//!
//! # Design Principles
//!
//! - **Locked by default**: nothing unlocks without a verified, bound,
//!   unexpired record
//! - **Startup re-check**: the stored grant is re-validated on every start
//! - **Injected capabilities**: storage, directory, environment probe,
//!   clock and gate are all traits, so the validator runs headless
//!
//! # Local State
//!
//! Four keys in a [`Storage`]: `disabled_codes`, `code_device_map`,
//! `subscription_verified` and `device_id`.

mod admin;
mod clock;
mod countdown;
mod device;
pub mod directory;
mod error;
mod gate;
mod policy;
mod record;
mod registry;
mod storage;
mod validator;

pub use admin::{AdminConsole, AdminStatus, NewUser, TimeLeft};
pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::{describe_remaining, Countdown, Remaining, TimeUnit};
pub use device::{
    fingerprint, get_device_id, DeviceInfo, EnvironmentProbe, EnvironmentSignals, SystemProbe,
    DEVICE_ID_PREFIX,
};
pub use directory::{DirectoryClient, DirectoryConfig, MemoryDirectory};
pub use error::{LicenseError, LicenseResult, Reason};
pub use gate::{Gate, NoopGate};
pub use policy::{DurationPolicy, DurationTerm, DurationUnit};
pub use record::{normalize_code, DeviceId, SubscriptionRecord, User};
pub use registry::{Binding, CodeRegistry};
pub use storage::{
    FileStorage, MemoryStorage, Storage, CODE_DEVICE_MAP_KEY, DEVICE_ID_KEY, DISABLED_CODES_KEY,
    SUBSCRIPTION_KEY,
};
pub use validator::{
    Grant, LicenseState, LicenseStatus, LicenseValidator, LicenseValidatorBuilder, LockReason,
    ValidatorConfig,
};

#[cfg(feature = "online")]
pub use directory::HttpDirectory;
