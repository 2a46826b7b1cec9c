//! Device fingerprinting for code binding.
//!
//! Derives a stable identifier for this device from an ordered list of
//! environment signals. The identifier is persisted on first use and never
//! regenerated afterwards, so later changes to the environment do not move
//! an existing binding.

use crate::error::LicenseResult;
use crate::record::DeviceId;
use crate::storage::{Storage, DEVICE_ID_KEY};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use tracing::{debug, warn};

/// Prefix carried by every device id.
pub const DEVICE_ID_PREFIX: &str = "device_";

/// Information about the current device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Operating system name.
    pub os_name: String,
    /// Operating system version.
    pub os_version: String,
    /// Hostname.
    pub hostname: String,
    /// CPU architecture.
    pub arch: String,
}

impl DeviceInfo {
    /// Collects information about the current device.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os_name: env::consts::OS.to_string(),
            os_version: get_os_version(),
            hostname: get_hostname(),
            arch: env::consts::ARCH.to_string(),
        }
    }
}

/// The environment signals a fingerprint is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSignals {
    pub user_agent: String,
    pub locale: String,
    pub screen: String,
    /// Offset from UTC in minutes, sign as reported by the platform.
    pub timezone_offset: i32,
    pub render_signature: String,
    pub concurrency: String,
    pub platform: String,
}

impl EnvironmentSignals {
    /// Returns the signals in their fixed digest order.
    #[must_use]
    pub fn ordered(&self) -> [String; 7] {
        [
            self.user_agent.clone(),
            self.locale.clone(),
            self.screen.clone(),
            self.timezone_offset.to_string(),
            self.render_signature.clone(),
            self.concurrency.clone(),
            self.platform.clone(),
        ]
    }
}

/// Source of environment signals.
pub trait EnvironmentProbe: Send + Sync {
    /// Reads the current signals.
    fn signals(&self) -> LicenseResult<EnvironmentSignals>;
}

/// Probe reading the host the process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl EnvironmentProbe for SystemProbe {
    fn signals(&self) -> LicenseResult<EnvironmentSignals> {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.to_string())
            .unwrap_or_default();

        Ok(EnvironmentSignals {
            user_agent: format!(
                "{}/{} ({}; {})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                env::consts::OS,
                env::consts::ARCH
            ),
            locale: env::var("LC_ALL")
                .or_else(|_| env::var("LANG"))
                .unwrap_or_default(),
            screen: match (env::var("COLUMNS"), env::var("LINES")) {
                (Ok(cols), Ok(lines)) => format!("{cols}x{lines}"),
                _ => "unknown".to_string(),
            },
            timezone_offset: chrono::Local::now().offset().local_minus_utc() / 60,
            render_signature: render_signature(),
            concurrency,
            platform: env::consts::OS.to_string(),
        })
    }
}

/// Computes the device id for a set of signals. Pure and deterministic.
#[must_use]
pub fn fingerprint(signals: &EnvironmentSignals) -> DeviceId {
    let combined = signals.ordered().join("|");

    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    let hash = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&hash[..8]);
    DeviceId::new(format!(
        "{DEVICE_ID_PREFIX}{}",
        to_base36(u64::from_be_bytes(head))
    ))
}

/// Returns this device's id, generating and persisting it on first use.
///
/// Never fails: a probe failure falls back to a time-and-random token, and a
/// storage failure is logged while the freshly computed id is still returned.
pub fn get_device_id(storage: &dyn Storage, probe: &dyn EnvironmentProbe) -> DeviceId {
    match storage.get(DEVICE_ID_KEY) {
        Ok(Some(id)) if !id.trim().is_empty() => return DeviceId::new(id),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "cannot read persisted device id"),
    }

    let id = match probe.signals() {
        Ok(signals) => fingerprint(&signals),
        Err(e) => {
            warn!(error = %e, "environment probe failed, using random device id");
            fallback_device_id()
        }
    };

    if let Err(e) = storage.set(DEVICE_ID_KEY, id.as_str()) {
        warn!(error = %e, "cannot persist device id");
    } else {
        debug!(device = %id, "device id generated");
    }
    id
}

fn fallback_device_id() -> DeviceId {
    let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    let random = uuid::Uuid::new_v4().simple().to_string();
    DeviceId::new(format!(
        "{DEVICE_ID_PREFIX}{}{}",
        to_base36(millis),
        &random[..9]
    ))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Stable per-host signature standing in for a rendered canvas.
fn render_signature() -> String {
    let mut hasher = Sha256::new();
    hasher.update(get_hostname().as_bytes());
    if let Some(machine_id) = get_machine_id() {
        hasher.update(b"|");
        hasher.update(machine_id.as_bytes());
    }
    let hash = hasher.finalize();
    hash[..12].iter().map(|b| format!("{b:02x}")).collect()
}

/// Gets the machine hostname.
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Gets the OS version string.
fn get_os_version() -> String {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("VERSION_ID="))
                    .map(|l| {
                        l.trim_start_matches("VERSION_ID=")
                            .trim_matches('"')
                            .to_string()
                    })
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        "unknown".to_string()
    }
}

/// Gets the platform machine id, when the OS exposes one.
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
