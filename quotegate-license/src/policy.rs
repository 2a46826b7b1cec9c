//! Subscription duration policy and term arithmetic.
//!
//! The administrator configures one process-wide policy: either grants never
//! expire, or every grant lasts a fixed term. Months and years are the fixed
//! approximations of 30 and 365 days, so enforced expiry drifts from the
//! calendar on purpose; stored expiries stay comparable across clients.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

const MS_PER_HOUR: i64 = 60 * 60 * 1000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
const MS_PER_MONTH: i64 = 30 * MS_PER_DAY;
const MS_PER_YEAR: i64 = 365 * MS_PER_DAY;

/// Unit of a subscription term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Hours,
    /// Also the reading of a missing or unrecognized unit.
    #[default]
    Days,
    Months,
    Years,
}

impl DurationUnit {
    /// All units, finest first.
    pub const ALL: [Self; 4] = [Self::Hours, Self::Days, Self::Months, Self::Years];

    /// Returns the length of one unit in milliseconds.
    #[must_use]
    pub const fn millis(&self) -> i64 {
        match self {
            Self::Hours => MS_PER_HOUR,
            Self::Days => MS_PER_DAY,
            Self::Months => MS_PER_MONTH,
            Self::Years => MS_PER_YEAR,
        }
    }

    /// Returns the wire name (`"hours"`, `"days"`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Months => "months",
            Self::Years => "years",
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            Self::Hours => "hour",
            Self::Days => "day",
            Self::Months => "month",
            Self::Years => "year",
        }
    }
}

impl std::str::FromStr for DurationUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            "month" | "months" => Ok(Self::Months),
            "year" | "years" => Ok(Self::Years),
            other => Err(format!("unknown duration unit: {other}")),
        }
    }
}

/// Reads a unit the way the backend does: null, missing or unknown is days.
fn unit_or_days(raw: Option<&str>) -> DurationUnit {
    match raw.map(str::parse::<DurationUnit>) {
        Some(Ok(unit)) => unit,
        Some(Err(e)) => {
            warn!(error = %e, "reading duration unit as days");
            DurationUnit::Days
        }
        None => DurationUnit::Days,
    }
}

fn lenient_unit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DurationUnit, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(unit_or_days(raw.as_deref()))
}

fn lenient_unit_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DurationUnit>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|raw| unit_or_days(Some(&raw))))
}

/// A concrete subscription length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DurationTerm {
    pub value: u32,
    #[serde(default, deserialize_with = "lenient_unit")]
    pub unit: DurationUnit,
}

impl DurationTerm {
    #[must_use]
    pub const fn new(value: u32, unit: DurationUnit) -> Self {
        Self { value, unit }
    }

    /// Returns the term length in milliseconds, saturating on overflow.
    #[must_use]
    pub fn millis(&self) -> i64 {
        i64::from(self.value).saturating_mul(self.unit.millis())
    }

    /// Returns the term as a `chrono::Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::try_milliseconds(self.millis()).unwrap_or(Duration::MAX)
    }
}

impl fmt::Display for DurationTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.value == 1 {
            self.unit.singular()
        } else {
            self.unit.as_str()
        };
        write!(f, "{} {unit}", self.value)
    }
}

/// The global duration policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "PolicyWire", into = "PolicyWire")]
pub enum DurationPolicy {
    /// Grants never expire.
    #[default]
    NoExpiry,
    /// Every grant lasts the given term from the moment it is made.
    Fixed(DurationTerm),
}

impl DurationPolicy {
    /// Builds a policy from the backend settings shape, where a missing
    /// or zero-length duration means "no expiry".
    #[must_use]
    pub fn from_term(term: Option<DurationTerm>) -> Self {
        match term {
            Some(term) if term.value > 0 => Self::Fixed(term),
            _ => Self::NoExpiry,
        }
    }

    /// Returns the concrete term, if any.
    #[must_use]
    pub fn term(&self) -> Option<DurationTerm> {
        match self {
            Self::NoExpiry => None,
            Self::Fixed(term) => Some(*term),
        }
    }

    #[must_use]
    pub fn is_no_expiry(&self) -> bool {
        matches!(self, Self::NoExpiry)
    }

    /// Computes the expiry of a grant made at `now`.
    #[must_use]
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.term().map(|term| {
            now.checked_add_signed(term.as_duration())
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Settings-drift rule: a stored term is consistent with this policy iff
    /// both say "no expiry", or both carry the identical value and unit.
    #[must_use]
    pub fn matches_record(&self, recorded: Option<&DurationTerm>) -> bool {
        match (self, recorded) {
            (Self::NoExpiry, None) => true,
            (Self::Fixed(live), Some(stored)) => live == stored,
            _ => false,
        }
    }
}

impl fmt::Display for DurationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoExpiry => f.write_str("no expiry"),
            Self::Fixed(term) => term.fmt(f),
        }
    }
}

/// `{noExpiry, value, unit}` as exchanged with other clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PolicyWire {
    #[serde(rename = "noExpiry", default)]
    no_expiry: bool,
    #[serde(default)]
    value: Option<u32>,
    #[serde(default, deserialize_with = "lenient_unit_opt")]
    unit: Option<DurationUnit>,
}

impl From<PolicyWire> for DurationPolicy {
    fn from(wire: PolicyWire) -> Self {
        if wire.no_expiry {
            return Self::NoExpiry;
        }
        // A value without a unit is read as days, the backend's fallback.
        let term = wire
            .value
            .map(|value| DurationTerm::new(value, wire.unit.unwrap_or(DurationUnit::Days)));
        Self::from_term(term)
    }
}

impl From<DurationPolicy> for PolicyWire {
    fn from(policy: DurationPolicy) -> Self {
        match policy {
            DurationPolicy::NoExpiry => Self {
                no_expiry: true,
                value: None,
                unit: None,
            },
            DurationPolicy::Fixed(term) => Self {
                no_expiry: false,
                value: Some(term.value),
                unit: Some(term.unit),
            },
        }
    }
}
