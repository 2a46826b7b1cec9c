//! Countdown reporter.
//!
//! A pure projection of the armed expiry: [`describe_remaining`] breaks the
//! time left into the coarsest applicable unit, and [`Countdown`] re-evaluates
//! it on a fixed tick through [`LicenseValidator::tick_session`].

use crate::validator::LicenseValidator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const MS_PER_SECOND: i64 = 1000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
const MS_PER_MONTH: i64 = 30 * MS_PER_DAY;
const MS_PER_YEAR: i64 = 365 * MS_PER_DAY;

/// Display unit of a remaining-time figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Years,
    Months,
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    /// Coarsest first.
    const DESCENDING: [Self; 6] = [
        Self::Years,
        Self::Months,
        Self::Days,
        Self::Hours,
        Self::Minutes,
        Self::Seconds,
    ];

    #[must_use]
    pub const fn millis(&self) -> i64 {
        match self {
            Self::Years => MS_PER_YEAR,
            Self::Months => MS_PER_MONTH,
            Self::Days => MS_PER_DAY,
            Self::Hours => MS_PER_HOUR,
            Self::Minutes => MS_PER_MINUTE,
            Self::Seconds => MS_PER_SECOND,
        }
    }

    fn label(&self, amount: u64) -> &'static str {
        let (one, many) = match self {
            Self::Years => ("year", "years"),
            Self::Months => ("month", "months"),
            Self::Days => ("day", "days"),
            Self::Hours => ("hour", "hours"),
            Self::Minutes => ("minute", "minutes"),
            Self::Seconds => ("second", "seconds"),
        };
        if amount == 1 { one } else { many }
    }
}

/// Remaining time until expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remaining {
    pub amount: u64,
    pub unit: TimeUnit,
    pub exhausted: bool,
    /// The next-finer component, when it is worth showing.
    pub detail: Option<(u64, TimeUnit)>,
}

impl Remaining {
    fn exhausted() -> Self {
        Self {
            amount: 0,
            unit: TimeUnit::Seconds,
            exhausted: true,
            detail: None,
        }
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exhausted {
            return f.write_str("expired");
        }
        write!(f, "{} {}", self.amount, self.unit.label(self.amount))?;
        if let Some((amount, unit)) = self.detail {
            write!(f, " and {amount} {}", unit.label(amount))?;
        }
        Ok(())
    }
}

/// Picks the coarsest unit with a non-zero amount.
fn coarsest(ms: i64) -> (u64, TimeUnit) {
    for unit in TimeUnit::DESCENDING {
        let amount = ms / unit.millis();
        if amount > 0 {
            return (u64::try_from(amount).unwrap_or_default(), unit);
        }
    }
    (0, TimeUnit::Seconds)
}

/// Describes the time left between `now` and `expiry`.
#[must_use]
pub fn describe_remaining(expiry: DateTime<Utc>, now: DateTime<Utc>) -> Remaining {
    let ms = (expiry - now).num_milliseconds();
    if ms <= 0 {
        return Remaining::exhausted();
    }

    let (amount, unit) = coarsest(ms);

    // The finer component only matters while the headline figure is small,
    // or always for hours and minutes.
    let detail = if unit == TimeUnit::Seconds {
        None
    } else {
        let rest = ms - i64::try_from(amount).unwrap_or(i64::MAX / 2) * unit.millis();
        let show = amount < 7 || matches!(unit, TimeUnit::Hours | TimeUnit::Minutes);
        match coarsest(rest) {
            (n, finer) if show && n > 0 => Some((n, finer)),
            _ => None,
        }
    };

    Remaining {
        amount,
        unit,
        exhausted: false,
        detail,
    }
}

/// A running countdown task.
///
/// The task stops on its own when the validator leaves the session it was
/// started for, or once the expiry is exhausted. Dropping the handle aborts it.
pub struct Countdown {
    handle: JoinHandle<()>,
}

impl Countdown {
    /// Starts ticking `validator` every `interval`, calling `on_tick` with
    /// each fresh reading.
    pub async fn start<F>(validator: Arc<LicenseValidator>, interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(&Remaining) + Send + 'static,
    {
        let session = validator.session().await;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match validator.tick_session(session).await {
                    Ok(Some(remaining)) => {
                        on_tick(&remaining);
                        if remaining.exhausted {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => warn!(error = %e, "countdown tick failed"),
                }
            }
            debug!(session, "countdown stopped");
        });
        Self { handle }
    }

    /// Aborts the countdown.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the countdown to stop by itself.
    pub async fn finished(&mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarsest_prefers_larger_units() {
        assert_eq!(coarsest(MS_PER_YEAR + MS_PER_DAY), (1, TimeUnit::Years));
        assert_eq!(coarsest(59 * MS_PER_SECOND), (59, TimeUnit::Seconds));
        assert_eq!(coarsest(999), (0, TimeUnit::Seconds));
    }
}
