//! Gate controller boundary.
//!
//! Whatever owns the protected surface implements [`Gate`]; the validator
//! calls it on every transition into or out of the active state.

use crate::record::SubscriptionRecord;
use crate::validator::LockReason;

/// Sink for lock/unlock transitions.
pub trait Gate: Send + Sync {
    /// Called when a subscription becomes active.
    fn unlock(&self, record: &SubscriptionRecord);

    /// Called when the validator locks. `None` means nothing was torn down
    /// (there was simply no subscription).
    fn lock(&self, reason: Option<LockReason>);
}

/// Gate that ignores transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGate;

impl Gate for NoopGate {
    fn unlock(&self, _record: &SubscriptionRecord) {}

    fn lock(&self, _reason: Option<LockReason>) {}
}
