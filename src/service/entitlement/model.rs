use serde::{Deserialize, Serialize};

use crate::service::subscription::{FreeSubscription, Subscription};

/// A user's current allowance across both pools. Which pool a consumer
/// debits first is their policy; this view only reports the balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub paid: Option<Subscription>,
    pub free: Option<FreeSubscription>,
}

impl Entitlement {
    pub fn remaining_paid_bytes(&self) -> i64 {
        self.paid
            .as_ref()
            .map(Subscription::remaining_traffic_bytes)
            .unwrap_or(0)
    }

    pub fn remaining_free_bytes(&self) -> i64 {
        self.free
            .as_ref()
            .filter(|f| !f.is_expired())
            .map(FreeSubscription::remaining_traffic_bytes)
            .unwrap_or(0)
    }

    pub fn total_remaining_bytes(&self) -> i64 {
        self.remaining_paid_bytes() + self.remaining_free_bytes()
    }
}
