mod model;

pub use model::Entitlement;

use super::subscription::SubscriptionService;
use super::ServiceError;

/// Read-only composition over the subscription engine for presenting a
/// user's current entitlement. No state of its own.
#[derive(Clone)]
pub struct EntitlementService {
    subscriptions: SubscriptionService,
}

impl EntitlementService {
    pub fn new(subscriptions: SubscriptionService) -> Self {
        Self { subscriptions }
    }

    pub async fn current(&self, telegram_id: i64) -> Result<Entitlement, ServiceError> {
        let paid = self.subscriptions.get_active_paid(telegram_id).await?;
        let free = self.subscriptions.get_free_subscription(telegram_id).await?;
        Ok(Entitlement { paid, free })
    }
}
