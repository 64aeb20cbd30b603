mod error;

pub mod entitlement;
pub mod payment;
pub mod plan;
pub mod subscription;
pub mod transaction;
pub mod user;

#[cfg(test)]
pub(crate) mod test_util;

pub use entitlement::EntitlementService;
pub use error::ServiceError;
pub use plan::PlanService;
pub use subscription::SubscriptionService;
pub use transaction::TransactionService;
pub use user::UserService;

use crate::config::AppConfig;
use crate::storage::Database;

/// One registry per process, wired by the entry point. Services share the
/// database handle and hold no entity state of their own.
#[derive(Clone)]
pub struct ServiceRegistry {
    pub user: UserService,
    pub plan: PlanService,
    pub subscription: SubscriptionService,
    pub transaction: TransactionService,
    pub entitlement: EntitlementService,
}

impl ServiceRegistry {
    pub fn new(config: &AppConfig, db: Database) -> Self {
        info!("Initializing service registry");

        let subscription = SubscriptionService::new(db.clone(), config.free_plan.clone());
        let registry = Self {
            user: UserService::new(db.clone()),
            plan: PlanService::new(db.clone()),
            transaction: TransactionService::new(db.clone()),
            entitlement: EntitlementService::new(subscription.clone()),
            subscription,
        };

        info!("Service registry initialized");
        registry
    }
}
