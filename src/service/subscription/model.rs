use chrono::{DateTime, Utc};
use libsql::Row;
use serde::{Deserialize, Serialize};

use crate::storage::{row, StorageError};

/// A paid, time-bounded, traffic-metered entitlement. Superseded rows are
/// deactivated, never deleted; they remain as the billing history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: i64,
    pub telegram_id: i64,
    /// The completed purchase transaction this subscription came from.
    pub purchase_id: i64,
    pub traffic_limit_bytes: i64,
    pub traffic_used_bytes: i64,
    pub extra_traffic_bytes: i64,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Subscription {
    pub fn total_traffic_bytes(&self) -> i64 {
        self.traffic_limit_bytes + self.extra_traffic_bytes
    }

    /// Clamped at zero: over-debit is recorded but never reported as a
    /// negative balance.
    pub fn remaining_traffic_bytes(&self) -> i64 {
        (self.total_traffic_bytes() - self.traffic_used_bytes).max(0)
    }

    /// Expiry is lazy; there is no background deactivation.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub(crate) fn from_row(r: &Row) -> Result<Self, StorageError> {
        const TABLE: &str = "subscriptions";
        Ok(Self {
            subscription_id: row::integer(r, TABLE, "subscription_id", 0)?,
            telegram_id: row::integer(r, TABLE, "telegram_id", 1)?,
            purchase_id: row::integer(r, TABLE, "purchase_id", 2)?,
            traffic_limit_bytes: row::integer(r, TABLE, "traffic_limit_bytes", 3)?,
            traffic_used_bytes: row::integer(r, TABLE, "traffic_used_bytes", 4)?,
            extra_traffic_bytes: row::integer(r, TABLE, "extra_traffic_bytes", 5)?,
            started_at: row::timestamp(r, TABLE, "started_at", 6)?,
            expires_at: row::timestamp(r, TABLE, "expires_at", 7)?,
            is_active: row::boolean(r, TABLE, "is_active", 8)?,
        })
    }
}

/// The always-available free tier. One per user, created lazily, with a
/// lifecycle independent from paid subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeSubscription {
    pub free_subscription_id: i64,
    pub telegram_id: i64,
    pub traffic_limit_bytes: i64,
    pub traffic_used_bytes: i64,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FreeSubscription {
    pub fn remaining_traffic_bytes(&self) -> i64 {
        (self.traffic_limit_bytes - self.traffic_used_bytes).max(0)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub(crate) fn from_row(r: &Row) -> Result<Self, StorageError> {
        const TABLE: &str = "free_subscriptions";
        Ok(Self {
            free_subscription_id: row::integer(r, TABLE, "free_subscription_id", 0)?,
            telegram_id: row::integer(r, TABLE, "telegram_id", 1)?,
            traffic_limit_bytes: row::integer(r, TABLE, "traffic_limit_bytes", 2)?,
            traffic_used_bytes: row::integer(r, TABLE, "traffic_used_bytes", 3)?,
            started_at: row::timestamp(r, TABLE, "started_at", 4)?,
            expires_at: row::timestamp(r, TABLE, "expires_at", 5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(limit: i64, used: i64, extra: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            subscription_id: 1,
            telegram_id: 1,
            purchase_id: 1,
            traffic_limit_bytes: limit,
            traffic_used_bytes: used,
            extra_traffic_bytes: extra,
            started_at: now,
            expires_at: now + Duration::days(30),
            is_active: true,
        }
    }

    #[test]
    fn remaining_traffic_never_goes_negative() {
        let s = subscription(10, 25, 5);
        assert_eq!(s.total_traffic_bytes(), 15);
        assert_eq!(s.remaining_traffic_bytes(), 0);
    }

    #[test]
    fn remaining_traffic_counts_extra_pool() {
        let s = subscription(10, 8, 5);
        assert_eq!(s.remaining_traffic_bytes(), 7);
    }

    #[test]
    fn expiry_compares_against_now() {
        let mut s = subscription(10, 0, 0);
        assert!(!s.is_expired());
        s.expires_at = Utc::now() - Duration::seconds(1);
        assert!(s.is_expired());
    }
}
