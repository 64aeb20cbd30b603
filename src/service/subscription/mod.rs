mod model;

pub use model::{FreeSubscription, Subscription};

use chrono::{DateTime, Duration, Utc};
use libsql::{params, Connection};

use crate::config::FreePlanConfig;
use crate::storage::{row, Database, StorageError};

use super::ServiceError;

const COLUMNS: &str = "subscription_id, telegram_id, purchase_id, traffic_limit_bytes, \
                       traffic_used_bytes, extra_traffic_bytes, started_at, expires_at, is_active";
const FREE_COLUMNS: &str = "free_subscription_id, telegram_id, traffic_limit_bytes, \
                            traffic_used_bytes, started_at, expires_at";

/// Owns activation, renewal, top-ups, traffic debiting and the free-tier
/// bootstrap. Holds no state between calls; every mutation is one atomic
/// unit against the store.
#[derive(Clone)]
pub struct SubscriptionService {
    db: Database,
    free_plan: FreePlanConfig,
}

impl SubscriptionService {
    pub fn new(db: Database, free_plan: FreePlanConfig) -> Self {
        Self { db, free_plan }
    }

    /// Deactivates whatever was active and inserts the replacement in a
    /// single transaction. Right after return exactly one active
    /// subscription exists for the user, and it is the returned one.
    pub async fn activate(
        &self,
        telegram_id: i64,
        purchase_id: i64,
        traffic_limit_bytes: i64,
        duration_days: i64,
    ) -> Result<Subscription, ServiceError> {
        let conn = self.db.connection().await?;
        let tx = conn.transaction().await.map_err(StorageError::from)?;
        let subscription = activate_in(
            &tx,
            telegram_id,
            purchase_id,
            traffic_limit_bytes,
            duration_days,
            Utc::now(),
        )
        .await?;
        tx.commit().await.map_err(StorageError::from)?;
        info!(
            "Activated subscription {} for user {}",
            subscription.subscription_id, telegram_id
        );
        Ok(subscription)
    }

    /// Tops up the active, non-expired subscription. `None` means there is
    /// no qualifying subscription; nothing was written and the caller
    /// decides how to settle the purchase.
    pub async fn add_extra_traffic(
        &self,
        telegram_id: i64,
        extra_bytes: i64,
    ) -> Result<Option<Subscription>, ServiceError> {
        let conn = self.db.connection().await?;
        Ok(add_extra_traffic_in(&conn, telegram_id, extra_bytes, Utc::now()).await?)
    }

    /// Records consumed traffic on the active subscription. Soft cap: usage
    /// past the limit is recorded as-is and only the reported remainder is
    /// clamped at zero.
    pub async fn debit_traffic(
        &self,
        telegram_id: i64,
        bytes_consumed: i64,
    ) -> Result<Option<Subscription>, ServiceError> {
        let sql = format!(
            "UPDATE subscriptions \
             SET traffic_used_bytes = traffic_used_bytes + ?2 \
             WHERE subscription_id = ( \
                 SELECT subscription_id FROM subscriptions \
                 WHERE telegram_id = ?1 AND is_active = 1 AND expires_at > ?3 \
                 ORDER BY expires_at DESC LIMIT 1) \
             RETURNING {COLUMNS}"
        );
        match self
            .db
            .fetch_one(
                &sql,
                params![telegram_id, bytes_consumed, row::format_ts(Utc::now())],
            )
            .await?
        {
            Some(r) => Ok(Some(Subscription::from_row(&r)?)),
            None => Ok(None),
        }
    }

    /// The active, non-expired subscription. `is_active` alone is not
    /// trusted: expiry is evaluated here, at read time, and if more than one
    /// row is flagged active the latest-expiring one wins.
    pub async fn get_active_paid(
        &self,
        telegram_id: i64,
    ) -> Result<Option<Subscription>, ServiceError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM subscriptions \
             WHERE telegram_id = ?1 AND is_active = 1 AND expires_at > ?2 \
             ORDER BY expires_at DESC LIMIT 1"
        );
        match self
            .db
            .fetch_one(&sql, params![telegram_id, row::format_ts(Utc::now())])
            .await?
        {
            Some(r) => Ok(Some(Subscription::from_row(&r)?)),
            None => Ok(None),
        }
    }

    /// All paid subscriptions for the user, newest first. Superseded rows
    /// are kept for billing history.
    pub async fn history(
        &self,
        telegram_id: i64,
        limit: u32,
    ) -> Result<Vec<Subscription>, ServiceError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM subscriptions \
             WHERE telegram_id = ?1 ORDER BY started_at DESC, subscription_id DESC LIMIT ?2"
        );
        Ok(self
            .db
            .fetch_all(&sql, params![telegram_id, limit as i64], Subscription::from_row)
            .await?)
    }

    /// Create-if-absent bootstrap for the free tier. The insert is a single
    /// conflict-ignoring statement, so duplicate concurrent first-contact
    /// events cannot produce two rows.
    pub async fn ensure_free_subscription(
        &self,
        telegram_id: i64,
        limit_bytes: i64,
    ) -> Result<FreeSubscription, ServiceError> {
        let now = Utc::now();
        self.db
            .execute(
                "INSERT INTO free_subscriptions \
                 (telegram_id, traffic_limit_bytes, started_at, expires_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (telegram_id) DO NOTHING",
                params![
                    telegram_id,
                    limit_bytes,
                    row::format_ts(now),
                    row::format_ts(now + Duration::days(self.free_plan.duration_days))
                ],
            )
            .await?;
        self.get_free_subscription(telegram_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("free_subscription", telegram_id))
    }

    pub async fn get_free_subscription(
        &self,
        telegram_id: i64,
    ) -> Result<Option<FreeSubscription>, ServiceError> {
        let sql = format!("SELECT {FREE_COLUMNS} FROM free_subscriptions WHERE telegram_id = ?1");
        match self.db.fetch_one(&sql, params![telegram_id]).await? {
            Some(r) => Ok(Some(FreeSubscription::from_row(&r)?)),
            None => Ok(None),
        }
    }

    /// Free-pool counterpart of [`debit_traffic`](Self::debit_traffic).
    /// Which pool gets debited first is the caller's policy, not ours.
    pub async fn debit_free_traffic(
        &self,
        telegram_id: i64,
        bytes_consumed: i64,
    ) -> Result<Option<FreeSubscription>, ServiceError> {
        let sql = format!(
            "UPDATE free_subscriptions \
             SET traffic_used_bytes = traffic_used_bytes + ?2 \
             WHERE telegram_id = ?1 \
             RETURNING {FREE_COLUMNS}"
        );
        match self
            .db
            .fetch_one(&sql, params![telegram_id, bytes_consumed])
            .await?
        {
            Some(r) => Ok(Some(FreeSubscription::from_row(&r)?)),
            None => Ok(None),
        }
    }
}

/// Deactivate-then-insert as one unit against a caller-supplied connection.
/// The transaction engine runs this inside the same atomic unit that marks
/// a purchase completed.
pub(crate) async fn activate_in(
    conn: &Connection,
    telegram_id: i64,
    purchase_id: i64,
    traffic_limit_bytes: i64,
    duration_days: i64,
    now: DateTime<Utc>,
) -> Result<Subscription, StorageError> {
    conn.execute(
        "UPDATE subscriptions SET is_active = 0 WHERE telegram_id = ?1 AND is_active = 1",
        params![telegram_id],
    )
    .await?;

    let sql = format!(
        "INSERT INTO subscriptions \
         (telegram_id, purchase_id, traffic_limit_bytes, started_at, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         RETURNING {COLUMNS}"
    );
    let mut rows = conn
        .query(
            &sql,
            params![
                telegram_id,
                purchase_id,
                traffic_limit_bytes,
                row::format_ts(now),
                row::format_ts(now + Duration::days(duration_days))
            ],
        )
        .await?;
    let r = rows
        .next()
        .await?
        .ok_or(StorageError::Turso(libsql::Error::QueryReturnedNoRows))?;
    Subscription::from_row(&r)
}

/// Top-up against a caller-supplied connection. Scoped to the single
/// latest-expiring active row so a violated single-active invariant cannot
/// spread the credit over several rows.
pub(crate) async fn add_extra_traffic_in(
    conn: &Connection,
    telegram_id: i64,
    extra_bytes: i64,
    now: DateTime<Utc>,
) -> Result<Option<Subscription>, StorageError> {
    let sql = format!(
        "UPDATE subscriptions \
         SET extra_traffic_bytes = extra_traffic_bytes + ?2 \
         WHERE subscription_id = ( \
             SELECT subscription_id FROM subscriptions \
             WHERE telegram_id = ?1 AND is_active = 1 AND expires_at > ?3 \
             ORDER BY expires_at DESC LIMIT 1) \
         RETURNING {COLUMNS}"
    );
    let mut rows = conn
        .query(&sql, params![telegram_id, extra_bytes, row::format_ts(now)])
        .await?;
    match rows.next().await? {
        Some(r) => Ok(Some(Subscription::from_row(&r)?)),
        None => Ok(None),
    }
}
