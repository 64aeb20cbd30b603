mod model;

pub use model::{PlanRef, Transaction, TransactionKind, TransactionStatus};

use chrono::Utc;
use libsql::{params, Connection};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::storage::{row, Database, StorageError};

use super::{plan, subscription, ServiceError};

const COLUMNS: &str = "transaction_id, telegram_id, transaction_type, status, plan_id, \
                       extra_traffic_plan_id, price_toman, authority, ref_id, created_at";

/// Length of the gateway authority token, matching the gateway's own
/// 36-character format.
const AUTHORITY_LEN: usize = 36;

/// Purchase-intent state machine. Completion applies the entitlement effect
/// in the same atomic unit that flips the status, so a `completed` row
/// always implies its subscription effect happened.
#[derive(Clone)]
pub struct TransactionService {
    db: Database,
}

impl TransactionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates a `pending` transaction with a freshly minted authority.
    /// A token collision surfaces as [`ServiceError::DuplicateAuthority`];
    /// the caller retries, which mints a new token.
    pub async fn open(
        &self,
        telegram_id: i64,
        kind: TransactionKind,
        price_toman: i64,
        plan_ref: PlanRef,
    ) -> Result<Transaction, ServiceError> {
        if plan_ref.kind() != kind {
            return Err(ServiceError::MismatchedPlanRef { kind });
        }
        self.insert(telegram_id, kind, price_toman, plan_ref, mint_authority())
            .await
    }

    pub(crate) async fn insert(
        &self,
        telegram_id: i64,
        kind: TransactionKind,
        price_toman: i64,
        plan_ref: PlanRef,
        authority: String,
    ) -> Result<Transaction, ServiceError> {
        let sql = format!(
            "INSERT INTO transactions \
             (telegram_id, transaction_type, price_toman, authority, plan_id, \
              extra_traffic_plan_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             RETURNING {COLUMNS}"
        );
        let result = self
            .db
            .fetch_one(
                &sql,
                params![
                    telegram_id,
                    kind.as_str(),
                    price_toman,
                    authority.as_str(),
                    plan_ref.plan_id(),
                    plan_ref.extra_traffic_plan_id(),
                    row::format_ts(Utc::now())
                ],
            )
            .await;
        let r = match result {
            Ok(Some(r)) => r,
            Ok(None) => return Err(ServiceError::not_found("transaction", &authority)),
            Err(StorageError::Constraint(message)) if message.contains("authority") => {
                warn!("Authority collision on open: {authority}");
                return Err(ServiceError::DuplicateAuthority(authority));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Transaction::from_row(&r)?)
    }

    pub async fn get_by_authority(
        &self,
        authority: &str,
    ) -> Result<Option<Transaction>, ServiceError> {
        let conn = self.db.connection().await?;
        Ok(fetch_by_authority_in(&conn, authority).await?)
    }

    /// Settles a confirmed payment: flips `pending -> completed`, stores the
    /// gateway reference id, and applies the entitlement effect, all in one
    /// atomic unit. Re-delivery for an already-completed transaction is a
    /// no-op success; a transaction already `failed` is an invalid
    /// transition.
    pub async fn complete(&self, authority: &str, ref_id: i64) -> Result<Transaction, ServiceError> {
        let conn = self.db.connection().await?;
        let tx = conn.transaction().await.map_err(StorageError::from)?;

        let existing = fetch_by_authority_in(&tx, authority)
            .await?
            .ok_or_else(|| ServiceError::not_found("transaction", authority))?;
        match existing.status {
            TransactionStatus::Completed => {
                info!("Webhook re-delivery for completed transaction {authority}, absorbing");
                return Ok(existing);
            }
            TransactionStatus::Failed => {
                return Err(ServiceError::InvalidState {
                    authority: authority.to_string(),
                    from: TransactionStatus::Failed,
                    attempted: TransactionStatus::Completed,
                });
            }
            TransactionStatus::Pending => {}
        }

        let sql = format!(
            "UPDATE transactions SET status = 'completed', ref_id = ?2 \
             WHERE transaction_id = ?1 AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        // Decode and close the statement before touching the connection
        // again; a live row handle would block the commit.
        let completed = {
            let mut rows = tx
                .query(&sql, params![existing.transaction_id, ref_id])
                .await
                .map_err(StorageError::from)?;
            let r = rows
                .next()
                .await
                .map_err(StorageError::from)?
                .ok_or_else(|| ServiceError::not_found("transaction", authority))?;
            Transaction::from_row(&r)?
        };

        let now = Utc::now();
        match completed.kind {
            TransactionKind::PlanPurchase => {
                let plan_id = completed
                    .plan_id
                    .ok_or_else(|| ServiceError::not_found("plan reference", authority))?;
                let purchased = plan::fetch_plan_in(&tx, plan_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("plan", plan_id))?;
                subscription::activate_in(
                    &tx,
                    completed.telegram_id,
                    completed.transaction_id,
                    purchased.traffic_bytes,
                    purchased.duration_days,
                    now,
                )
                .await?;
            }
            TransactionKind::ExtraTrafficPurchase => {
                let extra_id = completed.extra_traffic_plan_id.ok_or_else(|| {
                    ServiceError::not_found("extra traffic plan reference", authority)
                })?;
                let top_up = plan::fetch_extra_traffic_plan_in(&tx, extra_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("extra_traffic_plan", extra_id))?;
                let applied = subscription::add_extra_traffic_in(
                    &tx,
                    completed.telegram_id,
                    top_up.traffic_bytes,
                    now,
                )
                .await?;
                if applied.is_none() {
                    // Rolls back with the dropped transaction: the purchase
                    // stays pending and the caller settles it (fail/refund).
                    warn!(
                        "Top-up {authority} has no active subscription for user {}",
                        completed.telegram_id
                    );
                    return Err(ServiceError::not_found(
                        "active subscription",
                        completed.telegram_id,
                    ));
                }
            }
        }

        tx.commit().await.map_err(StorageError::from)?;
        info!("Transaction {authority} completed with ref {ref_id}");
        Ok(completed)
    }

    /// `pending -> failed`. Idempotent: on a transaction already in a
    /// terminal state nothing changes and the stored row is returned.
    pub async fn fail(&self, authority: &str) -> Result<Transaction, ServiceError> {
        let sql = format!(
            "UPDATE transactions SET status = 'failed' \
             WHERE authority = ?1 AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        if let Some(r) = self.db.fetch_one(&sql, params![authority]).await? {
            info!("Transaction {authority} marked failed");
            return Ok(Transaction::from_row(&r)?);
        }
        // Already terminal, or unknown. Terminal is absorbed as a no-op.
        self.get_by_authority(authority)
            .await?
            .ok_or_else(|| ServiceError::not_found("transaction", authority))
    }

    pub async fn history(
        &self,
        telegram_id: i64,
        limit: u32,
    ) -> Result<Vec<Transaction>, ServiceError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM transactions \
             WHERE telegram_id = ?1 ORDER BY created_at DESC, transaction_id DESC LIMIT ?2"
        );
        Ok(self
            .db
            .fetch_all(&sql, params![telegram_id, limit as i64], Transaction::from_row)
            .await?)
    }
}

fn mint_authority() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTHORITY_LEN - 1)
        .map(char::from)
        .collect();
    format!("A{token}")
}

async fn fetch_by_authority_in(
    conn: &Connection,
    authority: &str,
) -> Result<Option<Transaction>, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM transactions WHERE authority = ?1");
    let mut rows = conn.query(&sql, params![authority]).await?;
    match rows.next().await? {
        Some(r) => Ok(Some(Transaction::from_row(&r)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::plan::PlanService;
    use crate::service::subscription::SubscriptionService;
    use crate::service::test_util::{count_active, free_plan, setup_db, GB};
    use chrono::Duration;

    struct Fixture {
        db: Database,
        plans: PlanService,
        subs: SubscriptionService,
        transactions: TransactionService,
    }

    async fn fixture() -> Fixture {
        let db = setup_db().await;
        Fixture {
            plans: PlanService::new(db.clone()),
            subs: SubscriptionService::new(db.clone(), free_plan()),
            transactions: TransactionService::new(db.clone()),
            db,
        }
    }

    #[tokio::test]
    async fn open_creates_pending_with_minted_authority() {
        let f = fixture().await;
        let plan = f
            .plans
            .create_plan("lite", 80_000, 10 * GB, 30)
            .await
            .expect("plan");

        let opened = f
            .transactions
            .open(
                1,
                TransactionKind::PlanPurchase,
                plan.price_toman,
                PlanRef::Plan(plan.plan_id),
            )
            .await
            .expect("open");

        assert_eq!(opened.status, TransactionStatus::Pending);
        assert_eq!(opened.authority.len(), AUTHORITY_LEN);
        assert!(opened.ref_id.is_none());
        assert_eq!(opened.plan_id, Some(plan.plan_id));
    }

    #[tokio::test]
    async fn open_rejects_mismatched_plan_ref() {
        let f = fixture().await;
        let outcome = f
            .transactions
            .open(
                1,
                TransactionKind::PlanPurchase,
                40_000,
                PlanRef::ExtraTraffic(1),
            )
            .await;
        assert!(matches!(
            outcome,
            Err(ServiceError::MismatchedPlanRef { .. })
        ));
    }

    #[tokio::test]
    async fn authority_collision_is_reported_as_duplicate() {
        let f = fixture().await;
        let plan = f
            .plans
            .create_plan("lite", 80_000, 10 * GB, 30)
            .await
            .expect("plan");

        let authority = mint_authority();
        f.transactions
            .insert(
                1,
                TransactionKind::PlanPurchase,
                plan.price_toman,
                PlanRef::Plan(plan.plan_id),
                authority.clone(),
            )
            .await
            .expect("first insert");
        let collision = f
            .transactions
            .insert(
                2,
                TransactionKind::PlanPurchase,
                plan.price_toman,
                PlanRef::Plan(plan.plan_id),
                authority.clone(),
            )
            .await;
        assert!(matches!(
            collision,
            Err(ServiceError::DuplicateAuthority(a)) if a == authority
        ));
    }

    #[tokio::test]
    async fn completed_plan_purchase_activates_the_subscription() {
        let f = fixture().await;
        let plan = f
            .plans
            .create_plan("lite", 80_000, 10 * GB, 30)
            .await
            .expect("plan");
        let opened = f
            .transactions
            .open(
                10,
                TransactionKind::PlanPurchase,
                plan.price_toman,
                PlanRef::Plan(plan.plan_id),
            )
            .await
            .expect("open");

        let completed = f
            .transactions
            .complete(&opened.authority, 555)
            .await
            .expect("complete");
        assert_eq!(completed.status, TransactionStatus::Completed);
        assert_eq!(completed.ref_id, Some(555));

        let active = f
            .subs
            .get_active_paid(10)
            .await
            .expect("lookup")
            .expect("active");
        assert_eq!(active.traffic_limit_bytes, 10 * GB);
        assert!(active.is_active);
        assert_eq!(active.purchase_id, completed.transaction_id);
        let expected_expiry = Utc::now() + Duration::days(30);
        assert!((active.expires_at - expected_expiry).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn complete_is_idempotent_under_webhook_redelivery() {
        let f = fixture().await;
        let plan = f
            .plans
            .create_plan("lite", 80_000, 10 * GB, 30)
            .await
            .expect("plan");
        let opened = f
            .transactions
            .open(
                20,
                TransactionKind::PlanPurchase,
                plan.price_toman,
                PlanRef::Plan(plan.plan_id),
            )
            .await
            .expect("open");

        let first = f
            .transactions
            .complete(&opened.authority, 700)
            .await
            .expect("first delivery");
        let second = f
            .transactions
            .complete(&opened.authority, 700)
            .await
            .expect("second delivery is a no-op success");

        assert_eq!(first.transaction_id, second.transaction_id);
        // One entitlement effect, not two.
        assert_eq!(count_active(&f.db, 20).await, 1);
        assert_eq!(f.subs.history(20, 10).await.expect("history").len(), 1);
    }

    #[tokio::test]
    async fn completed_top_up_grows_remaining_traffic() {
        let f = fixture().await;
        let plan = f
            .plans
            .create_plan("lite", 80_000, 10 * GB, 30)
            .await
            .expect("plan");
        let top_up = f
            .plans
            .create_extra_traffic_plan(40_000, 5 * GB)
            .await
            .expect("top-up plan");

        let purchase = f
            .transactions
            .open(
                30,
                TransactionKind::PlanPurchase,
                plan.price_toman,
                PlanRef::Plan(plan.plan_id),
            )
            .await
            .expect("open purchase");
        f.transactions
            .complete(&purchase.authority, 1)
            .await
            .expect("complete purchase");
        let before = f
            .subs
            .get_active_paid(30)
            .await
            .expect("lookup")
            .expect("active")
            .remaining_traffic_bytes();

        let extra = f
            .transactions
            .open(
                30,
                TransactionKind::ExtraTrafficPurchase,
                top_up.price_toman,
                PlanRef::ExtraTraffic(top_up.extra_traffic_plan_id),
            )
            .await
            .expect("open top-up");
        f.transactions
            .complete(&extra.authority, 2)
            .await
            .expect("complete top-up");

        let after = f
            .subs
            .get_active_paid(30)
            .await
            .expect("lookup")
            .expect("active")
            .remaining_traffic_bytes();
        assert_eq!(after - before, 5 * GB);
    }

    #[tokio::test]
    async fn top_up_without_subscription_rolls_everything_back() {
        let f = fixture().await;
        let top_up = f
            .plans
            .create_extra_traffic_plan(40_000, 5 * GB)
            .await
            .expect("top-up plan");
        let opened = f
            .transactions
            .open(
                40,
                TransactionKind::ExtraTrafficPurchase,
                top_up.price_toman,
                PlanRef::ExtraTraffic(top_up.extra_traffic_plan_id),
            )
            .await
            .expect("open");

        let outcome = f.transactions.complete(&opened.authority, 3).await;
        assert!(matches!(outcome, Err(ServiceError::NotFound { .. })));

        // The status flip was rolled back with the rest of the unit.
        let stored = f
            .transactions
            .get_by_authority(&opened.authority)
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert!(stored.ref_id.is_none());
    }

    #[tokio::test]
    async fn fail_is_a_no_op_on_terminal_transactions() {
        let f = fixture().await;
        let plan = f
            .plans
            .create_plan("lite", 80_000, 10 * GB, 30)
            .await
            .expect("plan");
        let opened = f
            .transactions
            .open(
                50,
                TransactionKind::PlanPurchase,
                plan.price_toman,
                PlanRef::Plan(plan.plan_id),
            )
            .await
            .expect("open");
        f.transactions
            .complete(&opened.authority, 9)
            .await
            .expect("complete");

        let settled = f
            .transactions
            .fail(&opened.authority)
            .await
            .expect("late failure webhook is absorbed");
        assert_eq!(settled.status, TransactionStatus::Completed);
        assert_eq!(count_active(&f.db, 50).await, 1);
    }

    #[tokio::test]
    async fn complete_after_fail_is_an_invalid_transition() {
        let f = fixture().await;
        let plan = f
            .plans
            .create_plan("lite", 80_000, 10 * GB, 30)
            .await
            .expect("plan");
        let opened = f
            .transactions
            .open(
                60,
                TransactionKind::PlanPurchase,
                plan.price_toman,
                PlanRef::Plan(plan.plan_id),
            )
            .await
            .expect("open");

        let failed = f.transactions.fail(&opened.authority).await.expect("fail");
        assert_eq!(failed.status, TransactionStatus::Failed);
        // Repeat delivery of the failure stays a no-op.
        f.transactions
            .fail(&opened.authority)
            .await
            .expect("repeat fail");

        let outcome = f.transactions.complete(&opened.authority, 4).await;
        assert!(matches!(
            outcome,
            Err(ServiceError::InvalidState {
                from: TransactionStatus::Failed,
                attempted: TransactionStatus::Completed,
                ..
            })
        ));
        assert_eq!(count_active(&f.db, 60).await, 0);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_bounded() {
        let f = fixture().await;
        let plan = f
            .plans
            .create_plan("lite", 80_000, 10 * GB, 30)
            .await
            .expect("plan");

        for _ in 0..3 {
            f.transactions
                .open(
                    70,
                    TransactionKind::PlanPurchase,
                    plan.price_toman,
                    PlanRef::Plan(plan.plan_id),
                )
                .await
                .expect("open");
        }

        let history = f.transactions.history(70, 2).await.expect("history");
        assert_eq!(history.len(), 2);
        assert!(history[0].transaction_id > history[1].transaction_id);

        let unknown = f.transactions.fail("A-unknown").await;
        assert!(matches!(unknown, Err(ServiceError::NotFound { .. })));
    }
}
