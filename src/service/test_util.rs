//! Shared setup for service tests: a scratch local database per test plus a
//! few seed helpers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use libsql::params;

use crate::config::{DatabaseConfig, FreePlanConfig};
use crate::storage::{row, Database};

pub(crate) const GB: i64 = 1 << 30;

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);
static SEED_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) async fn setup_db() -> Database {
    let _ = pretty_env_logger::try_init();

    let n = DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("trafika-test-{}-{}.db", std::process::id(), n));
    let _ = std::fs::remove_file(&path);

    let config = DatabaseConfig {
        url: format!("file:{}", path.display()),
        token: String::new(),
    };
    let db = Database::connect(&config).await.expect("connect scratch db");
    db.migrate().await.expect("migrate scratch db");
    db
}

pub(crate) fn free_plan() -> FreePlanConfig {
    FreePlanConfig {
        traffic_gb: 1.0,
        duration_days: 30,
    }
}

/// Inserts a plan and a completed purchase transaction for it, returning the
/// transaction id. For subscription tests that need a valid purchase
/// reference without going through the transaction engine.
pub(crate) async fn seed_purchase(db: &Database, telegram_id: i64) -> i64 {
    let n = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = row::format_ts(Utc::now());

    // Decode and drop each returned row before the next statement; a held
    // row keeps its write statement open and locks the database.
    let plan_id = {
        let plan_row = db
            .fetch_one(
                "INSERT INTO plans (name, price_toman, traffic_bytes, duration_days) \
                 VALUES (?1, 80000, ?2, 30) RETURNING plan_id",
                params![format!("seed-plan-{n}"), 10 * GB],
            )
            .await
            .expect("seed plan")
            .expect("plan row");
        match plan_row.get_value(0).expect("plan_id value") {
            libsql::Value::Integer(id) => id,
            other => panic!("unexpected plan_id {other:?}"),
        }
    };

    let transaction_id = {
        let tx_row = db
            .fetch_one(
                "INSERT INTO transactions \
                 (telegram_id, transaction_type, status, plan_id, price_toman, authority, created_at) \
                 VALUES (?1, 'plan_purchase', 'completed', ?2, 80000, ?3, ?4) \
                 RETURNING transaction_id",
                params![telegram_id, plan_id, format!("A-seed-{n}"), now],
            )
            .await
            .expect("seed transaction")
            .expect("transaction row");
        match tx_row.get_value(0).expect("transaction_id value") {
            libsql::Value::Integer(id) => id,
            other => panic!("unexpected transaction_id {other:?}"),
        }
    };
    transaction_id
}

/// Rows flagged active in storage, regardless of expiry.
pub(crate) async fn count_active(db: &Database, telegram_id: i64) -> i64 {
    match db
        .fetch_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE telegram_id = ?1 AND is_active = 1",
            params![telegram_id],
        )
        .await
        .expect("count active")
    {
        Some(libsql::Value::Integer(count)) => count,
        other => panic!("unexpected count {other:?}"),
    }
}
