mod model;

pub use model::{ExtraTrafficPlan, Plan};

use libsql::{params, Connection};

use crate::storage::{Database, StorageError};

use super::ServiceError;

const PLAN_COLUMNS: &str = "plan_id, name, price_toman, traffic_bytes, duration_days";
const EXTRA_COLUMNS: &str = "extra_traffic_plan_id, price_toman, traffic_bytes";

/// Catalog reads plus the create operations used by the administrative
/// collaborator. Referenced rows are never edited or deleted.
#[derive(Clone)]
pub struct PlanService {
    db: Database,
}

impl PlanService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_plan(
        &self,
        name: &str,
        price_toman: i64,
        traffic_bytes: i64,
        duration_days: i64,
    ) -> Result<Plan, ServiceError> {
        let sql = format!(
            "INSERT INTO plans (name, price_toman, traffic_bytes, duration_days) \
             VALUES (?1, ?2, ?3, ?4) RETURNING {PLAN_COLUMNS}"
        );
        let r = self
            .db
            .fetch_one(&sql, params![name, price_toman, traffic_bytes, duration_days])
            .await?
            .ok_or_else(|| ServiceError::not_found("plan", name))?;
        Ok(Plan::from_row(&r)?)
    }

    pub async fn all_plans(&self) -> Result<Vec<Plan>, ServiceError> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans ORDER BY price_toman ASC");
        Ok(self.db.fetch_all(&sql, params![], Plan::from_row).await?)
    }

    pub async fn get_plan(&self, plan_id: i64) -> Result<Option<Plan>, ServiceError> {
        let conn = self.db.connection().await?;
        Ok(fetch_plan_in(&conn, plan_id).await?)
    }

    pub async fn get_plan_by_name(&self, name: &str) -> Result<Option<Plan>, ServiceError> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE name = ?1");
        match self.db.fetch_one(&sql, params![name]).await? {
            Some(r) => Ok(Some(Plan::from_row(&r)?)),
            None => Ok(None),
        }
    }

    pub async fn create_extra_traffic_plan(
        &self,
        price_toman: i64,
        traffic_bytes: i64,
    ) -> Result<ExtraTrafficPlan, ServiceError> {
        let sql = format!(
            "INSERT INTO extra_traffic_plans (price_toman, traffic_bytes) \
             VALUES (?1, ?2) RETURNING {EXTRA_COLUMNS}"
        );
        let r = self
            .db
            .fetch_one(&sql, params![price_toman, traffic_bytes])
            .await?
            .ok_or_else(|| ServiceError::not_found("extra_traffic_plan", price_toman))?;
        Ok(ExtraTrafficPlan::from_row(&r)?)
    }

    pub async fn all_extra_traffic_plans(&self) -> Result<Vec<ExtraTrafficPlan>, ServiceError> {
        let sql = format!("SELECT {EXTRA_COLUMNS} FROM extra_traffic_plans ORDER BY price_toman ASC");
        Ok(self
            .db
            .fetch_all(&sql, params![], ExtraTrafficPlan::from_row)
            .await?)
    }

    pub async fn get_extra_traffic_plan(
        &self,
        extra_traffic_plan_id: i64,
    ) -> Result<Option<ExtraTrafficPlan>, ServiceError> {
        let conn = self.db.connection().await?;
        Ok(fetch_extra_traffic_plan_in(&conn, extra_traffic_plan_id).await?)
    }
}

/// Catalog reads against a caller-supplied connection, so the transaction
/// engine can resolve the purchased plan inside its own atomic unit.
pub(crate) async fn fetch_plan_in(
    conn: &Connection,
    plan_id: i64,
) -> Result<Option<Plan>, StorageError> {
    let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE plan_id = ?1");
    let mut rows = conn.query(&sql, params![plan_id]).await?;
    match rows.next().await? {
        Some(r) => Ok(Some(Plan::from_row(&r)?)),
        None => Ok(None),
    }
}

pub(crate) async fn fetch_extra_traffic_plan_in(
    conn: &Connection,
    extra_traffic_plan_id: i64,
) -> Result<Option<ExtraTrafficPlan>, StorageError> {
    let sql =
        format!("SELECT {EXTRA_COLUMNS} FROM extra_traffic_plans WHERE extra_traffic_plan_id = ?1");
    let mut rows = conn.query(&sql, params![extra_traffic_plan_id]).await?;
    match rows.next().await? {
        Some(r) => Ok(Some(ExtraTrafficPlan::from_row(&r)?)),
        None => Ok(None),
    }
}
