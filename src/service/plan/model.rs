use libsql::Row;
use serde::{Deserialize, Serialize};

use crate::storage::{row, StorageError};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// A priced catalog offering: traffic allotment over a fixed duration.
/// Immutable once referenced by a purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: i64,
    pub name: String,
    pub price_toman: i64,
    pub traffic_bytes: i64,
    pub duration_days: i64,
}

impl Plan {
    pub fn traffic_gb(&self) -> f64 {
        self.traffic_bytes as f64 / BYTES_PER_GB
    }

    pub(crate) fn from_row(r: &Row) -> Result<Self, StorageError> {
        const TABLE: &str = "plans";
        Ok(Self {
            plan_id: row::integer(r, TABLE, "plan_id", 0)?,
            name: row::text(r, TABLE, "name", 1)?,
            price_toman: row::integer(r, TABLE, "price_toman", 2)?,
            traffic_bytes: row::integer(r, TABLE, "traffic_bytes", 3)?,
            duration_days: row::integer(r, TABLE, "duration_days", 4)?,
        })
    }
}

/// A traffic top-up with no duration of its own; it rides on an active paid
/// subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTrafficPlan {
    pub extra_traffic_plan_id: i64,
    pub price_toman: i64,
    pub traffic_bytes: i64,
}

impl ExtraTrafficPlan {
    pub fn traffic_gb(&self) -> f64 {
        self.traffic_bytes as f64 / BYTES_PER_GB
    }

    pub(crate) fn from_row(r: &Row) -> Result<Self, StorageError> {
        const TABLE: &str = "extra_traffic_plans";
        Ok(Self {
            extra_traffic_plan_id: row::integer(r, TABLE, "extra_traffic_plan_id", 0)?,
            price_toman: row::integer(r, TABLE, "price_toman", 1)?,
            traffic_bytes: row::integer(r, TABLE, "traffic_bytes", 2)?,
        })
    }
}
