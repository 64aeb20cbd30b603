use std::fmt;

use chrono::{DateTime, Utc};
use libsql::Row;
use serde::{Deserialize, Serialize};

use crate::storage::{row, StorageError};

const TABLE: &str = "transactions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    PlanPurchase,
    ExtraTrafficPurchase,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::PlanPurchase => "plan_purchase",
            TransactionKind::ExtraTrafficPurchase => "extra_traffic_purchase",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "plan_purchase" => Some(TransactionKind::PlanPurchase),
            "extra_traffic_purchase" => Some(TransactionKind::ExtraTrafficPurchase),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status transitions are monotonic: `pending` may become `completed` or
/// `failed`, and the terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a purchase intent points at: exactly one of the two catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanRef {
    Plan(i64),
    ExtraTraffic(i64),
}

impl PlanRef {
    pub fn kind(&self) -> TransactionKind {
        match self {
            PlanRef::Plan(_) => TransactionKind::PlanPurchase,
            PlanRef::ExtraTraffic(_) => TransactionKind::ExtraTrafficPurchase,
        }
    }

    pub(crate) fn plan_id(&self) -> Option<i64> {
        match self {
            PlanRef::Plan(id) => Some(*id),
            PlanRef::ExtraTraffic(_) => None,
        }
    }

    pub(crate) fn extra_traffic_plan_id(&self) -> Option<i64> {
        match self {
            PlanRef::Plan(_) => None,
            PlanRef::ExtraTraffic(id) => Some(*id),
        }
    }
}

/// A purchase intent and its settlement with the payment gateway. The
/// authority token is unique and immutable; the gateway reference id is
/// only present once the transaction completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: i64,
    pub telegram_id: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub plan_id: Option<i64>,
    pub extra_traffic_plan_id: Option<i64>,
    pub price_toman: i64,
    pub authority: String,
    pub ref_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn from_row(r: &Row) -> Result<Self, StorageError> {
        let raw_kind = row::text(r, TABLE, "transaction_type", 2)?;
        let kind = TransactionKind::parse(&raw_kind).ok_or(StorageError::Column {
            table: TABLE,
            column: "transaction_type",
            reason: format!("unknown kind {:?}", raw_kind),
        })?;
        let raw_status = row::text(r, TABLE, "status", 3)?;
        let status = TransactionStatus::parse(&raw_status).ok_or(StorageError::Column {
            table: TABLE,
            column: "status",
            reason: format!("unknown status {:?}", raw_status),
        })?;

        Ok(Self {
            transaction_id: row::integer(r, TABLE, "transaction_id", 0)?,
            telegram_id: row::integer(r, TABLE, "telegram_id", 1)?,
            kind,
            status,
            plan_id: row::opt_integer(r, TABLE, "plan_id", 4)?,
            extra_traffic_plan_id: row::opt_integer(r, TABLE, "extra_traffic_plan_id", 5)?,
            price_toman: row::integer(r, TABLE, "price_toman", 6)?,
            authority: row::text(r, TABLE, "authority", 7)?,
            ref_id: row::opt_integer(r, TABLE, "ref_id", 8)?,
            created_at: row::timestamp(r, TABLE, "created_at", 9)?,
        })
    }
}
