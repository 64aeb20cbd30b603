use chrono::{DateTime, Utc};
use libsql::Row;
use serde::{Deserialize, Serialize};

use crate::storage::{row, StorageError};

const TABLE: &str = "users";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn from_row(r: &Row) -> Result<Self, StorageError> {
        Ok(Self {
            user_id: row::integer(r, TABLE, "user_id", 0)?,
            telegram_id: row::integer(r, TABLE, "telegram_id", 1)?,
            username: row::opt_text(r, TABLE, "username", 2)?,
            first_name: row::opt_text(r, TABLE, "first_name", 3)?,
            last_name: row::opt_text(r, TABLE, "last_name", 4)?,
            is_banned: row::boolean(r, TABLE, "is_banned", 5)?,
            created_at: row::timestamp(r, TABLE, "created_at", 6)?,
        })
    }
}
