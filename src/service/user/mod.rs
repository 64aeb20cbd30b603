mod model;

pub use model::User;

use chrono::Utc;
use libsql::params;

use crate::storage::{row, Database};

use super::ServiceError;

const COLUMNS: &str = "user_id, telegram_id, username, first_name, last_name, is_banned, created_at";

/// User identity operations. Users are created on first contact and never
/// deleted; profile fields follow whatever Telegram reports last.
#[derive(Clone)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn upsert_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<User, ServiceError> {
        let sql = format!(
            "INSERT INTO users (telegram_id, username, first_name, last_name, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (telegram_id) DO UPDATE SET \
                 username = excluded.username, \
                 first_name = excluded.first_name, \
                 last_name = excluded.last_name \
             RETURNING {COLUMNS}"
        );
        let r = self
            .db
            .fetch_one(
                &sql,
                params![
                    telegram_id,
                    username,
                    first_name,
                    last_name,
                    row::format_ts(Utc::now())
                ],
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("user", telegram_id))?;
        Ok(User::from_row(&r)?)
    }

    pub async fn get_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, ServiceError> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE telegram_id = ?1");
        match self.db.fetch_one(&sql, params![telegram_id]).await? {
            Some(r) => Ok(Some(User::from_row(&r)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, ServiceError> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE username = ?1");
        match self.db.fetch_one(&sql, params![username]).await? {
            Some(r) => Ok(Some(User::from_row(&r)?)),
            None => Ok(None),
        }
    }

    pub async fn is_banned(&self, telegram_id: i64) -> Result<bool, ServiceError> {
        let value = self
            .db
            .fetch_scalar(
                "SELECT is_banned FROM users WHERE telegram_id = ?1",
                params![telegram_id],
            )
            .await?;
        Ok(matches!(value, Some(libsql::Value::Integer(v)) if v != 0))
    }

    pub async fn ban(&self, telegram_id: i64) -> Result<bool, ServiceError> {
        let changed = self
            .db
            .execute(
                "UPDATE users SET is_banned = 1 WHERE telegram_id = ?1",
                params![telegram_id],
            )
            .await?;
        Ok(changed == 1)
    }

    pub async fn unban(&self, telegram_id: i64) -> Result<bool, ServiceError> {
        let changed = self
            .db
            .execute(
                "UPDATE users SET is_banned = 0 WHERE telegram_id = ?1",
                params![telegram_id],
            )
            .await?;
        Ok(changed == 1)
    }
}
