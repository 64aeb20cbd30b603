use libsql::Error as TursoError;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CONSTRAINT: i32 = 19;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Turso error: {0}")]
    Turso(TursoError),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Bad column {table}.{column}: {reason}")]
    Column {
        table: &'static str,
        column: &'static str,
        reason: String,
    },
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StorageError {
    /// Failures the caller may retry with backoff (lock contention,
    /// connectivity). Constraint conflicts are retryable only with new input
    /// and are reported separately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, StorageError::Constraint(_))
    }
}

impl From<TursoError> for StorageError {
    fn from(error: TursoError) -> Self {
        match error {
            TursoError::SqliteFailure(code, message) => match code & 0xff {
                SQLITE_CONSTRAINT => StorageError::Constraint(message),
                SQLITE_BUSY | SQLITE_LOCKED => StorageError::Unavailable(message),
                _ => StorageError::Turso(TursoError::SqliteFailure(code, message)),
            },
            TursoError::ConnectionFailed(message) => StorageError::Unavailable(message),
            other => StorageError::Turso(other),
        }
    }
}
