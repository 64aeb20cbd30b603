use crate::storage::StorageError;

use super::payment::PaymentError;
use super::transaction::TransactionStatus;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Lookup miss. Expected and non-fatal; callers decide what it means.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A state-machine transition was attempted from a terminal or wrong
    /// state. Not retryable.
    #[error("Transaction {authority} is {from}, cannot mark it {attempted}")]
    InvalidState {
        authority: String,
        from: TransactionStatus,
        attempted: TransactionStatus,
    },

    /// Authority token collision. Retryable with a freshly minted token.
    #[error("Duplicate authority: {0}")]
    DuplicateAuthority(String),

    #[error("Purchase kind {kind} does not match the referenced plan")]
    MismatchedPlanRef { kind: super::transaction::TransactionKind },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),
}

impl ServiceError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the same call with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Storage(e) if e.is_retryable())
    }
}
