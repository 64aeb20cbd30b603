mod zarinpal;

pub use zarinpal::ZarinpalGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Gateway status codes: 100 is a fresh verification, 101 means the payment
/// was verified before (the gateway's own idempotency signal). Anything
/// else is a rejection.
const CODE_VERIFIED: i64 = 100;
const CODE_ALREADY_VERIFIED: i64 = 101;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Gateway API error: {0}")]
    Api(String),
    #[error("Malformed gateway response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Verified,
    AlreadyVerified,
    Failed(i64),
}

impl VerificationStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            CODE_VERIFIED => VerificationStatus::Verified,
            CODE_ALREADY_VERIFIED => VerificationStatus::AlreadyVerified,
            other => VerificationStatus::Failed(other),
        }
    }

    /// Both verified codes settle the purchase as paid; the webhook handler
    /// maps them to `complete` and everything else to `fail`.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Verified | VerificationStatus::AlreadyVerified
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub status: VerificationStatus,
    pub ref_id: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Asks the gateway whether the payment identified by `authority` went
    /// through for the given amount.
    async fn verify(&self, authority: &str, amount_toman: i64) -> Result<Verification, PaymentError>;

    /// Where the user is sent to pay.
    fn payment_url(&self, authority: &str) -> String;
}
