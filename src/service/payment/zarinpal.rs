use async_trait::async_trait;
use reqwest::Client;

use crate::config::PaymentConfig;

use super::{PaymentError, PaymentGateway, Verification, VerificationStatus};

pub struct ZarinpalGateway {
    client: Client,
    config: PaymentConfig,
}

impl ZarinpalGateway {
    pub fn new(config: PaymentConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn start_pay_host(&self) -> &'static str {
        if self.config.sandbox {
            "https://sandbox.zarinpal.com"
        } else {
            "https://payment.zarinpal.com"
        }
    }
}

#[async_trait]
impl PaymentGateway for ZarinpalGateway {
    async fn verify(
        &self,
        authority: &str,
        amount_toman: i64,
    ) -> Result<Verification, PaymentError> {
        let response = self
            .client
            .post(format!("{}/verify.json", self.config.base_url()))
            .json(&serde_json::json!({
                "merchant_id": self.config.merchant_id,
                "amount": amount_toman,
                "authority": authority,
            }))
            .send()
            .await
            .map_err(|e| PaymentError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Api(format!(
                "Verify request for {} failed: {}",
                authority,
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Malformed(e.to_string()))?;

        // On rejection the gateway moves the code into the errors object.
        let code = body["data"]["code"]
            .as_i64()
            .or_else(|| body["errors"]["code"].as_i64())
            .ok_or_else(|| PaymentError::Malformed("status code missing".to_string()))?;
        let ref_id = body["data"]["ref_id"].as_i64();

        Ok(Verification {
            status: VerificationStatus::from_code(code),
            ref_id,
        })
    }

    fn payment_url(&self, authority: &str) -> String {
        format!("{}/pg/StartPay/{}", self.start_pay_host(), authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(sandbox: bool) -> ZarinpalGateway {
        ZarinpalGateway::new(PaymentConfig {
            merchant_id: "merchant".to_string(),
            sandbox,
            callback_url: "https://example.com/verify".to_string(),
        })
    }

    #[test]
    fn payment_url_embeds_the_authority() {
        let url = gateway(true).payment_url("A123");
        assert_eq!(url, "https://sandbox.zarinpal.com/pg/StartPay/A123");
        assert!(gateway(false).payment_url("A123").contains("payment.zarinpal.com"));
    }
}
