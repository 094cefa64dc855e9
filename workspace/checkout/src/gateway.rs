//! Gateway adapter: builds the redirect form the buyer's browser posts to
//! the gateway, and the server-to-server verification predicate consulted
//! before any callback is trusted.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{CheckoutError, Result};
use crate::intent::CheckoutIntent;

/// Merchant-side settings for the redirect-based checkout.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// The gateway page the browser form-posts to.
    pub checkout_url: String,
    /// The gateway's server-to-server verification endpoint.
    pub verify_url: String,
    pub merchant_id: String,
    pub success_url: String,
    pub failure_url: String,
}

/// The exact outbound field set the gateway's redirect checkout expects.
/// Service, delivery and tax charges are always zero for digital courses.
#[derive(Debug, Clone, Serialize)]
pub struct RedirectForm {
    /// Item amount
    pub amt: Decimal,
    /// Service charge
    pub psc: Decimal,
    /// Delivery charge
    pub pdc: Decimal,
    /// Tax amount
    #[serde(rename = "txAmt")]
    pub tx_amt: Decimal,
    /// Grand total
    #[serde(rename = "tAmt")]
    pub t_amt: Decimal,
    /// Transaction id
    pub pid: String,
    /// Merchant id
    pub scd: String,
    /// Success return URL
    pub su: String,
    /// Failure return URL
    pub fu: String,
}

impl RedirectForm {
    /// Build the redirect parameter set for a checkout intent.
    pub fn build(intent: &CheckoutIntent, config: &GatewayConfig) -> Self {
        Self {
            amt: intent.total,
            psc: Decimal::ZERO,
            pdc: Decimal::ZERO,
            tx_amt: Decimal::ZERO,
            t_amt: intent.total,
            pid: intent.transaction_id.clone(),
            scd: config.merchant_id.clone(),
            su: config.success_url.clone(),
            fu: config.failure_url.clone(),
        }
    }
}

/// Decides whether a claimed payment is genuine.
///
/// The policy is "verify, then trust": implementations must consult the
/// gateway authoritatively and fail closed on any mismatch, timeout or
/// missing field. Checking that callback fields are merely present is not
/// verification.
#[async_trait]
pub trait GatewayVerifier: Send + Sync + std::fmt::Debug {
    /// Returns Ok(true) only when the gateway confirms the transaction id,
    /// amount and reference id it captured.
    async fn verify(
        &self,
        transaction_id: &str,
        amount: Decimal,
        reference_id: &str,
    ) -> Result<bool>;
}

/// What the gateway's verification endpoint reports for a transaction.
#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default)]
    amt: Option<Decimal>,
    #[serde(default)]
    rid: Option<String>,
}

/// Production verifier: POSTs the claimed details to the gateway's
/// verification endpoint and compares what the gateway reports.
#[derive(Debug, Clone)]
pub struct HttpGatewayVerifier {
    client: reqwest::Client,
    verify_url: String,
    merchant_id: String,
}

impl HttpGatewayVerifier {
    pub fn new(config: &GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            verify_url: config.verify_url.clone(),
            merchant_id: config.merchant_id.clone(),
        }
    }
}

#[async_trait]
impl GatewayVerifier for HttpGatewayVerifier {
    #[instrument(skip(self))]
    async fn verify(
        &self,
        transaction_id: &str,
        amount: Decimal,
        reference_id: &str,
    ) -> Result<bool> {
        let params = [
            ("pid", transaction_id.to_string()),
            ("amt", amount.to_string()),
            ("rid", reference_id.to_string()),
            ("scd", self.merchant_id.clone()),
        ];

        let response = self
            .client
            .post(&self.verify_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CheckoutError::Gateway(format!("verification request failed: {e}")))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "gateway verification endpoint returned error status");
            return Ok(false);
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::Gateway(format!("malformed verification response: {e}")))?;

        // Missing fields count as rejection: the endpoint must echo the
        // amount and reference it captured for the comparison to mean
        // anything.
        let amount_matches = body.amt == Some(amount);
        let reference_matches = body.rid.as_deref() == Some(reference_id);
        let genuine = body.success && amount_matches && reference_matches;

        debug!(
            genuine,
            amount_matches, reference_matches, "gateway verification result"
        );
        Ok(genuine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::CheckoutLine;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            checkout_url: "https://gateway.test/epay/main".to_string(),
            verify_url: "https://gateway.test/epay/transrec".to_string(),
            merchant_id: "MERCHANT-1".to_string(),
            success_url: "http://localhost:3000/api/v1/payments/success".to_string(),
            failure_url: "http://localhost:3000/api/v1/payments/failure".to_string(),
        }
    }

    #[test]
    fn redirect_form_carries_total_and_zero_charges() {
        let intent = CheckoutIntent {
            transaction_id: "txn-1".to_string(),
            total: Decimal::new(13000, 1), // 1300.0
            lines: vec![
                CheckoutLine {
                    course_id: 1,
                    amount: Decimal::new(5000, 1),
                },
                CheckoutLine {
                    course_id: 2,
                    amount: Decimal::new(8000, 1),
                },
            ],
        };

        let form = RedirectForm::build(&intent, &test_config());

        assert_eq!(form.amt, intent.total);
        assert_eq!(form.t_amt, intent.total);
        assert_eq!(form.psc, Decimal::ZERO);
        assert_eq!(form.pdc, Decimal::ZERO);
        assert_eq!(form.tx_amt, Decimal::ZERO);
        assert_eq!(form.pid, "txn-1");
        assert_eq!(form.scd, "MERCHANT-1");
    }

    #[test]
    fn redirect_form_serializes_gateway_field_names() {
        let intent = CheckoutIntent {
            transaction_id: "txn-2".to_string(),
            total: Decimal::new(500, 0),
            lines: vec![],
        };
        let value = serde_json::to_value(RedirectForm::build(&intent, &test_config())).unwrap();

        // The wire names are the gateway's, not ours.
        assert!(value.get("txAmt").is_some());
        assert!(value.get("tAmt").is_some());
        assert!(value.get("pid").is_some());
        assert!(value.get("su").is_some());
        assert!(value.get("fu").is_some());
    }
}
