//! Unshielding Fee Estimate
//!
//! A fixed-size heuristic: a two-input, two-output transaction priced at the
//! current fee rate, plus 15% headroom.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

pub const VBYTES_PER_INPUT: f64 = 192.25;
pub const VBYTES_PER_OUTPUT: f64 = 43.0;
pub const VBYTES_OVERHEAD: f64 = 10.75;
pub const OVERPAY_FACTOR: f64 = 1.15;

#[derive(Debug, Error)]
pub enum FeeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fee endpoint returned HTTP {0}")]
    Status(u16),

    #[error("fee estimation is not configured")]
    NotConfigured,
}

#[derive(Debug, Deserialize)]
struct FeeRateResponse {
    #[serde(rename = "Result")]
    result: f64,
}

/// Estimated unshielding fee in satoshis for `sats_per_vbyte`
pub fn estimate_from_fee_rate(sats_per_vbyte: f64) -> f64 {
    let vbytes = 2.0 * VBYTES_PER_INPUT + 2.0 * VBYTES_PER_OUTPUT + VBYTES_OVERHEAD;
    sats_per_vbyte * vbytes * OVERPAY_FACTOR
}

/// Fetches the current fee rate from an HTTP endpoint
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    client: Client,
    url: String,
}

impl FeeEstimator {
    pub fn new(url: &str) -> Result<Self, FeeError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Current fee rate in sat/vB
    pub async fn fee_rate(&self) -> Result<f64, FeeError> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(FeeError::Status(resp.status().as_u16()));
        }
        let body: FeeRateResponse = resp.json().await?;
        Ok(body.result)
    }

    pub async fn estimate(&self) -> Result<f64, FeeError> {
        let rate = self.fee_rate().await?;
        let fee = estimate_from_fee_rate(rate);
        tracing::debug!(target: "shield::fee", rate, fee, "estimated unshielding fee");
        Ok(fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};

    async fn spawn_fee_api(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/fee", addr)
    }

    #[test]
    fn test_heuristic() {
        // 2 * 192.25 + 2 * 43 + 10.75 = 481.25 vB
        let fee = estimate_from_fee_rate(10.0);
        assert!((fee - 481.25 * 10.0 * 1.15).abs() < 1e-9);
        assert_eq!(estimate_from_fee_rate(0.0), 0.0);
    }

    #[tokio::test]
    async fn test_estimate_from_endpoint() {
        let app = Router::new().route(
            "/fee",
            get(|| async { Json(serde_json::json!({"Result": 2.0})) }),
        );
        let estimator = FeeEstimator::new(&spawn_fee_api(app).await).unwrap();

        assert_eq!(estimator.fee_rate().await.unwrap(), 2.0);
        let fee = estimator.estimate().await.unwrap();
        assert!((fee - estimate_from_fee_rate(2.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_endpoint_failure() {
        let app = Router::new().route("/fee", get(|| async { StatusCode::BAD_GATEWAY }));
        let estimator = FeeEstimator::new(&spawn_fee_api(app).await).unwrap();

        assert!(matches!(
            estimator.estimate().await,
            Err(FeeError::Status(502))
        ));
    }
}
