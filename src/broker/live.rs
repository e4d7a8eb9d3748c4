// =============================================================================
// Live Adapter — HMAC-signed requests to a real options-broker REST API
// =============================================================================
//
// Signing and request-building style lifted directly from `binance/client.rs`
// (`sign`, `timestamp_ms`, recvWindow tolerance for clock drift); this adapter
// submits options orders instead of spot orders.
//
// OQ2 (adapter timeout during a partial/unknown fill): never silently
// discard — return a `PENDING` `OrderResult` and let `poll_order` resolve it
// in a later reconciliation sweep, adapted from the teacher's
// `reconcile.rs` polling idea.
// =============================================================================

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

use super::{OrderRequest, OrderResult, OrderStatus, Trade};
use crate::error::FlowgateError;

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW_MS: u64 = 5000;
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct LiveAdapter {
    name: String,
    api_key: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl LiveAdapter {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SUBMIT_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            name: name.into(),
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: base_url.into(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_order_body(&self, request: &OrderRequest) -> String {
        let ts = Self::timestamp_ms();
        let direction = match request.direction {
            crate::types::Direction::Call => "CALL",
            crate::types::Direction::Put => "PUT",
        };
        let base = format!(
            "symbol={}&side={}&quantity={}&price={}&timestamp={ts}&recvWindow={RECV_WINDOW_MS}",
            request.occ_symbol, direction, request.quantity, request.reference_price,
        );
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    pub async fn submit_order(
        &self,
        request: OrderRequest,
        base_price: f64,
    ) -> Result<(OrderResult, Option<Trade>), FlowgateError> {
        let body = self.signed_order_body(&request);
        let url = format!("{}/v1/orders?{}", self.base_url, body);

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await;

        let response = match response {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                // OQ2: never silently discard on timeout; report PENDING and
                // let a later reconciliation sweep resolve the true state.
                warn!(symbol = %request.occ_symbol, "order submission timed out, marking PENDING");
                let broker_order_id = format!("pending-{}", Uuid::new_v4());
                let result = OrderResult {
                    success: true,
                    status: OrderStatus::Pending,
                    broker_order_id,
                    filled_quantity: request.quantity,
                    avg_fill_price: base_price,
                };
                return Ok((result, None));
            }
            Err(e) => {
                return Err(FlowgateError::AdapterSubmitFailure(e.to_string()));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            return Err(FlowgateError::AdapterSubmitFailure(format!(
                "broker returned HTTP {status}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FlowgateError::AdapterSubmitFailure(format!("invalid broker response: {e}")))?;

        let broker_order_id = body
            .get("orderId")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let filled_quantity = body
            .get("executedQty")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as u32;

        let avg_fill_price = body.get("avgPrice").and_then(|v| v.as_f64()).unwrap_or(base_price);

        let filled = filled_quantity >= request.quantity;
        let status = if filled {
            OrderStatus::Filled
        } else if filled_quantity > 0 {
            OrderStatus::Pending
        } else {
            OrderStatus::Rejected
        };

        let result = OrderResult {
            success: status != OrderStatus::Rejected,
            status,
            broker_order_id: broker_order_id.clone(),
            filled_quantity,
            avg_fill_price,
        };

        let trade = if filled_quantity > 0 {
            Some(Trade {
                order_id: broker_order_id,
                symbol: request.occ_symbol,
                quantity: filled_quantity,
                price: avg_fill_price,
            })
        } else {
            None
        };

        Ok((result, trade))
    }

    /// Poll the broker for the resolved status of an order left `PENDING`
    /// after a submission timeout (OQ2). Adapted from `reconcile.rs`'s
    /// polling-reconciliation idea.
    pub async fn poll_order(&self, broker_order_id: &str) -> Result<OrderResult, FlowgateError> {
        let ts = Self::timestamp_ms();
        let base = format!("orderId={broker_order_id}&timestamp={ts}&recvWindow={RECV_WINDOW_MS}");
        let sig = self.sign(&base);
        let url = format!("{}/v1/orders/status?{base}&signature={sig}", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|e| FlowgateError::AdapterSubmitFailure(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FlowgateError::AdapterSubmitFailure(format!("invalid broker response: {e}")))?;

        let filled_quantity = body.get("executedQty").and_then(|v| v.as_f64()).unwrap_or(0.0) as u32;
        let requested_quantity = body.get("origQty").and_then(|v| v.as_f64()).unwrap_or(0.0) as u32;
        let avg_fill_price = body.get("avgPrice").and_then(|v| v.as_f64()).unwrap_or(0.0);

        let status = if filled_quantity >= requested_quantity && requested_quantity > 0 {
            OrderStatus::Filled
        } else if filled_quantity > 0 {
            OrderStatus::Pending
        } else {
            OrderStatus::Rejected
        };

        Ok(OrderResult {
            success: status != OrderStatus::Rejected,
            status,
            broker_order_id: broker_order_id.to_string(),
            filled_quantity,
            avg_fill_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_is_deterministic_for_identical_inputs() {
        let adapter = LiveAdapter::new("test-broker", "key", "secret", "https://broker.example");
        let a = adapter.sign("orderId=1&timestamp=1000");
        let b = adapter.sign("orderId=1&timestamp=1000");
        assert_eq!(a, b);
    }

    #[test]
    fn signing_differs_for_different_inputs() {
        let adapter = LiveAdapter::new("test-broker", "key", "secret", "https://broker.example");
        let a = adapter.sign("orderId=1&timestamp=1000");
        let b = adapter.sign("orderId=2&timestamp=1000");
        assert_ne!(a, b);
    }
}
