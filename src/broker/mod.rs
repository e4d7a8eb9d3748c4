// =============================================================================
// Broker Adapter — outbound order submission
// =============================================================================
//
// `Adapter` is the seam between the Orchestrator/Exit Worker and whichever
// brokerage connects to the market. `PaperAdapter` simulates fills locally
// (the teacher's demo-mode path in `execution.rs`); `LiveAdapter` forwards
// HMAC-signed requests to a real brokerage REST API (the teacher's
// `binance/client.rs` signing style).
// =============================================================================

pub mod live;
pub mod paper;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::error::FlowgateError;
use crate::types::{AdapterMode, ContractDetails, Direction};
use live::LiveAdapter;
use paper::PaperAdapter;

/// Base delay before the single retry attempt on `AdapterSubmitFailure`.
const RETRY_BASE_DELAY_MS: u64 = 200;
/// Upper bound of the random jitter added on top of the base delay.
const RETRY_JITTER_MS: u64 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "FILLED")]
    Filled,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub occ_symbol: String,
    pub direction: Direction,
    pub quantity: u32,
    /// Reference/limit price used to size the order; adapters may fill at a
    /// different price, reported back in `OrderResult::avg_fill_price`.
    pub reference_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub status: OrderStatus,
    pub broker_order_id: String,
    pub filled_quantity: u32,
    pub avg_fill_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub order_id: String,
    pub symbol: String,
    pub quantity: u32,
    pub price: f64,
}

/// Encode `{UNDERLYING}{YYMMDD}{C|P}{STRIKE*1000, 8-digit zero-pad}` per the
/// OCC option symbology used on every outbound order request.
pub fn occ_symbol(contract: &ContractDetails) -> Result<String, FlowgateError> {
    let expiration = chrono::NaiveDate::parse_from_str(&contract.expiration, "%Y-%m-%d")
        .map_err(|e| FlowgateError::ParseError(format!("invalid expiration date: {e}")))?;
    let date_part = expiration.format("%y%m%d").to_string();
    let side = match contract.option_type {
        Direction::Call => "C",
        Direction::Put => "P",
    };
    let strike_scaled = (contract.strike * 1000.0).round() as u64;
    Ok(format!(
        "{}{}{}{:08}",
        contract.underlying, date_part, side, strike_scaled
    ))
}

/// Outbound order-submission collaborator. Mirrors the teacher's
/// `execution.rs` demo-vs-live branch: one enum, matched internally, instead
/// of a boxed trait object (no `async_trait` dependency needed for a closed
/// two-variant set).
pub enum Adapter {
    Paper(PaperAdapter),
    Live(LiveAdapter),
}

impl Adapter {
    pub fn name(&self) -> &str {
        match self {
            Self::Paper(a) => a.name(),
            Self::Live(a) => a.name(),
        }
    }

    pub fn mode(&self) -> AdapterMode {
        match self {
            Self::Paper(_) => AdapterMode::Paper,
            Self::Live(_) => AdapterMode::Live,
        }
    }

    /// Submit an order and never panic; every failure mode is surfaced as
    /// `FlowgateError::AdapterSubmitFailure`.
    pub async fn submit_order(
        &self,
        request: OrderRequest,
        base_price: f64,
    ) -> Result<(OrderResult, Option<Trade>), FlowgateError> {
        match self {
            Self::Paper(a) => a.submit_order(request, base_price).await,
            Self::Live(a) => a.submit_order(request, base_price).await,
        }
    }

    /// Submit an order, retrying at most once with a jittered backoff on
    /// `AdapterSubmitFailure`. Callers are expected to persist a REJECTED
    /// order record if this still returns `Err` after the retry.
    pub async fn submit_order_with_retry(
        &self,
        request: OrderRequest,
        base_price: f64,
    ) -> Result<(OrderResult, Option<Trade>), FlowgateError> {
        let occ_symbol = request.occ_symbol.clone();
        retry_once(&occ_symbol, || self.submit_order(request.clone(), base_price)).await
    }
}

/// Run `attempt` once; on failure, sleep a jittered backoff and run it one
/// more time. Factored out of `Adapter::submit_order_with_retry` so the
/// retry/backoff behavior itself is testable without a real adapter.
async fn retry_once<F, Fut>(occ_symbol: &str, mut attempt: F) -> Result<(OrderResult, Option<Trade>), FlowgateError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(OrderResult, Option<Trade>), FlowgateError>>,
{
    match attempt().await {
        Ok(result) => Ok(result),
        Err(first_err) => {
            let jitter = rand::rng().random_range(0..=RETRY_JITTER_MS);
            let delay = Duration::from_millis(RETRY_BASE_DELAY_MS + jitter);
            warn!(
                occ_symbol = %occ_symbol,
                reason = %first_err,
                delay_ms = delay.as_millis() as u64,
                "order submission failed, retrying once after backoff"
            );
            sleep(delay).await;
            attempt().await
        }
    }
}
