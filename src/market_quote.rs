// =============================================================================
// Market Quote Client — outbound option-quote lookups
// =============================================================================
//
// `getOptionQuote(underlying, expiration, strike, optionType)` per the
// external-interface contract. Request shape (signed GET, JSON body parsed
// field-by-field with graceful fallbacks) is lifted from `binance/client.rs`'s
// `get_klines`: a plain `reqwest::Client` with a fixed timeout, no HMAC
// signing (quote lookups are a public/read endpoint on the quote service).
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::exit::worker::QuoteFetcher;
use crate::types::{ContractDetails, Direction};

const QUOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bid/ask/mid/last for one option contract.
#[derive(Debug, Clone, Copy)]
pub struct OptionQuote {
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub last: f64,
}

pub struct MarketQuoteClient {
    base_url: String,
    client: reqwest::Client,
}

impl MarketQuoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(QUOTE_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// `getOptionQuote`: fetch the current quote for one OCC contract.
    /// Errors are returned as a `String` reason (matching the Exit Worker's
    /// `QuoteFetcher` shape) rather than a rich error type — the worker only
    /// needs to know whether to skip the position this sweep.
    pub async fn get_option_quote(
        &self,
        underlying: &str,
        expiration: &str,
        strike: f64,
        option_type: &str,
    ) -> Result<OptionQuote, String> {
        let url = format!(
            "{}/v1/quote?underlying={underlying}&expiration={expiration}&strike={strike}&type={option_type}",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("quote request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(format!("quote service returned HTTP {status}"));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("invalid quote response: {e}"))?;

        if body.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let reason = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("quote service reported failure");
            return Err(reason.to_string());
        }

        let data = body
            .get("data")
            .ok_or_else(|| "quote response missing data".to_string())?;

        let bid = data.get("bid").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let ask = data.get("ask").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let last = data.get("last").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let mid = data
            .get("mid")
            .and_then(|v| v.as_f64())
            .unwrap_or_else(|| (bid + ask) / 2.0);

        if mid <= 0.0 {
            warn!(underlying, expiration, strike, "quote service returned a non-positive mid price");
        }

        Ok(OptionQuote { bid, ask, mid, last })
    }
}

/// Adapt a `MarketQuoteClient` into the Exit Worker's `QuoteFetcher` shape,
/// collapsing a full quote down to the mid price the worker evaluates exits
/// against.
pub fn fetcher(client: Arc<MarketQuoteClient>) -> QuoteFetcher {
    Box::new(move |contract: &ContractDetails| {
        let client = client.clone();
        let underlying = contract.underlying.clone();
        let expiration = contract.expiration.clone();
        let strike = contract.strike;
        let option_type = match contract.option_type {
            Direction::Call => "CALL",
            Direction::Put => "PUT",
        };
        Box::pin(async move {
            client
                .get_option_quote(&underlying, &expiration, strike, option_type)
                .await
                .map(|q| q.mid)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_does_not_panic() {
        let _client = MarketQuoteClient::new("https://quotes.example");
    }
}
