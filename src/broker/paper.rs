// =============================================================================
// Paper Adapter — simulated fills, no outbound network calls
// =============================================================================
//
// Mirrors the teacher's demo-mode branch in `execution.rs`: orders "fill"
// immediately at the reference price with no exchange round-trip.
// =============================================================================

use uuid::Uuid;

use super::{OrderRequest, OrderResult, OrderStatus, Trade};
use crate::error::FlowgateError;

pub struct PaperAdapter {
    name: String,
}

impl Default for PaperAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperAdapter {
    pub fn new() -> Self {
        Self {
            name: "paper".to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn submit_order(
        &self,
        request: OrderRequest,
        base_price: f64,
    ) -> Result<(OrderResult, Option<Trade>), FlowgateError> {
        let broker_order_id = format!("paper-{}", Uuid::new_v4());

        let result = OrderResult {
            success: true,
            status: OrderStatus::Filled,
            broker_order_id: broker_order_id.clone(),
            filled_quantity: request.quantity,
            avg_fill_price: base_price,
        };

        let trade = Trade {
            order_id: broker_order_id,
            symbol: request.occ_symbol,
            quantity: request.quantity,
            price: base_price,
        };

        Ok((result, Some(trade)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    #[tokio::test]
    async fn fills_immediately_at_reference_price() {
        let adapter = PaperAdapter::new();
        let request = OrderRequest {
            occ_symbol: "SPY260821C00450000".to_string(),
            direction: Direction::Call,
            quantity: 2,
            reference_price: 5.0,
        };

        let (result, trade) = adapter.submit_order(request, 5.0).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.filled_quantity, 2);
        assert_eq!(result.avg_fill_price, 5.0);
        assert!(trade.is_some());
    }
}
