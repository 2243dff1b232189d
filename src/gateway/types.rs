//! User-stream event types delivered by the gateway

use rust_decimal::Decimal;

/// Events from the exchange user websocket, already parsed off the wire
#[derive(Debug, Clone)]
pub enum UserStreamEvent {
    /// `ACCOUNT_UPDATE`: position balances changed
    AccountUpdate(Vec<PositionUpdate>),
    /// `ORDER_TRADE_UPDATE`: an order's lifecycle advanced
    OrderUpdate(OrderUpdate),
}

/// One updated position inside an `ACCOUNT_UPDATE`
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub symbol: String,
    /// Signed size; zero means the exchange reports flat
    pub position_amount: Decimal,
    pub entry_price: Decimal,
    pub position_side: String,
}

impl PositionUpdate {
    pub fn is_flat(&self) -> bool {
        self.position_amount.is_zero()
    }
}

/// An `ORDER_TRADE_UPDATE` payload
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub symbol: String,
    pub order_status: String,
    pub order_type: String,
    pub average_price: Decimal,
    pub stop_price: Decimal,
    pub last_filled_price: Decimal,
}

impl OrderUpdate {
    pub fn is_filled(&self) -> bool {
        self.order_status == "FILLED"
    }
}
