//! Order gateway port
//!
//! Translates engine intent into exchange orders. The trait is the seam
//! the engine is tested against; [`binance::BinanceGateway`] is the live
//! adapter.

mod binance;
mod types;
mod user_stream;

pub use binance::BinanceGateway;
pub use types::{OrderUpdate, PositionUpdate, UserStreamEvent};

use crate::candles::Candle;
use crate::error::Result;
use crate::state::TriggerSide;
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::mpsc;

/// Order direction at the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Position side paired with this order side (`BUY→LONG`, `SELL→SHORT`)
    pub fn position_side(self) -> &'static str {
        match self {
            OrderSide::Buy => "LONG",
            OrderSide::Sell => "SHORT",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl From<TriggerSide> for OrderSide {
    fn from(side: TriggerSide) -> Self {
        match side {
            TriggerSide::Long => OrderSide::Buy,
            TriggerSide::Short => OrderSide::Sell,
        }
    }
}

/// Symbol precision from exchange info, cached per process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolPrecision {
    pub price: u32,
    pub quantity: u32,
}

/// Order ids returned by a successful paired entry submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryReceipt {
    pub entry_order_id: i64,
    pub stop_order_id: i64,
}

/// Round a price to the symbol's price precision (nearest)
pub fn round_price(value: Decimal, precision: &SymbolPrecision) -> Decimal {
    value.round_dp(precision.price)
}

/// Round a quantity to the symbol's quantity precision, truncating so the
/// notional never exceeds what was requested
pub fn round_quantity(value: Decimal, precision: &SymbolPrecision) -> Decimal {
    value.round_dp_with_strategy(precision.quantity, RoundingStrategy::ToZero)
}

/// Exchange adapter seam.
///
/// One gateway instance per account; market-data calls are unsigned and
/// any instance can serve them.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Price and quantity precision for a symbol, cached after first fetch
    async fn symbol_precision(&self, symbol: &str) -> Result<SymbolPrecision>;

    /// Submit the paired MARKET entry + protective STOP_MARKET
    /// (closePosition, MARK_PRICE trigger, opposite side) in one batch.
    ///
    /// A failed stop leg after a filled entry surfaces as
    /// `StopLossPlacementFailed`; the caller then closes the position.
    async fn submit_entry_with_stop(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Result<EntryReceipt>;

    /// Install a trailing stop, idempotently: an existing STOP_MARKET at
    /// the same stop price counts as success; otherwise all open orders
    /// for the symbol are cancelled and a fresh stop is submitted.
    async fn place_trail_stop(
        &self,
        symbol: &str,
        position_side: TriggerSide,
        stop_price: Decimal,
    ) -> Result<()>;

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()>;

    /// Close every non-zero position on the symbol with an opposite-side
    /// MARKET order of the rounded absolute quantity
    async fn close_position(&self, symbol: &str) -> Result<()>;

    /// Race guard used before entering: does the exchange already hold a
    /// position for this symbol?
    async fn has_open_position(&self, symbol: &str) -> Result<bool>;

    /// Recent closed candles for startup backfill
    async fn recent_closed_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Subscribe to the account's user stream (fills, position changes)
    async fn subscribe_user_stream(&self) -> Result<mpsc::Receiver<UserStreamEvent>>;
}
