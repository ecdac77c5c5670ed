//! The `Venue` capability (§9: "small trait-like capability sets" replacing
//! the teacher's execution-mode class hierarchy). Concrete venue clients
//! (centralized CLOB REST/WS, blockchain CLOB RPC) implement this; the
//! executor engine only ever talks to the trait.

use crate::book::Asset;
use crate::errors::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueOrderStatus {
    Resting,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Failed,
}

impl VenueOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VenueOrderStatus::Filled | VenueOrderStatus::Cancelled | VenueOrderStatus::Rejected | VenueOrderStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderRequest {
    pub asset: Asset,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderHandle {
    pub order_id: String,
    pub status: VenueOrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderState {
    pub status: VenueOrderStatus,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
}

/// Downstream venue order API (§6). `place_order`/`cancel_order` are
/// request-response; `get_order_status` is polled by the executor at
/// `poll_interval_ms`.
#[async_trait::async_trait]
pub trait Venue: Send + Sync {
    fn name(&self) -> &str;

    async fn place_order(&self, request: VenueOrderRequest) -> Result<VenueOrderHandle>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn get_order_status(&self, order_id: &str) -> Result<VenueOrderState>;

    async fn get_balance(&self) -> Result<Decimal>;
}
