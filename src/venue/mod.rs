//! Execution venue boundary.
//!
//! The engine only observes and commands positions; the venue owns them.
//! Every primitive fails with [`VenueError`], which the engine treats as
//! non-fatal for the current symbol and tick.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bars::{Candle, Timeframe};
use crate::error::VenueError;

mod bridge;
mod paper;

pub use bridge::BridgeVenue;
pub use paper::PaperVenue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position of this side.
    pub fn opening(self) -> Side {
        match self {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        }
    }

    /// Order side that flattens a position of this side.
    pub fn closing(self) -> Side {
        match self {
            PositionSide::Long => Side::Sell,
            PositionSide::Short => Side::Buy,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("Long"),
            PositionSide::Short => f.write_str("Short"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: String,
    pub side: PositionSide,
    pub ticket: u64,
    pub volume: f64,
    pub entry_price: f64,
    pub current_profit: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub symbol: String,
    pub ticket: u64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    /// Price a market order on `side` executes at.
    pub fn price_for(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }
}

/// Static order attributes shared by every command the engine sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTag {
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub tag: OrderTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub symbol: String,
    pub ticket: u64,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub tag: OrderTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub ticket: u64,
    pub price: f64,
}

#[async_trait]
pub trait Venue: Send + Sync {
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: i64,
        to: i64,
    ) -> Result<Vec<Candle>, VenueError>;

    async fn open_positions(&self, symbol: &str) -> Result<Vec<PositionRecord>, VenueError>;

    async fn pending_orders(&self, symbol: &str) -> Result<Vec<PendingOrder>, VenueError>;

    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderAck, VenueError>;

    async fn submit_close(&self, request: &CloseRequest) -> Result<OrderAck, VenueError>;

    /// Replace the position's stop loss, keeping its take profit. `None` removes it.
    async fn modify_stop_loss(
        &self,
        position: &PositionRecord,
        stop_loss: Option<f64>,
    ) -> Result<(), VenueError>;

    async fn current_quote(&self, symbol: &str) -> Result<Quote, VenueError>;
}

/// Run a venue call under a deadline; an elapsed deadline is a failed call.
pub async fn bounded<T, F>(op: &'static str, limit: Duration, call: F) -> Result<T, VenueError>
where
    F: Future<Output = Result<T, VenueError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(VenueError::timeout(op)),
    }
}
