//! Shared fixtures: an in-memory venue that records every call, a capturing
//! notifier and candle builders for known setups.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};

use zonefx::bars::{Candle, Timeframe};
use zonefx::config::Config;
use zonefx::error::VenueError;
use zonefx::notify::{Notice, Notifier, NotifyError};
use zonefx::schedule::Shutdown;
use zonefx::venue::{
    CloseRequest, MarketOrder, OrderAck, PendingOrder, PositionRecord, PositionSide, Quote, Venue,
};

pub const STEP: i64 = 300;
pub const START_TS: i64 = 1_000_000;
pub const WINDOW: usize = 120;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchBars(String),
    OpenPositions(String),
    PendingOrders(String),
    Submit(MarketOrder),
    Close(CloseRequest),
    ModifyStopLoss { ticket: u64, stop_loss: Option<f64> },
    Quote(String),
}

#[derive(Default)]
pub struct RecordingVenue {
    pub bars: Mutex<HashMap<String, Vec<Candle>>>,
    pub positions: Mutex<HashMap<String, Vec<PositionRecord>>>,
    pub pending: Mutex<HashMap<String, Vec<PendingOrder>>>,
    pub calls: Mutex<Vec<Call>>,
    /// Symbols whose position query fails.
    pub broken: Mutex<HashSet<String>>,
    pub reject_orders: Mutex<bool>,
    pub reject_stop_loss: Mutex<bool>,
    /// How long a market order hangs before it is acknowledged.
    pub submit_delay: Mutex<Option<Duration>>,
    /// Triggered from inside `submit_close`.
    pub stop_on_close: Mutex<Option<Shutdown>>,
}

impl RecordingVenue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_bars(&self, symbol: &str, candles: Vec<Candle>) {
        self.bars.lock().unwrap().insert(symbol.to_string(), candles);
    }

    pub fn add_position(&self, position: PositionRecord) {
        self.positions
            .lock()
            .unwrap()
            .entry(position.symbol.clone())
            .or_default()
            .push(position);
    }

    pub fn add_pending(&self, symbol: &str, ticket: u64) {
        self.pending
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .push(PendingOrder { symbol: symbol.to_string(), ticket, volume: 0.01 });
    }

    pub fn break_symbol(&self, symbol: &str) {
        self.broken.lock().unwrap().insert(symbol.to_string());
    }

    pub fn reject_orders(&self) {
        *self.reject_orders.lock().unwrap() = true;
    }

    pub fn reject_stop_loss(&self) {
        *self.reject_stop_loss.lock().unwrap() = true;
    }

    pub fn delay_submits(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    pub fn stop_on_close(&self, shutdown: Shutdown) {
        *self.stop_on_close.lock().unwrap() = Some(shutdown);
    }

    pub fn open_tickets(&self, symbol: &str) -> Vec<u64> {
        self.positions
            .lock()
            .unwrap()
            .get(symbol)
            .map(|list| list.iter().map(|p| p.ticket).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submits(&self) -> Vec<MarketOrder> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> Vec<CloseRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Close(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn stop_loss_changes(&self) -> Vec<(u64, Option<f64>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ModifyStopLoss { ticket, stop_loss } => Some((ticket, stop_loss)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Venue for RecordingVenue {
    async fn fetch_bars(&self, symbol: &str, _: Timeframe, _: i64, _: i64) -> Result<Vec<Candle>, VenueError> {
        self.record(Call::FetchBars(symbol.to_string()));
        Ok(self.bars.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<PositionRecord>, VenueError> {
        self.record(Call::OpenPositions(symbol.to_string()));
        if self.broken.lock().unwrap().contains(symbol) {
            return Err(VenueError::transport("open_positions", "connection reset"));
        }
        Ok(self.positions.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn pending_orders(&self, symbol: &str) -> Result<Vec<PendingOrder>, VenueError> {
        self.record(Call::PendingOrders(symbol.to_string()));
        Ok(self.pending.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderAck, VenueError> {
        self.record(Call::Submit(order.clone()));
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.reject_orders.lock().unwrap() {
            return Err(VenueError::rejected("submit_market_order", "market closed"));
        }
        Ok(OrderAck { ticket: 900, price: order.price })
    }

    async fn submit_close(&self, request: &CloseRequest) -> Result<OrderAck, VenueError> {
        self.record(Call::Close(request.clone()));
        if let Some(shutdown) = self.stop_on_close.lock().unwrap().as_ref() {
            shutdown.trigger();
        }
        if *self.reject_orders.lock().unwrap() {
            return Err(VenueError::rejected("submit_close", "market closed"));
        }
        if let Some(list) = self.positions.lock().unwrap().get_mut(&request.symbol) {
            list.retain(|p| p.ticket != request.ticket);
        }
        Ok(OrderAck { ticket: request.ticket, price: request.price })
    }

    async fn modify_stop_loss(&self, position: &PositionRecord, stop_loss: Option<f64>) -> Result<(), VenueError> {
        self.record(Call::ModifyStopLoss { ticket: position.ticket, stop_loss });
        if *self.reject_stop_loss.lock().unwrap() {
            return Err(VenueError::rejected("modify_stop_loss", "invalid stops"));
        }
        if let Some(list) = self.positions.lock().unwrap().get_mut(&position.symbol) {
            for p in list.iter_mut().filter(|p| p.ticket == position.ticket) {
                p.stop_loss = stop_loss;
            }
        }
        Ok(())
    }

    async fn current_quote(&self, symbol: &str) -> Result<Quote, VenueError> {
        self.record(Call::Quote(symbol.to_string()));
        Ok(Quote { bid: 1.0920, ask: 1.0922 })
    }
}

#[derive(Clone, Default)]
pub struct CapturingNotifier(pub Arc<Mutex<Vec<String>>>);

impl CapturingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push(notice.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Candles
// ---------------------------------------------------------------------------

/// Gently oscillating market with no standout extremes near the end.
pub fn base_candles(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let p = 1.10 + 0.002 * (i as f64 * 0.9).sin();
            Candle { ts: START_TS + i as i64 * STEP, o: p, h: p + 0.002, l: p - 0.002, c: p, v: 10.0 }
        })
        .collect()
}

/// Candle -3 prints the window low on heavy volume; candle -2 is bullish
/// and back above it.
pub fn long_setup() -> Vec<Candle> {
    let mut c = base_candles(WINDOW);
    let n = c.len();
    c[n - 3] = Candle { ts: c[n - 3].ts, o: 1.095, h: 1.096, l: 1.080, c: 1.085, v: 1_000.0 };
    c[n - 2] = Candle { ts: c[n - 2].ts, o: 1.086, h: 1.093, l: 1.085, c: 1.092, v: 10.0 };
    c
}

/// Candle -2 prints the window low on both lookbacks.
pub fn demand_reverse_setup() -> Vec<Candle> {
    let mut c = base_candles(WINDOW);
    let n = c.len();
    c[n - 2] = Candle { ts: c[n - 2].ts, o: 1.095, h: 1.096, l: 1.070, c: 1.090, v: 10.0 };
    c
}

/// Candle -2 prints the window high on both lookbacks.
pub fn supply_reverse_setup() -> Vec<Candle> {
    let mut c = base_candles(WINDOW);
    let n = c.len();
    c[n - 2] = Candle { ts: c[n - 2].ts, o: 1.100, h: 1.130, l: 1.099, c: 1.110, v: 10.0 };
    c
}

/// Clock one full period after the last candle opened, so every candle is closed.
pub fn now_after(candles: &[Candle]) -> DateTime<Utc> {
    let last = candles.last().map(|c| c.ts).unwrap_or(START_TS);
    DateTime::from_timestamp(last + STEP, 0).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn config(symbols: &[&str]) -> Config {
    Config {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        window: WINDOW,
        session_offset_secs: 0,
        venue_timeout_ms: 500,
        ..Config::default()
    }
}

pub fn position(symbol: &str, side: PositionSide, ticket: u64, stop_loss: Option<f64>) -> PositionRecord {
    PositionRecord {
        symbol: symbol.to_string(),
        side,
        ticket,
        volume: 0.01,
        entry_price: 1.0900,
        current_profit: 0.35,
        stop_loss,
        take_profit: Some(1.1000),
    }
}
