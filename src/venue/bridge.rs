//! HTTP client for a terminal bridge exposing the venue primitives as JSON
//! endpoints. The bridge holds the authenticated terminal session; this
//! client only needs its base URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    CloseRequest, MarketOrder, OrderAck, PendingOrder, PositionRecord, PositionSide, Quote, Side,
    Venue,
};
use crate::bars::{Candle, Timeframe};
use crate::error::VenueError;

/// Terminal return code for a completed trade request.
const RETCODE_DONE: i64 = 10009;

pub struct BridgeVenue {
    client: Client,
    base: String,
}

impl BridgeVenue {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, VenueError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VenueError::transport("connect", e.to_string()))?;
        Ok(Self { client, base: base.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn send<T: DeserializeOwned>(&self, op: &'static str, req: RequestBuilder) -> Result<T, VenueError> {
        let resp = req.send().await.map_err(|e| VenueError::from_reqwest(op, e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| VenueError::from_reqwest(op, e))?;
        if !status.is_success() {
            #[derive(Deserialize)]
            struct BridgeError {
                error: String,
            }
            let reason = serde_json::from_str::<BridgeError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(VenueError::rejected(op, format!("http {}: {}", status.as_u16(), reason)));
        }
        serde_json::from_str(&body).map_err(|e| VenueError::decode(op, e.to_string()))
    }

    async fn trade(&self, op: &'static str, body: serde_json::Value) -> Result<OrderAck, VenueError> {
        let result: TradeResult = self.send(op, self.client.post(self.url("order")).json(&body)).await?;
        if result.retcode != RETCODE_DONE {
            return Err(VenueError::rejected(
                op,
                format!("retcode {}: {}", result.retcode, result.comment),
            ));
        }
        Ok(OrderAck { ticket: result.order, price: result.price })
    }
}

#[derive(Deserialize, Debug)]
struct BridgeRate {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    tick_volume: f64,
}

#[derive(Deserialize, Debug)]
struct BridgePosition {
    ticket: u64,
    symbol: String,
    /// 0 = buy, 1 = sell
    #[serde(rename = "type")]
    kind: u8,
    volume: f64,
    price_open: f64,
    profit: f64,
    #[serde(default)]
    sl: f64,
    #[serde(default)]
    tp: f64,
}

#[derive(Deserialize, Debug)]
struct BridgeOrder {
    ticket: u64,
    symbol: String,
    volume_current: f64,
}

#[derive(Deserialize, Debug)]
struct BridgeTick {
    bid: f64,
    ask: f64,
}

#[derive(Deserialize, Debug)]
struct TradeResult {
    retcode: i64,
    #[serde(default)]
    order: u64,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    comment: String,
}

#[derive(Serialize)]
struct RatesQuery<'a> {
    symbol: &'a str,
    timeframe: &'a str,
    from: i64,
    to: i64,
}

fn order_type(side: Side) -> u8 {
    match side {
        Side::Buy => 0,
        Side::Sell => 1,
    }
}

/// Terminal convention: a zero price level means "not set".
fn level(value: f64) -> Option<f64> {
    if value > 0.0 { Some(value) } else { None }
}

impl From<BridgePosition> for PositionRecord {
    fn from(p: BridgePosition) -> Self {
        PositionRecord {
            symbol: p.symbol,
            side: if p.kind == 0 { PositionSide::Long } else { PositionSide::Short },
            ticket: p.ticket,
            volume: p.volume,
            entry_price: p.price_open,
            current_profit: p.profit,
            stop_loss: level(p.sl),
            take_profit: level(p.tp),
        }
    }
}

#[async_trait]
impl Venue for BridgeVenue {
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: i64,
        to: i64,
    ) -> Result<Vec<Candle>, VenueError> {
        let query = RatesQuery { symbol, timeframe: timeframe.as_str(), from, to };
        let rates: Vec<BridgeRate> = self
            .send("fetch_bars", self.client.get(self.url("rates")).query(&query))
            .await?;
        Ok(rates
            .into_iter()
            .map(|r| Candle { ts: r.time, o: r.open, h: r.high, l: r.low, c: r.close, v: r.tick_volume })
            .collect())
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<PositionRecord>, VenueError> {
        let rows: Vec<BridgePosition> = self
            .send("open_positions", self.client.get(self.url("positions")).query(&[("symbol", symbol)]))
            .await?;
        Ok(rows.into_iter().map(PositionRecord::from).collect())
    }

    async fn pending_orders(&self, symbol: &str) -> Result<Vec<PendingOrder>, VenueError> {
        let rows: Vec<BridgeOrder> = self
            .send("pending_orders", self.client.get(self.url("orders")).query(&[("symbol", symbol)]))
            .await?;
        Ok(rows
            .into_iter()
            .map(|o| PendingOrder { symbol: o.symbol, ticket: o.ticket, volume: o.volume_current })
            .collect())
    }

    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderAck, VenueError> {
        let body = json!({
            "action": "deal",
            "symbol": order.symbol,
            "volume": order.volume,
            "type": order_type(order.side),
            "price": order.price,
            "sl": order.stop_loss,
            "tp": order.take_profit,
            "deviation": order.tag.deviation,
            "magic": order.tag.magic,
            "comment": order.tag.comment,
            "type_time": "gtc",
            "type_filling": "ioc",
        });
        self.trade("submit_market_order", body).await
    }

    async fn submit_close(&self, request: &CloseRequest) -> Result<OrderAck, VenueError> {
        let body = json!({
            "action": "deal",
            "position": request.ticket,
            "symbol": request.symbol,
            "volume": request.volume,
            "type": order_type(request.side),
            "price": request.price,
            "deviation": request.tag.deviation,
            "magic": request.tag.magic,
            "comment": request.tag.comment,
            "type_time": "gtc",
            "type_filling": "ioc",
        });
        self.trade("submit_close", body).await
    }

    async fn modify_stop_loss(
        &self,
        position: &PositionRecord,
        stop_loss: Option<f64>,
    ) -> Result<(), VenueError> {
        let body = json!({
            "action": "sltp",
            "symbol": position.symbol,
            "position": position.ticket,
            "sl": stop_loss.unwrap_or(0.0),
            "tp": position.take_profit.unwrap_or(0.0),
        });
        self.trade("modify_stop_loss", body).await.map(|_| ())
    }

    async fn current_quote(&self, symbol: &str) -> Result<Quote, VenueError> {
        let tick: BridgeTick = self
            .send("current_quote", self.client.get(self.url("tick")).query(&[("symbol", symbol)]))
            .await?;
        Ok(Quote { bid: tick.bid, ask: tick.ask })
    }
}
