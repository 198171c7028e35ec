//! Paper execution: market data comes from a real feed, orders fill
//! locally at the feed's quote.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    CloseRequest, MarketOrder, OrderAck, PendingOrder, PositionRecord, PositionSide, Quote, Side,
    Venue,
};
use crate::bars::{Candle, Timeframe};
use crate::error::VenueError;

pub struct PaperVenue {
    feed: Arc<dyn Venue>,
    positions: Mutex<Vec<PositionRecord>>,
    next_ticket: AtomicU64,
}

impl PaperVenue {
    pub fn new(feed: Arc<dyn Venue>) -> Self {
        Self {
            feed,
            positions: Mutex::new(Vec::new()),
            next_ticket: AtomicU64::new(1),
        }
    }

    fn book(&self, op: &'static str) -> Result<std::sync::MutexGuard<'_, Vec<PositionRecord>>, VenueError> {
        self.positions
            .lock()
            .map_err(|_| VenueError::rejected(op, "paper book poisoned"))
    }
}

#[async_trait]
impl Venue for PaperVenue {
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: i64,
        to: i64,
    ) -> Result<Vec<Candle>, VenueError> {
        self.feed.fetch_bars(symbol, timeframe, from, to).await
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<PositionRecord>, VenueError> {
        let quote = self.feed.current_quote(symbol).await.ok();
        let mut book = self.book("open_positions")?;
        Ok(book
            .iter_mut()
            .filter(|p| p.symbol == symbol)
            .map(|p| {
                if let Some(q) = quote {
                    let exit = q.price_for(p.side.closing());
                    let sign = match p.side {
                        PositionSide::Long => 1.0,
                        PositionSide::Short => -1.0,
                    };
                    p.current_profit = (exit - p.entry_price) * sign * p.volume;
                }
                p.clone()
            })
            .collect())
    }

    async fn pending_orders(&self, _symbol: &str) -> Result<Vec<PendingOrder>, VenueError> {
        Ok(Vec::new())
    }

    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderAck, VenueError> {
        let quote = self.feed.current_quote(&order.symbol).await?;
        let price = quote.price_for(order.side);
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.book("submit_market_order")?.push(PositionRecord {
            symbol: order.symbol.clone(),
            side: match order.side {
                Side::Buy => PositionSide::Long,
                Side::Sell => PositionSide::Short,
            },
            ticket,
            volume: order.volume,
            entry_price: price,
            current_profit: 0.0,
            stop_loss: Some(order.stop_loss),
            take_profit: Some(order.take_profit),
        });
        Ok(OrderAck { ticket, price })
    }

    async fn submit_close(&self, request: &CloseRequest) -> Result<OrderAck, VenueError> {
        let quote = self.feed.current_quote(&request.symbol).await?;
        let mut book = self.book("submit_close")?;
        let before = book.len();
        book.retain(|p| p.ticket != request.ticket);
        if book.len() == before {
            return Err(VenueError::rejected("submit_close", format!("no position {}", request.ticket)));
        }
        Ok(OrderAck { ticket: request.ticket, price: quote.price_for(request.side) })
    }

    async fn modify_stop_loss(
        &self,
        position: &PositionRecord,
        stop_loss: Option<f64>,
    ) -> Result<(), VenueError> {
        let mut book = self.book("modify_stop_loss")?;
        match book.iter_mut().find(|p| p.ticket == position.ticket) {
            Some(p) => {
                p.stop_loss = stop_loss;
                Ok(())
            }
            None => Err(VenueError::rejected("modify_stop_loss", format!("no position {}", position.ticket))),
        }
    }

    async fn current_quote(&self, symbol: &str) -> Result<Quote, VenueError> {
        self.feed.current_quote(symbol).await
    }
}
