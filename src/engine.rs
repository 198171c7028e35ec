//! The trading engine: one explicit instance holding configuration and
//! collaborators, driven tick by tick by [`Engine::run`].
//!
//! Symbols are evaluated strictly in configured order and one at a time.
//! A failure on one symbol is logged and the pass moves on; nothing is
//! retried before the next tick.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveTime, Utc};

use crate::bars::{BarSource, BarWindow};
use crate::config::Config;
use crate::error::{EngineError, EngineResult, VenueError};
use crate::indicators::IndicatorSnapshot;
use crate::journal::{intent_id, Journal, JournalEntry};
use crate::logging::{
    log, log_command, log_command_failed, log_indicators, log_phase, log_position_profit,
    log_signal, log_stop_loss, log_symbol_skipped, log_tick_summary, obj, v_str, Domain, Level,
};
use crate::notify::{Notice, Notifier};
use crate::position::{decide, next_state, Decision, PositionState};
use crate::risk::RiskLevels;
use crate::schedule::{RotatingCounter, SessionCalendar, SessionPhase, Shutdown, Ticker};
use crate::signals::{detect_entry, detect_reverse};
use crate::venue::{bounded, CloseRequest, MarketOrder, OrderTag, PositionRecord, PositionSide, Venue};
use crate::zones::ZoneMap;

/// What one pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub phase: SessionPhase,
    pub symbols_evaluated: usize,
    pub symbols_skipped: usize,
    pub commands: usize,
    pub failures: usize,
    /// A stop request ended the pass before the last symbol.
    pub interrupted: bool,
}

impl TickReport {
    fn new(phase: SessionPhase) -> Self {
        Self {
            phase,
            symbols_evaluated: 0,
            symbols_skipped: 0,
            commands: 0,
            failures: 0,
            interrupted: false,
        }
    }

    fn absorb(&mut self, outcome: SymbolOutcome) {
        self.symbols_evaluated += 1;
        self.commands += outcome.commands;
        self.failures += outcome.failures;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SymbolOutcome {
    commands: usize,
    failures: usize,
}

impl SymbolOutcome {
    fn tally(&mut self, ok: bool) {
        if ok {
            self.commands += 1;
        } else {
            self.failures += 1;
        }
    }
}

pub struct Engine {
    config: Config,
    venue: Arc<dyn Venue>,
    notifier: Arc<dyn Notifier>,
    journal: Option<Mutex<Journal>>,
    bars: BarSource,
    calendar: SessionCalendar,
    tag: OrderTag,
    timeout: Duration,
    shutdown: Shutdown,
    /// The paused notice went out for the current de-risk window.
    paused_notice_sent: bool,
}

impl Engine {
    pub fn new(config: Config, venue: Arc<dyn Venue>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            bars: config.bar_source(),
            calendar: config.calendar(),
            tag: config.order_tag(),
            timeout: config.venue_timeout(),
            config,
            venue,
            notifier,
            journal: None,
            shutdown: Shutdown::new(),
            paused_notice_sent: false,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(Mutex::new(journal));
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Loop until a stop request. The full tick period elapses between
    /// passes; a stop request lands after the current symbol completes.
    pub async fn run(&mut self) {
        log(
            Level::Info,
            Domain::System,
            "engine_start",
            obj(&[
                ("symbols", serde_json::json!(self.config.symbols)),
                ("timeframe", v_str(self.config.timeframe.as_str())),
                ("tick_secs", serde_json::json!(self.config.tick_secs)),
            ]),
        );
        self.notify(Notice::Scanning(self.config.symbols.clone())).await;

        let ticker = Ticker::new(self.config.tick_period(), self.shutdown.clone());
        let mut counter = RotatingCounter::default();
        loop {
            let report = self.run_tick(Utc::now(), Local::now().time(), counter.get()).await;
            if report.interrupted || !ticker.wait().await {
                break;
            }
            counter.advance();
        }

        self.notify(Notice::Stopping).await;
        log(Level::Info, Domain::System, "engine_stop", obj(&[]));
    }

    /// One pass over the universe. `wall` is the local wall-clock time the
    /// risk windows are expressed in; `counter` is carried for staggering
    /// and does not affect any decision.
    pub async fn run_tick(&mut self, now: DateTime<Utc>, wall: NaiveTime, counter: u8) -> TickReport {
        let started = Instant::now();
        let phase = self.calendar.phase_at(wall);
        log_phase(phase.as_str(), counter);

        if phase != SessionPhase::DeRisk {
            self.paused_notice_sent = false;
        }

        let mut report = TickReport::new(phase);
        let symbols = self.config.symbols.clone();
        for symbol in &symbols {
            if self.shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }
            let result = match phase {
                SessionPhase::DeRisk => self.strip_stop_losses(symbol, now).await,
                SessionPhase::ReRisk => self.restore_stop_losses(symbol, now).await,
                SessionPhase::Normal if self.config.close_all => self.close_everything(symbol, now).await,
                SessionPhase::Normal => self.evaluate_symbol(symbol, now).await,
            };
            match result {
                Ok(outcome) => report.absorb(outcome),
                Err(err) => {
                    report.symbols_skipped += 1;
                    if err.skips_symbol() {
                        log_symbol_skipped(symbol, &err.to_string());
                    } else {
                        log(
                            Level::Error,
                            Domain::System,
                            "symbol_failed",
                            obj(&[("symbol", v_str(symbol)), ("reason", v_str(&err.to_string()))]),
                        );
                    }
                }
            }
        }

        if phase == SessionPhase::DeRisk && !self.paused_notice_sent {
            let resume = self.calendar.derisk.end.format("%H:%M").to_string();
            self.notify(Notice::StartingAgain(resume)).await;
            self.paused_notice_sent = true;
        }

        log_tick_summary(
            phase.as_str(),
            report.symbols_evaluated,
            report.commands,
            report.failures,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        report
    }

    // -------------------------------------------------------------------------
    // Normal phase
    // -------------------------------------------------------------------------

    async fn evaluate_symbol(&self, symbol: &str, now: DateTime<Utc>) -> EngineResult<SymbolOutcome> {
        let window = self.window(symbol, now).await?;
        let snapshot = IndicatorSnapshot::compute(&window)?;
        let zones = ZoneMap::compute(&window);
        let entry = detect_entry(&window, &zones, &snapshot.liquidity, self.config.liquidity_tolerance);
        let reverse = detect_reverse(&zones);
        let levels = RiskLevels::compute(&window, &snapshot, self.config.multipliers());

        log_indicators(
            symbol,
            snapshot.atr,
            snapshot.rsi.last.unwrap_or(f64::NAN),
            snapshot.liquidity.last,
            snapshot.liquidity.peak_close,
        );
        log_signal(
            symbol,
            entry.as_str(),
            reverse.as_str(),
            zones.short_back(3).as_str(),
            zones.long_back(3).as_str(),
        );

        let positions = self.positions(symbol).await?;
        let pending = bounded("pending_orders", self.timeout, self.venue.pending_orders(symbol)).await?;
        self.report_profit(symbol, &positions);

        let state = PositionState::observe(&positions);
        let decision = decide(state, pending.len(), entry, reverse);
        let bar_ts = window.back(2).ts;

        let mut outcome = SymbolOutcome::default();
        match decision {
            Decision::Hold => {}
            Decision::Open { side } => {
                let ticket = self.open(symbol, side, &levels, bar_ts).await;
                outcome.tally(ticket.is_some());
                if let Some(t) = ticket {
                    let after = next_state(state, decision, Some(t));
                    log(
                        Level::Debug,
                        Domain::Strategy,
                        "transition",
                        obj(&[("symbol", v_str(symbol)), ("state", serde_json::json!(after))]),
                    );
                }
            }
            Decision::Close { side, ticket } => {
                let volume = positions
                    .iter()
                    .find(|p| p.ticket == ticket)
                    .map(|p| p.volume)
                    .unwrap_or(self.config.volume);
                let closed = self.close(symbol, side, ticket, volume, bar_ts, true).await;
                outcome.tally(closed);
                if closed {
                    let after = next_state(state, decision, None);
                    log(
                        Level::Debug,
                        Domain::Strategy,
                        "transition",
                        obj(&[("symbol", v_str(symbol)), ("state", serde_json::json!(after))]),
                    );
                }
            }
        }
        Ok(outcome)
    }

    /// Submit a market entry; returns the venue ticket on success.
    async fn open(&self, symbol: &str, side: PositionSide, levels: &RiskLevels, bar_ts: i64) -> Option<u64> {
        let action = match side {
            PositionSide::Long => "open_long",
            PositionSide::Short => "open_short",
        };
        let id = intent_id(symbol, bar_ts, action);
        let (stop_loss, take_profit) = match side {
            PositionSide::Long => (levels.stop_loss_long, levels.take_profit_long),
            PositionSide::Short => (levels.stop_loss_short, levels.take_profit_short),
        };

        let result = async {
            let quote = bounded("current_quote", self.timeout, self.venue.current_quote(symbol)).await?;
            let order = MarketOrder {
                symbol: symbol.to_string(),
                side: side.opening(),
                volume: self.config.volume,
                price: quote.price_for(side.opening()),
                stop_loss,
                take_profit,
                tag: self.tag.clone(),
            };
            bounded("submit_market_order", self.timeout, self.venue.submit_market_order(&order)).await
        }
        .await;

        match result {
            Ok(ack) => {
                log_command(&id, symbol, action, side.opening().as_str(), ack.price, ack.ticket);
                self.journal(&id, bar_ts, symbol, action, Ok((ack.ticket, ack.price)));
                let notice = match side {
                    PositionSide::Long => Notice::LongOpened(symbol.to_string()),
                    PositionSide::Short => Notice::ShortOpened(symbol.to_string()),
                };
                self.notify(notice).await;
                Some(ack.ticket)
            }
            Err(err) => {
                log_command_failed(&id, symbol, action, &err.to_string());
                self.journal(&id, bar_ts, symbol, action, Err(&err));
                self.notify(Notice::OpenFailed).await;
                None
            }
        }
    }

    /// Flatten one position at the current quote. `on_reverse` selects the
    /// reverse-signal notice; forced closes only report failures.
    async fn close(
        &self,
        symbol: &str,
        side: PositionSide,
        ticket: u64,
        volume: f64,
        ts: i64,
        on_reverse: bool,
    ) -> bool {
        let action = match side {
            PositionSide::Long => "close_long",
            PositionSide::Short => "close_short",
        };
        let id = intent_id(symbol, ts, action);

        let result = async {
            let quote = bounded("current_quote", self.timeout, self.venue.current_quote(symbol)).await?;
            let request = CloseRequest {
                symbol: symbol.to_string(),
                ticket,
                side: side.closing(),
                volume,
                price: quote.price_for(side.closing()),
                tag: self.tag.clone(),
            };
            bounded("submit_close", self.timeout, self.venue.submit_close(&request)).await
        }
        .await;

        match result {
            Ok(ack) => {
                log_command(&id, symbol, action, side.closing().as_str(), ack.price, ticket);
                self.journal(&id, ts, symbol, action, Ok((ticket, ack.price)));
                if on_reverse {
                    let notice = match side {
                        PositionSide::Long => Notice::CloseLong(symbol.to_string()),
                        PositionSide::Short => Notice::CloseShort(symbol.to_string()),
                    };
                    self.notify(notice).await;
                }
                true
            }
            Err(err) => {
                log_command_failed(&id, symbol, action, &err.to_string());
                self.journal(&id, ts, symbol, action, Err(&err));
                self.notify(Notice::CloseFailed(symbol.to_string())).await;
                false
            }
        }
    }

    async fn close_everything(&self, symbol: &str, now: DateTime<Utc>) -> EngineResult<SymbolOutcome> {
        let positions = self.positions(symbol).await?;
        self.report_profit(symbol, &positions);
        let ts = self.bars.bar_open(now);
        let mut outcome = SymbolOutcome::default();
        for p in &positions {
            let closed = self.close(symbol, p.side, p.ticket, p.volume, ts, false).await;
            outcome.tally(closed);
        }
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Risk windows
    // -------------------------------------------------------------------------

    async fn strip_stop_losses(&self, symbol: &str, now: DateTime<Utc>) -> EngineResult<SymbolOutcome> {
        let positions = self.positions(symbol).await?;
        let ts = self.bars.bar_open(now);
        let mut outcome = SymbolOutcome::default();
        for p in positions.iter().filter(|p| p.stop_loss.is_some()) {
            outcome.tally(self.set_stop_loss(p, None, ts).await);
        }
        Ok(outcome)
    }

    /// Give every unprotected position a stop recomputed from the current ATR.
    async fn restore_stop_losses(&self, symbol: &str, now: DateTime<Utc>) -> EngineResult<SymbolOutcome> {
        let positions = self.positions(symbol).await?;
        let bare: Vec<&PositionRecord> = positions.iter().filter(|p| p.stop_loss.is_none()).collect();
        let mut outcome = SymbolOutcome::default();
        if bare.is_empty() {
            return Ok(outcome);
        }
        let window = self.window(symbol, now).await?;
        let snapshot = IndicatorSnapshot::compute(&window)?;
        let levels = RiskLevels::compute(&window, &snapshot, self.config.multipliers());
        let ts = self.bars.bar_open(now);
        for p in bare {
            let stop = match p.side {
                PositionSide::Long => levels.stop_loss_long,
                PositionSide::Short => levels.stop_loss_short,
            };
            outcome.tally(self.set_stop_loss(p, Some(stop), ts).await);
        }
        Ok(outcome)
    }

    /// `ts` is the venue-clock bar open the command belongs to.
    async fn set_stop_loss(&self, position: &PositionRecord, stop_loss: Option<f64>, ts: i64) -> bool {
        let action = if stop_loss.is_some() { "restore_sl" } else { "remove_sl" };
        let id = intent_id(&position.symbol, ts, action);
        let result = bounded(
            "modify_stop_loss",
            self.timeout,
            self.venue.modify_stop_loss(position, stop_loss),
        )
        .await;
        match result {
            Ok(()) => {
                log_stop_loss(&position.symbol, position.ticket, stop_loss);
                self.journal(&id, ts, &position.symbol, action, Ok((position.ticket, stop_loss.unwrap_or(0.0))));
                true
            }
            Err(err) => {
                log_command_failed(&id, &position.symbol, action, &err.to_string());
                self.journal(&id, ts, &position.symbol, action, Err(&err));
                self.notify(Notice::StopLossFailed(position.symbol.clone())).await;
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn window(&self, symbol: &str, now: DateTime<Utc>) -> EngineResult<BarWindow> {
        match tokio::time::timeout(self.timeout, self.bars.fetch(self.venue.as_ref(), symbol, now)).await {
            Ok(window) => window,
            Err(_) => Err(EngineError::Venue(VenueError::timeout("fetch_bars"))),
        }
    }

    async fn positions(&self, symbol: &str) -> EngineResult<Vec<PositionRecord>> {
        Ok(bounded("open_positions", self.timeout, self.venue.open_positions(symbol)).await?)
    }

    fn report_profit(&self, symbol: &str, positions: &[PositionRecord]) {
        if !positions.is_empty() {
            let profit: f64 = positions.iter().map(|p| p.current_profit).sum();
            log_position_profit(symbol, positions.len(), profit);
        }
    }

    async fn notify(&self, notice: Notice) {
        if let Err(err) = self.notifier.send(&notice).await {
            log(
                Level::Warn,
                Domain::Notify,
                "notice_dropped",
                obj(&[("msg", v_str(&notice.to_string())), ("reason", v_str(&err.to_string()))]),
            );
        }
    }

    fn journal(
        &self,
        id: &str,
        ts: i64,
        symbol: &str,
        action: &str,
        result: Result<(u64, f64), &VenueError>,
    ) {
        let Some(journal) = &self.journal else { return };
        let entry = match result {
            Ok((ticket, price)) => JournalEntry {
                intent_id: id.to_string(),
                ts,
                symbol: symbol.to_string(),
                action: action.to_string(),
                outcome: "done".to_string(),
                ticket: Some(ticket),
                price: Some(price),
                reason: None,
            },
            Err(err) => JournalEntry {
                intent_id: id.to_string(),
                ts,
                symbol: symbol.to_string(),
                action: action.to_string(),
                outcome: "failed".to_string(),
                ticket: None,
                price: None,
                reason: Some(err.to_string()),
            },
        };
        let written = match journal.lock() {
            Ok(j) => j.record(&entry),
            Err(_) => return,
        };
        if let Err(err) = written {
            log(
                Level::Error,
                Domain::System,
                "journal_write_failed",
                obj(&[("intent_id", v_str(id)), ("reason", v_str(&err.to_string()))]),
            );
        }
    }
}
