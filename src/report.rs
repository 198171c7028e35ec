//! On-demand signal report for a single symbol: SMA direction, exposure
//! and the auxiliary readings (RSI, engulfing, volume zones).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bars::{BarSource, BarWindow};
use crate::error::{EngineError, EngineResult, VenueError};
use crate::indicators::{rsi_triple, volume_zone_counts, RsiTriple, Sma, VolumeZoneCounts, VOLUME_ZONE_WINDOW};
use crate::patterns::{bearish_engulfing, bullish_engulfing};
use crate::venue::{bounded, PositionRecord, Venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
    Flat,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
            Direction::Flat => "flat",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub symbol: String,
    pub last_close: f64,
    pub sma: f64,
    pub sma_period: usize,
    pub direction: Direction,
    /// Sum of open position volumes.
    pub exposure: f64,
    pub rsi: RsiTriple,
    pub bullish_engulfing: bool,
    pub bearish_engulfing: bool,
    pub volume_zones: VolumeZoneCounts,
}

impl SignalReport {
    pub fn build(window: &BarWindow, positions: &[PositionRecord], sma_period: usize) -> EngineResult<Self> {
        let closes = window.closes();
        let mut sma = Sma::new(sma_period);
        let mean = closes
            .iter()
            .map(|c| sma.update(*c))
            .last()
            .flatten()
            .ok_or_else(|| EngineError::data(window.symbol(), format!("fewer than {} closes", sma_period)))?;
        let last_close = window.back(1).c;
        let direction = if last_close > mean {
            Direction::Buy
        } else if last_close < mean {
            Direction::Sell
        } else {
            Direction::Flat
        };

        Ok(Self {
            symbol: window.symbol().to_string(),
            last_close,
            sma: mean,
            sma_period,
            direction,
            exposure: positions.iter().map(|p| p.volume).sum(),
            rsi: rsi_triple(&closes),
            bullish_engulfing: bullish_engulfing(window),
            bearish_engulfing: bearish_engulfing(window),
            volume_zones: volume_zone_counts(window.candles(), VOLUME_ZONE_WINDOW),
        })
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "n/a".to_string())
}

impl fmt::Display for SignalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Symbol: {}", self.symbol)?;
        writeln!(f, "Current Trades: {}", self.exposure)?;
        writeln!(f, "Last Close: {}", self.last_close)?;
        writeln!(f, "Simple Moving Average: {:.5}", self.sma)?;
        writeln!(f, "Signal: {}", self.direction.as_str())?;
        writeln!(
            f,
            "RSI: {} / {} / {}",
            opt(self.rsi.last),
            opt(self.rsi.prior),
            opt(self.rsi.pair_mean)
        )?;
        writeln!(
            f,
            "Engulfing: bullish={} bearish={}",
            self.bullish_engulfing, self.bearish_engulfing
        )?;
        write!(
            f,
            "Volume zones: supply={} demand={}",
            self.volume_zones.supply, self.volume_zones.demand
        )
    }
}

/// Fetch what the report needs from the venue and build it.
pub async fn generate(
    venue: &dyn Venue,
    source: &BarSource,
    symbol: &str,
    now: DateTime<Utc>,
    sma_period: usize,
    timeout: Duration,
) -> EngineResult<SignalReport> {
    let window = match tokio::time::timeout(timeout, source.fetch(venue, symbol, now)).await {
        Ok(w) => w?,
        Err(_) => return Err(VenueError::timeout("fetch_bars").into()),
    };
    let positions = bounded("open_positions", timeout, venue.open_positions(symbol)).await?;
    SignalReport::build(&window, &positions, sma_period)
}
