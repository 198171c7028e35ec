//! Closed-candle history windows.
//!
//! A [`BarWindow`] is always ordered oldest-first, gap-free and ends at the
//! most recently closed candle. Windows are built by [`BarSource`], which
//! shifts wall-clock time into the venue's session clock before asking for
//! history and drops any candle still forming.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::logging::log_bar_window;
use crate::venue::Venue;

/// Shortest window the longest-lookback indicator (50-candle zones) accepts.
pub const MIN_BARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: i64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.c > self.o
    }

    pub fn is_bearish(&self) -> bool {
        self.c < self.o
    }

    pub fn range(&self) -> f64 {
        self.h - self.l
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn secs(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe {}", other)),
        }
    }
}

/// Ordered, gap-free run of closed candles for one (symbol, timeframe).
#[derive(Debug, Clone)]
pub struct BarWindow {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl BarWindow {
    pub fn new(symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> EngineResult<Self> {
        if candles.len() < MIN_BARS {
            return Err(EngineError::data(
                symbol,
                format!("have {} candles, need {}", candles.len(), MIN_BARS),
            ));
        }
        let step = timeframe.secs();
        for pair in candles.windows(2) {
            let (prev, next) = (pair[0].ts, pair[1].ts);
            if next <= prev {
                return Err(EngineError::data(
                    symbol,
                    format!("non-monotonic timestamps: prev={} next={}", prev, next),
                ));
            }
            if next - prev != step {
                return Err(EngineError::data(
                    symbol,
                    format!("gap between {} and {} ({} missing)", prev, next, (next - prev) / step - 1),
                ));
            }
        }
        Ok(Self { symbol: symbol.to_string(), timeframe, candles })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Position of the k-th candle from the end; `back_index(1)` is the last.
    pub fn back_index(&self, k: usize) -> usize {
        self.candles.len() - k
    }

    /// The k-th candle from the end (`back(1)` is the last candle).
    pub fn back(&self, k: usize) -> &Candle {
        &self.candles[self.back_index(k)]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.c).collect()
    }
}

/// Builds [`BarWindow`]s from venue history.
#[derive(Debug, Clone, Copy)]
pub struct BarSource {
    pub timeframe: Timeframe,
    pub count: usize,
    /// Venue session clock minus UTC, in seconds.
    pub session_offset_secs: i64,
}

impl BarSource {
    pub fn new(timeframe: Timeframe, count: usize, session_offset_secs: i64) -> Self {
        Self { timeframe, count, session_offset_secs }
    }

    /// Venue-clock timestamp corresponding to `now`.
    pub fn venue_now(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() + self.session_offset_secs
    }

    /// Venue-clock open of the period containing `now`.
    pub fn bar_open(&self, now: DateTime<Utc>) -> i64 {
        let step = self.timeframe.secs();
        self.venue_now(now).div_euclid(step) * step
    }

    pub async fn fetch(
        &self,
        venue: &dyn Venue,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<BarWindow> {
        let to = self.venue_now(now);
        // two spare periods cover the forming candle and a boundary straddle
        let from = to - (self.count as i64 + 2) * self.timeframe.secs();
        let raw = venue.fetch_bars(symbol, self.timeframe, from, to).await?;
        let window = self.assemble(symbol, raw, to)?;
        log_bar_window(symbol, window.timeframe().as_str(), window.len(), window.back(1).ts);
        Ok(window)
    }

    /// Drop forming candles, keep the trailing `count` closed ones and validate.
    pub fn assemble(&self, symbol: &str, mut raw: Vec<Candle>, venue_now: i64) -> EngineResult<BarWindow> {
        let step = self.timeframe.secs();
        raw.retain(|c| c.ts + step <= venue_now && c.o.is_finite() && c.c.is_finite());
        raw.sort_by_key(|c| c.ts);
        raw.dedup_by_key(|c| c.ts);
        if raw.len() < self.count {
            return Err(EngineError::data(
                symbol,
                format!("venue returned {} closed candles, requested {}", raw.len(), self.count),
            ));
        }
        let start = raw.len() - self.count;
        BarWindow::new(symbol, self.timeframe, raw.split_off(start))
    }
}
