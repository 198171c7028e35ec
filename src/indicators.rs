//! Technical indicators over a closed-candle window.
//!
//! Everything here is a pure function of its input slice. Series are
//! returned aligned with the candles; `None` marks positions inside an
//! indicator's warm-up.

use std::collections::VecDeque;

use serde::Serialize;

use crate::bars::{BarWindow, Candle};
use crate::error::{EngineError, EngineResult};

pub const ATR_PERIOD: usize = 6;
pub const RSI_PERIOD: usize = 14;
pub const LIQUIDITY_VOLUME_WINDOW: usize = 30;
pub const LIQUIDITY_PEAK_WINDOW: usize = 20;
pub const VOLUME_ZONE_WINDOW: usize = 50;

// =============================================================================
// Rolling primitives
// =============================================================================

/// Simple moving average with fixed window
#[derive(Debug, Clone)]
pub struct Sma {
    window: VecDeque<f64>,
    period: usize,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(period),
            period,
            sum: 0.0,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.sum += value;
        self.window.push_back(value);
        if self.window.len() > self.period {
            self.sum -= self.window.pop_front().unwrap_or(0.0);
        }
        self.get()
    }

    /// Mean of the full window, `None` until `period` values were seen.
    pub fn get(&self) -> Option<f64> {
        if self.is_ready() {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.period > 0 && self.window.len() >= self.period
    }
}

/// Rolling mean series; `None` during warm-up.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut sma = Sma::new(period);
    values.iter().map(|v| sma.update(*v)).collect()
}

/// Rolling sum series; `None` during warm-up.
pub fn rolling_sum(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_mean(values, period)
        .into_iter()
        .map(|m| m.map(|m| m * period as f64))
        .collect()
}

fn max_present(values: &[Option<f64>]) -> Option<f64> {
    values.iter().flatten().copied().fold(None, |acc, v| match acc {
        Some(a) if a >= v => Some(a),
        _ => Some(v),
    })
}

fn tail<T>(values: &[T], n: usize) -> &[T] {
    &values[values.len().saturating_sub(n)..]
}

// =============================================================================
// ATR
// =============================================================================

/// True range per candle. The first candle has no previous close and
/// falls back to its own high-low span.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let span = c.h - c.l;
            match i.checked_sub(1).map(|p| candles[p].c) {
                Some(prev) => span.max((c.h - prev).abs()).max((prev - c.l).abs()),
                None => span,
            }
        })
        .collect()
}

pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    rolling_mean(&true_range(candles), period)
}

// =============================================================================
// RSI
// =============================================================================

/// Exponentially weighted mean with bias correction (weights `(1-alpha)^i`
/// normalised by their sum), valid once `min_periods` values were seen.
fn ewm_mean(values: &[f64], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let decay = 1.0 - alpha;
    let mut num = 0.0;
    let mut den = 0.0;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            num = v + decay * num;
            den = 1.0 + decay * den;
            if i + 1 >= min_periods {
                Some(num / den)
            } else {
                None
            }
        })
        .collect()
}

/// Wilder-style RSI with `alpha = 1/period`.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let change = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }
    let alpha = 1.0 / period as f64;
    let avg_gain = ewm_mean(&gains, alpha, period);
    let avg_loss = ewm_mean(&losses, alpha, period);
    avg_gain
        .into_iter()
        .zip(avg_loss)
        .map(|(g, l)| match (g, l) {
            (Some(g), Some(l)) if l > 0.0 => Some(100.0 - 100.0 / (1.0 + g / l)),
            (Some(g), Some(_)) if g > 0.0 => Some(100.0),
            _ => None,
        })
        .collect()
}

/// RSI readings used for multi-candle confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RsiTriple {
    /// RSI of the last closed candle (index -2).
    pub last: Option<f64>,
    /// RSI one candle earlier (index -3).
    pub prior: Option<f64>,
    /// Mean of indices -4 and -3.
    pub pair_mean: Option<f64>,
}

pub fn rsi_triple(closes: &[f64]) -> RsiTriple {
    let rsi = rsi_series(closes, RSI_PERIOD);
    let n = rsi.len();
    let at = |k: usize| if n >= k { rsi[n - k] } else { None };
    let pair: Vec<f64> = [at(4), at(3)].into_iter().flatten().collect();
    RsiTriple {
        last: at(2),
        prior: at(3),
        pair_mean: if pair.is_empty() {
            None
        } else {
            Some(pair.iter().sum::<f64>() / pair.len() as f64)
        },
    }
}

// =============================================================================
// Liquidity
// =============================================================================

/// `close * volume / rolling_sum(volume, window)` per candle.
pub fn liquidity_series(candles: &[Candle], window: usize) -> Vec<Option<f64>> {
    let volumes: Vec<f64> = candles.iter().map(|c| c.v).collect();
    rolling_sum(&volumes, window)
        .into_iter()
        .zip(candles)
        .map(|(sum, c)| sum.filter(|s| *s > 0.0).map(|s| c.c * c.v / s))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiquiditySnapshot {
    /// Liquidity of the last closed candle (index -2).
    pub last: f64,
    pub max_26: f64,
    pub max_50: f64,
    pub max_80: f64,
    /// Close of the highest-liquidity candle among the trailing 20.
    pub peak_close: f64,
    pub peak_open: f64,
}

pub fn liquidity_snapshot(candles: &[Candle]) -> Option<LiquiditySnapshot> {
    let liq = liquidity_series(candles, LIQUIDITY_VOLUME_WINDOW);
    let n = liq.len();
    if n < 2 {
        return None;
    }
    let last = liq[n - 2]?;

    // first occurrence of the maximum wins
    let start = n.saturating_sub(LIQUIDITY_PEAK_WINDOW);
    let mut peak: Option<(usize, f64)> = None;
    for (i, v) in liq.iter().enumerate().skip(start) {
        if let Some(v) = v {
            if peak.map_or(true, |(_, best)| *v > best) {
                peak = Some((i, *v));
            }
        }
    }
    let (peak_idx, _) = peak?;

    Some(LiquiditySnapshot {
        last,
        max_26: max_present(tail(&liq, 26))?,
        max_50: max_present(tail(&liq, 50))?,
        max_80: max_present(tail(&liq, 80))?,
        peak_close: candles[peak_idx].c,
        peak_open: candles[peak_idx].o,
    })
}

// =============================================================================
// Volume-based supply/demand
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VolumeZoneCounts {
    pub supply: usize,
    pub demand: usize,
}

/// Count quiet candles (range below its rolling mean) whose cumulative VWAP
/// sits above (supply) or below (demand) its own rolling mean.
pub fn volume_zone_counts(candles: &[Candle], window: usize) -> VolumeZoneCounts {
    let ranges: Vec<f64> = candles.iter().map(Candle::range).collect();
    let mut pv = 0.0;
    let mut vol = 0.0;
    let vwap: Vec<f64> = candles
        .iter()
        .map(|c| {
            pv += c.c * c.v;
            vol += c.v;
            if vol > 0.0 { pv / vol } else { c.c }
        })
        .collect();
    let range_mean = rolling_mean(&ranges, window);
    let vwap_mean = rolling_mean(&vwap, window);

    let mut counts = VolumeZoneCounts::default();
    for i in 0..candles.len() {
        if let (Some(rm), Some(vm)) = (range_mean[i], vwap_mean[i]) {
            if ranges[i] < rm && vwap[i] > vm {
                counts.supply += 1;
            } else if ranges[i] < rm && vwap[i] < vm {
                counts.demand += 1;
            }
        }
    }
    counts
}

// =============================================================================
// Snapshot
// =============================================================================

/// Per-cycle indicator readings; recomputed every tick, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    /// ATR of the last closed candle (index -2).
    pub atr: f64,
    pub rsi: RsiTriple,
    pub liquidity: LiquiditySnapshot,
}

impl IndicatorSnapshot {
    pub fn compute(window: &BarWindow) -> EngineResult<Self> {
        let candles = window.candles();
        let atr = atr_series(candles, ATR_PERIOD)[window.back_index(2)]
            .ok_or_else(|| EngineError::data(window.symbol(), "ATR warm-up not complete"))?;
        let liquidity = liquidity_snapshot(candles)
            .ok_or_else(|| EngineError::data(window.symbol(), "liquidity warm-up not complete"))?;
        Ok(Self {
            atr,
            rsi: rsi_triple(&window.closes()),
            liquidity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Candle {
        Candle { ts, o, h, l, c, v }
    }

    #[test]
    fn test_sma_warmup_and_roll() {
        let mut sma = Sma::new(3);
        assert_eq!(sma.update(1.0), None);
        assert_eq!(sma.update(2.0), None);
        assert_eq!(sma.update(3.0), Some(2.0));
        assert_eq!(sma.update(6.0), Some(11.0 / 3.0));
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let candles = vec![
            candle(0, 1.0, 1.2, 0.9, 1.0, 1.0),
            // gap up: |high - prev close| dominates
            candle(1, 1.5, 1.6, 1.5, 1.55, 1.0),
            // gap down: |prev close - low| dominates
            candle(2, 1.0, 1.05, 1.0, 1.02, 1.0),
        ];
        let tr = true_range(&candles);
        assert!((tr[0] - 0.3).abs() < 1e-12);
        assert!((tr[1] - 0.6).abs() < 1e-12);
        assert!((tr[2] - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_atr_non_negative_and_warmup() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let base = 1.0 + (i as f64 * 0.7).sin() * 0.01;
                candle(i, base, base + 0.002, base - 0.003, base + 0.001, 5.0)
            })
            .collect();
        let atr = atr_series(&candles, ATR_PERIOD);
        assert!(atr[..5].iter().all(Option::is_none));
        assert!(atr[5..].iter().all(|v| v.map_or(false, |v| v >= 0.0)));
    }

    #[test]
    fn test_atr_zero_on_flat_market() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, 1.0, 1.0, 1.0, 1.0, 1.0)).collect();
        assert_eq!(atr_series(&candles, ATR_PERIOD)[9], Some(0.0));
    }

    #[test]
    fn test_rsi_min_periods() {
        let closes: Vec<f64> = (0..30).map(|i| 1.0 + (i % 3) as f64 * 0.01).collect();
        let rsi = rsi_series(&closes, RSI_PERIOD);
        assert!(rsi[..13].iter().all(Option::is_none));
        assert!(rsi[13].is_some());
    }

    #[test]
    fn test_rsi_bounds_and_extremes() {
        let rising: Vec<f64> = (0..40).map(|i| 1.0 + i as f64 * 0.01).collect();
        assert_eq!(rsi_series(&rising, RSI_PERIOD)[39], Some(100.0));

        let falling: Vec<f64> = (0..40).map(|i| 2.0 - i as f64 * 0.01).collect();
        let v = rsi_series(&falling, RSI_PERIOD)[39].unwrap();
        assert!(v.abs() < 1e-9);

        let flat = vec![1.0; 40];
        assert_eq!(rsi_series(&flat, RSI_PERIOD)[39], None);
    }

    #[test]
    fn test_rsi_triple_positions() {
        let closes: Vec<f64> = (0..60).map(|i| 1.0 + ((i * 7) % 11) as f64 * 0.001).collect();
        let rsi = rsi_series(&closes, RSI_PERIOD);
        let triple = rsi_triple(&closes);
        assert_eq!(triple.last, rsi[58]);
        assert_eq!(triple.prior, rsi[57]);
        let expected = (rsi[56].unwrap() + rsi[57].unwrap()) / 2.0;
        assert!((triple.pair_mean.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_liquidity_series_normalises_by_volume_sum() {
        let candles: Vec<Candle> = (0..30).map(|i| candle(i, 1.0, 1.0, 1.0, 2.0, 1.0)).collect();
        let liq = liquidity_series(&candles, LIQUIDITY_VOLUME_WINDOW);
        assert!(liq[28].is_none());
        assert!((liq[29].unwrap() - 2.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_liquidity_peak_tracks_volume_spike() {
        let mut candles: Vec<Candle> = (0..90).map(|i| candle(i, 1.0, 1.1, 0.9, 1.05, 10.0)).collect();
        candles[80] = candle(80, 1.2, 1.3, 1.1, 1.25, 500.0);
        let snap = liquidity_snapshot(&candles).unwrap();
        assert_eq!(snap.peak_close, 1.25);
        assert_eq!(snap.peak_open, 1.2);
        assert!(snap.max_26 >= snap.last);
        assert_eq!(snap.max_26, snap.max_80);
    }

    #[test]
    fn test_volume_zone_counts_quiet_candles() {
        // rising prices keep VWAP above its lagging mean; alternate wide/narrow ranges
        let candles: Vec<Candle> = (0..120)
            .map(|i| {
                let p = 1.0 + i as f64 * 0.001;
                let half = if i % 2 == 0 { 0.004 } else { 0.001 };
                candle(i, p, p + half, p - half, p, 10.0)
            })
            .collect();
        let counts = volume_zone_counts(&candles, VOLUME_ZONE_WINDOW);
        assert!(counts.supply > 0);
        assert_eq!(counts.demand, 0);
    }
}
