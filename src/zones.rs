//! Supply/demand labelling from rolling price extremes.

use serde::Serialize;

use crate::bars::{BarWindow, Candle};

pub const SHORT_ZONE_WINDOW: usize = 20;
pub const LONG_ZONE_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ZoneLabel {
    #[default]
    None,
    Supply,
    Demand,
}

impl ZoneLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ZoneLabel::None => "none",
            ZoneLabel::Supply => "supply",
            ZoneLabel::Demand => "demand",
        }
    }
}

/// Label each candle against the trailing `window` extremes (inclusive of
/// itself). Candles without a full lookback stay unlabelled. Supply is
/// tested first, so a candle spanning both extremes is Supply.
pub fn classify(candles: &[Candle], window: usize) -> Vec<ZoneLabel> {
    let mut labels = vec![ZoneLabel::None; candles.len()];
    if window == 0 || candles.len() < window {
        return labels;
    }
    for end in (window - 1)..candles.len() {
        let span = &candles[end + 1 - window..=end];
        let max_high = span.iter().map(|c| c.h).fold(f64::NEG_INFINITY, f64::max);
        let min_low = span.iter().map(|c| c.l).fold(f64::INFINITY, f64::min);
        let c = &candles[end];
        labels[end] = if c.h >= max_high {
            ZoneLabel::Supply
        } else if c.l <= min_low {
            ZoneLabel::Demand
        } else {
            ZoneLabel::None
        };
    }
    labels
}

/// Labels for both lookbacks, aligned with the window's candles.
#[derive(Debug, Clone)]
pub struct ZoneMap {
    pub short: Vec<ZoneLabel>,
    pub long: Vec<ZoneLabel>,
}

impl ZoneMap {
    pub fn compute(window: &BarWindow) -> Self {
        Self {
            short: classify(window.candles(), SHORT_ZONE_WINDOW),
            long: classify(window.candles(), LONG_ZONE_WINDOW),
        }
    }

    /// Short-window label of the k-th candle from the end.
    pub fn short_back(&self, k: usize) -> ZoneLabel {
        self.short[self.short.len() - k]
    }

    /// Long-window label of the k-th candle from the end.
    pub fn long_back(&self, k: usize) -> ZoneLabel {
        self.long[self.long.len() - k]
    }

    /// Both lookbacks agree on `label` at the k-th candle from the end.
    pub fn both_back(&self, k: usize, label: ZoneLabel) -> bool {
        self.short_back(k) == label && self.long_back(k) == label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let p = 1.0 + (i as f64 * 0.37).sin() * 0.02 + (i as f64 * 0.05).cos() * 0.01;
                Candle { ts: i as i64, o: p, h: p + 0.003, l: p - 0.003, c: p + 0.001, v: 1.0 }
            })
            .collect()
    }

    #[test]
    fn test_warmup_is_unlabelled() {
        let labels = classify(&wave(60), LONG_ZONE_WINDOW);
        assert!(labels[..49].iter().all(|l| *l == ZoneLabel::None));
    }

    #[test]
    fn test_new_high_is_supply_new_low_is_demand() {
        let mut candles = wave(30);
        candles[25].h = 5.0;
        candles[27].l = 0.1;
        let labels = classify(&candles, SHORT_ZONE_WINDOW);
        assert_eq!(labels[25], ZoneLabel::Supply);
        assert_eq!(labels[27], ZoneLabel::Demand);
    }

    #[test]
    fn test_outside_bar_prefers_supply() {
        let mut candles = wave(30);
        candles[29].h = 5.0;
        candles[29].l = 0.1;
        assert_eq!(classify(&candles, SHORT_ZONE_WINDOW)[29], ZoneLabel::Supply);
    }

    #[test]
    fn test_labels_are_exclusive_for_both_windows() {
        let candles = wave(400);
        for window in [SHORT_ZONE_WINDOW, LONG_ZONE_WINDOW] {
            let labels = classify(&candles, window);
            assert_eq!(labels.len(), candles.len());
            for (i, label) in labels.iter().enumerate() {
                if i + 1 < window {
                    continue;
                }
                let span = &candles[i + 1 - window..=i];
                let is_max = candles[i].h >= span.iter().map(|c| c.h).fold(f64::MIN, f64::max);
                let is_min = candles[i].l <= span.iter().map(|c| c.l).fold(f64::MAX, f64::min);
                match label {
                    ZoneLabel::Supply => assert!(is_max),
                    ZoneLabel::Demand => assert!(is_min && !is_max),
                    ZoneLabel::None => assert!(!is_max && !is_min),
                }
            }
        }
    }
}
