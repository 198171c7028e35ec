use serde::Serialize;

use crate::bars::BarWindow;
use crate::indicators::IndicatorSnapshot;

/// ATR multipliers for the protective orders attached to every entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskMultipliers {
    pub take_profit: f64,
    pub stop_loss: f64,
}

/// Stop and target prices derived from the last closed candle.
///
/// A zero ATR collapses every level onto the close; that is accepted
/// rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskLevels {
    pub take_profit_long: f64,
    pub stop_loss_long: f64,
    pub take_profit_short: f64,
    pub stop_loss_short: f64,
}

impl RiskLevels {
    pub fn from_atr(close: f64, atr: f64, m: RiskMultipliers) -> Self {
        Self {
            take_profit_long: close + atr * m.take_profit,
            stop_loss_long: close - atr * m.stop_loss,
            take_profit_short: close - atr * m.take_profit,
            stop_loss_short: close + atr * m.stop_loss,
        }
    }

    /// Levels anchored on candle -2 and its ATR.
    pub fn compute(window: &BarWindow, snapshot: &IndicatorSnapshot, m: RiskMultipliers) -> Self {
        Self::from_atr(window.back(2).c, snapshot.atr, m)
    }
}
