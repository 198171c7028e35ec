//! Entry and reverse signal detection.
//!
//! Entry needs zone agreement on candle -3 (both lookbacks), then
//! confirmation on the last closed candle -2: it closes in the trade's
//! direction, has left the zone on the short lookback, and the trailing
//! liquidity peak sits on candle -3's close.
//!
//! The reverse signal only reads candle -2 and carries no direction of its
//! own; [`crate::position`] maps it onto the held side.

use serde::Serialize;

use crate::bars::BarWindow;
use crate::indicators::LiquiditySnapshot;
use crate::zones::{ZoneLabel, ZoneMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntrySignal {
    Long,
    Short,
    None,
}

impl EntrySignal {
    pub fn as_str(self) -> &'static str {
        match self {
            EntrySignal::Long => "long",
            EntrySignal::Short => "short",
            EntrySignal::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReverseSignal {
    /// Candle -2 is Demand on both lookbacks.
    Demand,
    /// Candle -2 is Supply on both lookbacks.
    Supply,
    None,
}

impl ReverseSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            ReverseSignal::Demand => "demand",
            ReverseSignal::Supply => "supply",
            ReverseSignal::None => "none",
        }
    }
}

/// Relative-tolerance equality. A zero tolerance degenerates to `==`.
pub fn prices_match(a: f64, b: f64, tolerance: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= tolerance * a.abs().max(b.abs())
}

pub fn detect_entry(
    window: &BarWindow,
    zones: &ZoneMap,
    liquidity: &LiquiditySnapshot,
    tolerance: f64,
) -> EntrySignal {
    let trigger = window.back(2);
    let aligned = prices_match(liquidity.peak_close, window.back(3).c, tolerance);

    if zones.both_back(3, ZoneLabel::Demand) {
        if trigger.is_bullish() && zones.short_back(2) != ZoneLabel::Demand && aligned {
            return EntrySignal::Long;
        }
    } else if zones.both_back(3, ZoneLabel::Supply)
        && trigger.is_bearish()
        && zones.short_back(2) != ZoneLabel::Supply
        && aligned
    {
        return EntrySignal::Short;
    }
    EntrySignal::None
}

pub fn detect_reverse(zones: &ZoneMap) -> ReverseSignal {
    if zones.both_back(2, ZoneLabel::Demand) {
        ReverseSignal::Demand
    } else if zones.both_back(2, ZoneLabel::Supply) {
        ReverseSignal::Supply
    } else {
        ReverseSignal::None
    }
}
