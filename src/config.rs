//! Environment-driven configuration.
//!
//! Every key has a default matching the reference deployment; only values
//! that are present but unparseable fail in [`Config::from_env`]. Semantic
//! checks live in [`Config::validate`] and are fatal at startup.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveTime;

use crate::bars::{BarSource, Timeframe};
use crate::error::{EngineError, EngineResult};
use crate::risk::RiskMultipliers;
use crate::schedule::{RiskWindow, SessionCalendar};
use crate::venue::OrderTag;
use crate::zones::LONG_ZONE_WINDOW;

/// Shortest trading window: entries read the 50-candle zone at index -3.
pub const MIN_WINDOW: usize = LONG_ZONE_WINDOW + 2;

pub const DEFAULT_SYMBOLS: [&str; 29] = [
    "AUDUSD", "CHFJPY", "EURUSD", "GBPUSD", "USDCAD", "USDCHF", "USDJPY", "EURCAD", "GBPJPY",
    "AUDCHF", "AUDCAD", "AUDJPY", "EURGBP", "EURAUD", "EURJPY", "EURCHF", "EURNZD", "AUDNZD",
    "GBPCHF", "USDSGD", "CADCHF", "CADJPY", "GBPAUD", "GBPCAD", "GBPNZD", "NZDCAD", "NZDCHF",
    "NZDUSD", "NZDJPY",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub window: usize,
    pub session_offset_secs: i64,
    pub tp_mult: f64,
    pub sl_mult: f64,
    pub volume: f64,
    pub magic: u64,
    pub order_comment: String,
    pub deviation: u32,
    pub tick_secs: u64,
    pub liquidity_tolerance: f64,
    pub derisk: RiskWindow,
    pub rerisk: RiskWindow,
    pub venue_timeout_ms: u64,
    pub venue_url: String,
    pub paper: bool,
    pub notify_token: Option<String>,
    pub notify_chat_id: Option<String>,
    pub journal_path: String,
    pub close_all: bool,
    pub report_sma_period: usize,
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            timeframe: Timeframe::M5,
            window: 400,
            session_offset_secs: 14_400,
            tp_mult: 1.5,
            sl_mult: 2.2,
            volume: 0.01,
            magic: 2022,
            order_comment: "zonefx".to_string(),
            deviation: 20,
            tick_secs: 28,
            liquidity_tolerance: 1e-5,
            derisk: RiskWindow::new(hm(21, 35), hm(22, 0)),
            rerisk: RiskWindow::new(hm(23, 5), hm(23, 11)),
            venue_timeout_ms: 5_000,
            venue_url: "http://127.0.0.1:8700".to_string(),
            paper: false,
            notify_token: None,
            notify_chat_id: None,
            journal_path: "./zonefx.sqlite".to_string(),
            close_all: false,
            report_sma_period: 10,
        }
    }
}

fn parse_time(key: &str, raw: &str) -> EngineResult<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| EngineError::config(key, format!("expected HH:MM, got {:?}: {}", raw, e)))
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

impl Config {
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; absent keys keep their default.
    pub fn from_lookup<F>(get: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn num<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> EngineResult<T>
        where
            T::Err: std::fmt::Display,
        {
            match raw {
                None => Ok(default),
                Some(v) => v
                    .trim()
                    .parse()
                    .map_err(|e: T::Err| EngineError::config(key, format!("{:?}: {}", v, e))),
            }
        }

        let d = Self::default();
        let window_of = |start_key: &str, end_key: &str, default: RiskWindow| -> EngineResult<RiskWindow> {
            let start = match get(start_key) {
                Some(v) => parse_time(start_key, &v)?,
                None => default.start,
            };
            let end = match get(end_key) {
                Some(v) => parse_time(end_key, &v)?,
                None => default.end,
            };
            Ok(RiskWindow::new(start, end))
        };

        Ok(Self {
            symbols: match get("SYMBOLS") {
                Some(v) => v
                    .split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
                None => d.symbols,
            },
            timeframe: match get("TIMEFRAME") {
                Some(v) => v.parse().map_err(|e: String| EngineError::config("TIMEFRAME", e))?,
                None => d.timeframe,
            },
            window: num("WINDOW", get("WINDOW"), d.window)?,
            session_offset_secs: num("SESSION_OFFSET_SECS", get("SESSION_OFFSET_SECS"), d.session_offset_secs)?,
            tp_mult: num("TP_MULT", get("TP_MULT"), d.tp_mult)?,
            sl_mult: num("SL_MULT", get("SL_MULT"), d.sl_mult)?,
            volume: num("VOLUME", get("VOLUME"), d.volume)?,
            magic: num("MAGIC", get("MAGIC"), d.magic)?,
            order_comment: get("ORDER_COMMENT").unwrap_or(d.order_comment),
            deviation: num("DEVIATION", get("DEVIATION"), d.deviation)?,
            tick_secs: num("TICK_SECS", get("TICK_SECS"), d.tick_secs)?,
            liquidity_tolerance: num("LIQUIDITY_TOLERANCE", get("LIQUIDITY_TOLERANCE"), d.liquidity_tolerance)?,
            derisk: window_of("DERISK_START", "DERISK_END", d.derisk)?,
            rerisk: window_of("RERISK_START", "RERISK_END", d.rerisk)?,
            venue_timeout_ms: num("VENUE_TIMEOUT_MS", get("VENUE_TIMEOUT_MS"), d.venue_timeout_ms)?,
            venue_url: get("VENUE_URL").unwrap_or(d.venue_url),
            paper: get("PAPER").map(|v| parse_flag(&v)).unwrap_or(d.paper),
            notify_token: get("NOTIFY_TOKEN").filter(|v| !v.is_empty()),
            notify_chat_id: get("NOTIFY_CHAT_ID").filter(|v| !v.is_empty()),
            journal_path: get("JOURNAL_PATH").unwrap_or(d.journal_path),
            close_all: get("CLOSE_ALL").map(|v| parse_flag(&v)).unwrap_or(d.close_all),
            report_sma_period: num("REPORT_SMA_PERIOD", get("REPORT_SMA_PERIOD"), d.report_sma_period)?,
        })
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.symbols.is_empty() {
            return Err(EngineError::config("SYMBOLS", "universe is empty"));
        }
        let mut seen = HashSet::new();
        for s in &self.symbols {
            if !seen.insert(s.as_str()) {
                return Err(EngineError::config("SYMBOLS", format!("duplicate symbol {}", s)));
            }
        }
        for (key, v) in [("TP_MULT", self.tp_mult), ("SL_MULT", self.sl_mult), ("VOLUME", self.volume)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(EngineError::config(key, format!("must be positive, got {}", v)));
            }
        }
        if self.window < MIN_WINDOW {
            return Err(EngineError::config(
                "WINDOW",
                format!("{} is below the {}-candle minimum", self.window, MIN_WINDOW),
            ));
        }
        if self.tick_secs == 0 {
            return Err(EngineError::config("TICK_SECS", "must be non-zero"));
        }
        if !self.liquidity_tolerance.is_finite() || self.liquidity_tolerance < 0.0 {
            return Err(EngineError::config("LIQUIDITY_TOLERANCE", "must be a non-negative number"));
        }
        if self.derisk.is_empty() {
            return Err(EngineError::config("DERISK_START", format!("empty window {}", self.derisk)));
        }
        if self.rerisk.is_empty() {
            return Err(EngineError::config("RERISK_START", format!("empty window {}", self.rerisk)));
        }
        if self.derisk.overlaps(&self.rerisk) {
            return Err(EngineError::config(
                "RERISK_START",
                format!("{} overlaps de-risk window {}", self.rerisk, self.derisk),
            ));
        }
        if self.venue_timeout_ms == 0 {
            return Err(EngineError::config("VENUE_TIMEOUT_MS", "must be non-zero"));
        }
        if self.report_sma_period == 0 {
            return Err(EngineError::config("REPORT_SMA_PERIOD", "must be non-zero"));
        }
        Ok(())
    }

    pub fn multipliers(&self) -> RiskMultipliers {
        RiskMultipliers { take_profit: self.tp_mult, stop_loss: self.sl_mult }
    }

    pub fn calendar(&self) -> SessionCalendar {
        SessionCalendar { derisk: self.derisk, rerisk: self.rerisk }
    }

    pub fn bar_source(&self) -> BarSource {
        BarSource::new(self.timeframe, self.window, self.session_offset_secs)
    }

    pub fn order_tag(&self) -> OrderTag {
        OrderTag { deviation: self.deviation, magic: self.magic, comment: self.order_comment.clone() }
    }

    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> EngineResult<Config> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.symbols.len(), 29);
        assert_eq!(cfg.window, 400);
        assert_eq!(cfg.timeframe, Timeframe::M5);
        assert_eq!(cfg.magic, 2022);
        assert_eq!(cfg.rerisk.to_string(), "[23:05, 23:11)");
        cfg.validate().unwrap();
    }

    #[test]
    fn test_overrides() {
        let cfg = from_pairs(&[
            ("SYMBOLS", "eurusd, gbpusd"),
            ("TIMEFRAME", "H1"),
            ("TP_MULT", "2.0"),
            ("CLOSE_ALL", "yes"),
            ("DERISK_START", "20:00"),
        ])
        .unwrap();
        assert_eq!(cfg.symbols, vec!["EURUSD", "GBPUSD"]);
        assert_eq!(cfg.timeframe, Timeframe::H1);
        assert_eq!(cfg.multipliers().take_profit, 2.0);
        assert!(cfg.close_all);
        assert_eq!(cfg.derisk.start, hm(20, 0));
    }

    #[test]
    fn test_unparseable_value_names_key() {
        let err = from_pairs(&[("VOLUME", "lots")]).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { ref key, .. } if key == "VOLUME"));
        assert!(from_pairs(&[("DERISK_END", "25:99")]).is_err());
    }

    #[test]
    fn test_inverted_rerisk_rejected() {
        let cfg = from_pairs(&[("RERISK_START", "23:11"), ("RERISK_END", "23:05")]).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("RERISK_START"));
    }

    #[test]
    fn test_overlapping_windows_rejected() {
        let cfg = from_pairs(&[("RERISK_START", "21:50"), ("RERISK_END", "22:10")]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_rules() {
        assert!(from_pairs(&[("SYMBOLS", "EURUSD,EURUSD")]).unwrap().validate().is_err());
        assert!(from_pairs(&[("SYMBOLS", " , ")]).unwrap().validate().is_err());
        assert!(from_pairs(&[("SL_MULT", "0")]).unwrap().validate().is_err());
        assert!(from_pairs(&[("WINDOW", "20")]).unwrap().validate().is_err());
        assert!(from_pairs(&[("WINDOW", "51")]).unwrap().validate().is_err());
        assert!(from_pairs(&[("WINDOW", "52")]).unwrap().validate().is_ok());
        assert!(from_pairs(&[("TICK_SECS", "0")]).unwrap().validate().is_err());
        assert!(from_pairs(&[("LIQUIDITY_TOLERANCE", "-1")]).unwrap().validate().is_err());
        assert!(from_pairs(&[("VENUE_TIMEOUT_MS", "0")]).unwrap().validate().is_err());
    }

    #[test]
    fn test_derived_parts() {
        let cfg = Config::default();
        assert_eq!(cfg.order_tag().deviation, 20);
        assert_eq!(cfg.bar_source().count, 400);
        assert_eq!(cfg.venue_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.calendar().derisk, cfg.derisk);
    }
}
