//! Error taxonomy for the trading engine.
//!
//! Nothing here is retried within a tick. `DataUnavailable` and `Venue`
//! skip the current symbol; `Configuration` is only raised at startup.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueErrorKind {
    Timeout,
    Rejected,
    Transport,
    Decode,
}

impl fmt::Display for VenueErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VenueErrorKind::Timeout => "timeout",
            VenueErrorKind::Rejected => "rejected",
            VenueErrorKind::Transport => "transport",
            VenueErrorKind::Decode => "decode",
        };
        f.write_str(s)
    }
}

/// Failure of a single venue primitive.
#[derive(Debug, Clone, thiserror::Error)]
#[error("venue {op} failed ({kind}): {reason}")]
pub struct VenueError {
    pub op: &'static str,
    pub kind: VenueErrorKind,
    pub reason: String,
}

impl VenueError {
    pub fn rejected(op: &'static str, reason: impl Into<String>) -> Self {
        Self { op, kind: VenueErrorKind::Rejected, reason: reason.into() }
    }

    pub fn timeout(op: &'static str) -> Self {
        Self { op, kind: VenueErrorKind::Timeout, reason: "deadline elapsed".to_string() }
    }

    pub fn transport(op: &'static str, reason: impl Into<String>) -> Self {
        Self { op, kind: VenueErrorKind::Transport, reason: reason.into() }
    }

    pub fn decode(op: &'static str, reason: impl Into<String>) -> Self {
        Self { op, kind: VenueErrorKind::Decode, reason: reason.into() }
    }

    pub fn from_reqwest(op: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(op)
        } else if err.is_decode() {
            Self::decode(op, err.to_string())
        } else {
            Self::transport(op, err.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error("invalid configuration {key}: {reason}")]
    Configuration { key: String, reason: String },

    #[error("journal error: {0}")]
    Journal(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn data(symbol: &str, reason: impl Into<String>) -> Self {
        EngineError::DataUnavailable { symbol: symbol.to_string(), reason: reason.into() }
    }

    pub fn config(key: &str, reason: impl Into<String>) -> Self {
        EngineError::Configuration { key: key.to_string(), reason: reason.into() }
    }

    /// Symbol-scoped failures skip the symbol for this tick only.
    pub fn skips_symbol(&self) -> bool {
        matches!(self, EngineError::DataUnavailable { .. } | EngineError::Venue(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
