//! Zone-based FX signal engine: pulls candle history per symbol, labels
//! supply/demand zones, detects entries and reverse exits, and drives
//! positions on an external venue.

pub mod bars;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod journal;
pub mod logging;
pub mod notify;
pub mod patterns;
pub mod position;
pub mod report;
pub mod risk;
pub mod schedule;
pub mod signals;
pub mod venue;
pub mod zones;
