//! Tick scheduling: close-of-market risk windows, the rotating pass
//! counter and a cooperative shutdown signal.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Serialize;
use tokio::sync::watch;

/// Half-open wall-clock interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl RiskWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }

    /// An inverted or zero-length window can never match.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &RiskWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for RiskWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// Entries and exits suppressed, stop losses stripped.
    DeRisk,
    /// Stop losses restored on open positions.
    ReRisk,
    Normal,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::DeRisk => "derisk",
            SessionPhase::ReRisk => "rerisk",
            SessionPhase::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionCalendar {
    pub derisk: RiskWindow,
    pub rerisk: RiskWindow,
}

impl SessionCalendar {
    pub fn phase_at(&self, t: NaiveTime) -> SessionPhase {
        if self.derisk.contains(t) {
            SessionPhase::DeRisk
        } else if self.rerisk.contains(t) {
            SessionPhase::ReRisk
        } else {
            SessionPhase::Normal
        }
    }
}

/// Wrapping pass counter (1..=max). Plumbed into every pass for future
/// staggering; no decision reads it.
#[derive(Debug, Clone, Copy)]
pub struct RotatingCounter {
    value: u8,
    max: u8,
}

impl RotatingCounter {
    pub fn new(max: u8) -> Self {
        Self { value: 1, max: max.max(1) }
    }

    pub fn get(&self) -> u8 {
        self.value
    }

    pub fn advance(&mut self) -> u8 {
        self.value = if self.value >= self.max { 1 } else { self.value + 1 };
        self.value
    }
}

impl Default for RotatingCounter {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Cooperative stop request shared between the loop and its controller.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger on Ctrl-C.
    pub fn listen_ctrl_c(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                this.trigger();
            }
        });
    }

    /// Sleep for `duration`; returns `false` if a stop request cut it short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = rx.wait_for(|stop| *stop) => false,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimum gap between passes. The full period elapses after every pass,
/// however long the pass took.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    shutdown: Shutdown,
}

impl Ticker {
    pub fn new(period: Duration, shutdown: Shutdown) -> Self {
        Self { period, shutdown }
    }

    pub async fn wait(&self) -> bool {
        self.shutdown.sleep(self.period).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn calendar() -> SessionCalendar {
        SessionCalendar {
            derisk: RiskWindow::new(hm(21, 35), hm(22, 0)),
            rerisk: RiskWindow::new(hm(23, 5), hm(23, 11)),
        }
    }

    #[test]
    fn test_window_is_half_open() {
        let w = RiskWindow::new(hm(21, 35), hm(22, 0));
        assert!(w.contains(hm(21, 35)));
        assert!(w.contains(hm(21, 59)));
        assert!(!w.contains(hm(22, 0)));
        assert!(!w.contains(hm(21, 34)));
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let inverted = RiskWindow::new(hm(23, 11), hm(23, 5));
        assert!(inverted.is_empty());
        assert!(!inverted.contains(hm(23, 8)));
    }

    #[test]
    fn test_overlap() {
        let a = RiskWindow::new(hm(21, 0), hm(22, 0));
        assert!(a.overlaps(&RiskWindow::new(hm(21, 30), hm(23, 0))));
        assert!(!a.overlaps(&RiskWindow::new(hm(22, 0), hm(23, 0))));
    }

    #[test]
    fn test_phase_at() {
        let cal = calendar();
        assert_eq!(cal.phase_at(hm(21, 40)), SessionPhase::DeRisk);
        assert_eq!(cal.phase_at(hm(23, 7)), SessionPhase::ReRisk);
        assert_eq!(cal.phase_at(hm(22, 30)), SessionPhase::Normal);
        assert_eq!(cal.phase_at(hm(9, 0)), SessionPhase::Normal);
    }

    #[test]
    fn test_counter_wraps() {
        let mut c = RotatingCounter::default();
        let seen: Vec<u8> = (0..7).map(|_| c.advance()).collect();
        assert_eq!(seen, vec![2, 3, 4, 5, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();
        let handle = tokio::spawn(async move { remote.sleep(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
        assert!(!handle.await.unwrap());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_sleep_completes_without_stop() {
        let ticker = Ticker::new(Duration::from_millis(5), Shutdown::new());
        assert!(ticker.wait().await);
    }

    #[tokio::test]
    async fn test_sleep_after_trigger_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(!shutdown.sleep(Duration::from_secs(30)).await);
    }
}
