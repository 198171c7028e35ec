//! Two-candle engulfing patterns on the last closed pair (indices -3, -2).

use crate::bars::BarWindow;

pub fn bullish_engulfing(window: &BarWindow) -> bool {
    let (prev, cur) = (window.back(3), window.back(2));
    prev.is_bearish()
        && cur.is_bullish()
        && cur.c > prev.o
        && cur.o <= prev.c
        && cur.h > prev.h
}

pub fn bearish_engulfing(window: &BarWindow) -> bool {
    let (prev, cur) = (window.back(3), window.back(2));
    prev.is_bullish()
        && cur.is_bearish()
        && cur.c < prev.o
        && cur.o >= prev.c
        && cur.l < prev.l
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::{Candle, Timeframe};

    fn window_with_tail(prev: (f64, f64, f64, f64), cur: (f64, f64, f64, f64)) -> BarWindow {
        let mut candles: Vec<Candle> = (0..52)
            .map(|i| Candle { ts: i * 300, o: 1.0, h: 1.01, l: 0.99, c: 1.0, v: 1.0 })
            .collect();
        let n = candles.len();
        let set = |c: &mut Candle, (o, h, l, cl): (f64, f64, f64, f64)| {
            c.o = o;
            c.h = h;
            c.l = l;
            c.c = cl;
        };
        set(&mut candles[n - 3], prev);
        set(&mut candles[n - 2], cur);
        BarWindow::new("EURUSD", Timeframe::M5, candles).unwrap()
    }

    #[test]
    fn test_bullish_engulfing() {
        let w = window_with_tail((1.02, 1.025, 1.0, 1.005), (1.004, 1.03, 1.0, 1.028));
        assert!(bullish_engulfing(&w));
        assert!(!bearish_engulfing(&w));
    }

    #[test]
    fn test_bearish_engulfing() {
        let w = window_with_tail((1.0, 1.02, 0.995, 1.015), (1.016, 1.02, 0.99, 0.998));
        assert!(bearish_engulfing(&w));
        assert!(!bullish_engulfing(&w));
    }

    #[test]
    fn test_inside_bar_is_not_engulfing() {
        let w = window_with_tail((1.02, 1.03, 0.99, 1.0), (1.001, 1.01, 0.995, 1.005));
        assert!(!bullish_engulfing(&w));
    }
}
