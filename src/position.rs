//! Per-symbol position lifecycle.
//!
//! The venue owns positions; the state here is rebuilt from a fresh venue
//! query at the top of every tick and never carried across ticks. Each
//! tick yields at most one command per symbol: a flat symbol may open, an
//! open symbol may close. A flip from long to short always takes two ticks.

use serde::Serialize;

use crate::signals::{EntrySignal, ReverseSignal};
use crate::venue::{PositionRecord, PositionSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionState {
    Flat,
    Open { side: PositionSide, ticket: u64 },
}

impl PositionState {
    /// The first venue position for the symbol defines the state.
    pub fn observe(positions: &[PositionRecord]) -> Self {
        match positions.first() {
            Some(p) => PositionState::Open { side: p.side, ticket: p.ticket },
            None => PositionState::Flat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Open { side: PositionSide },
    Close { side: PositionSide, ticket: u64 },
    Hold,
}

/// Explicit reverse mapping: a demand reverse closes a short, a supply
/// reverse closes a long. A reverse signal never opens anything.
pub fn reverse_closes(reverse: ReverseSignal, held: PositionSide) -> bool {
    matches!(
        (reverse, held),
        (ReverseSignal::Demand, PositionSide::Short) | (ReverseSignal::Supply, PositionSide::Long)
    )
}

pub fn decide(
    state: PositionState,
    pending_orders: usize,
    entry: EntrySignal,
    reverse: ReverseSignal,
) -> Decision {
    match state {
        PositionState::Flat if pending_orders == 0 => match entry {
            EntrySignal::Long => Decision::Open { side: PositionSide::Long },
            EntrySignal::Short => Decision::Open { side: PositionSide::Short },
            EntrySignal::None => Decision::Hold,
        },
        PositionState::Flat => Decision::Hold,
        PositionState::Open { side, ticket } if reverse_closes(reverse, side) => {
            Decision::Close { side, ticket }
        }
        PositionState::Open { .. } => Decision::Hold,
    }
}

/// State the symbol is in once `decision` has filled.
pub fn next_state(state: PositionState, decision: Decision, ticket: Option<u64>) -> PositionState {
    match (state, decision) {
        (PositionState::Flat, Decision::Open { side }) => PositionState::Open { side, ticket: ticket.unwrap_or(0) },
        (PositionState::Open { .. }, Decision::Close { .. }) => PositionState::Flat,
        (s, _) => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(side: PositionSide, ticket: u64) -> PositionRecord {
        PositionRecord {
            symbol: "GBPUSD".to_string(),
            side,
            ticket,
            volume: 0.01,
            entry_price: 1.27,
            current_profit: 0.0,
            stop_loss: None,
            take_profit: None,
        }
    }

    #[test]
    fn test_observe() {
        assert_eq!(PositionState::observe(&[]), PositionState::Flat);
        let state = PositionState::observe(&[record(PositionSide::Short, 7), record(PositionSide::Long, 8)]);
        assert_eq!(state, PositionState::Open { side: PositionSide::Short, ticket: 7 });
    }

    #[test]
    fn test_flat_opens_on_entry() {
        assert_eq!(
            decide(PositionState::Flat, 0, EntrySignal::Long, ReverseSignal::None),
            Decision::Open { side: PositionSide::Long }
        );
        assert_eq!(
            decide(PositionState::Flat, 0, EntrySignal::Short, ReverseSignal::Supply),
            Decision::Open { side: PositionSide::Short }
        );
    }

    #[test]
    fn test_pending_order_blocks_open() {
        assert_eq!(decide(PositionState::Flat, 1, EntrySignal::Long, ReverseSignal::None), Decision::Hold);
    }

    #[test]
    fn test_reverse_never_opens() {
        assert_eq!(decide(PositionState::Flat, 0, EntrySignal::None, ReverseSignal::Demand), Decision::Hold);
        assert_eq!(decide(PositionState::Flat, 0, EntrySignal::None, ReverseSignal::Supply), Decision::Hold);
    }

    #[test]
    fn test_open_never_reopens() {
        let open = PositionState::Open { side: PositionSide::Long, ticket: 3 };
        assert_eq!(decide(open, 0, EntrySignal::Long, ReverseSignal::None), Decision::Hold);
        assert_eq!(decide(open, 0, EntrySignal::Short, ReverseSignal::None), Decision::Hold);
    }

    #[test]
    fn test_reverse_mapping_table() {
        let long = PositionState::Open { side: PositionSide::Long, ticket: 1 };
        let short = PositionState::Open { side: PositionSide::Short, ticket: 2 };
        let cases = [
            (long, ReverseSignal::Supply, Decision::Close { side: PositionSide::Long, ticket: 1 }),
            (long, ReverseSignal::Demand, Decision::Hold),
            (long, ReverseSignal::None, Decision::Hold),
            (short, ReverseSignal::Demand, Decision::Close { side: PositionSide::Short, ticket: 2 }),
            (short, ReverseSignal::Supply, Decision::Hold),
            (short, ReverseSignal::None, Decision::Hold),
        ];
        for (state, reverse, expected) in cases {
            assert_eq!(decide(state, 0, EntrySignal::None, reverse), expected, "{:?} {:?}", state, reverse);
        }
    }

    #[test]
    fn test_next_state() {
        let opened = next_state(PositionState::Flat, Decision::Open { side: PositionSide::Short }, Some(11));
        assert_eq!(opened, PositionState::Open { side: PositionSide::Short, ticket: 11 });
        let closed = next_state(opened, Decision::Close { side: PositionSide::Short, ticket: 11 }, None);
        assert_eq!(closed, PositionState::Flat);
        assert_eq!(next_state(closed, Decision::Hold, None), PositionState::Flat);
    }
}
