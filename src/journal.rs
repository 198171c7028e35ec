use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::EngineResult;

/// Deterministic id for a command: the same symbol, bar and action always
/// hash to the same id, so a replayed tick is recognisable in the journal.
pub fn intent_id(symbol: &str, bar_ts: i64, action: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(symbol.as_bytes());
    hasher.update(b"|");
    hasher.update(bar_ts.to_le_bytes());
    hasher.update(b"|");
    hasher.update(action.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub intent_id: String,
    pub ts: i64,
    pub symbol: String,
    pub action: String,
    pub outcome: String,
    pub ticket: Option<u64>,
    pub price: Option<f64>,
    pub reason: Option<String>,
}

/// Append-only audit trail of every command the engine sent to the venue.
/// Positions are never restored from it.
pub struct Journal {
    conn: Connection,
}

impl Journal {
    pub fn open(path: &str) -> EngineResult<Self> {
        let journal = Self { conn: Connection::open(path)? };
        journal.init()?;
        Ok(journal)
    }

    pub fn in_memory() -> EngineResult<Self> {
        let journal = Self { conn: Connection::open_in_memory()? };
        journal.init()?;
        Ok(journal)
    }

    fn init(&self) -> EngineResult<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS commands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                intent_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                outcome TEXT NOT NULL,
                ticket INTEGER,
                price REAL,
                reason TEXT
            );
            CREATE INDEX IF NOT EXISTS commands_symbol ON commands (symbol, ts);
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn record(&self, entry: &JournalEntry) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO commands (intent_id, ts, symbol, action, outcome, ticket, price, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.intent_id,
                entry.ts,
                entry.symbol,
                entry.action,
                entry.outcome,
                entry.ticket.map(|t| t as i64),
                entry.price,
                entry.reason,
            ],
        )?;
        Ok(())
    }

    pub fn last_for_symbol(&self, symbol: &str) -> EngineResult<Option<JournalEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT intent_id, ts, symbol, action, outcome, ticket, price, reason
                 FROM commands WHERE symbol = ?1 ORDER BY id DESC LIMIT 1",
                params![symbol],
                |r| {
                    Ok(JournalEntry {
                        intent_id: r.get(0)?,
                        ts: r.get(1)?,
                        symbol: r.get(2)?,
                        action: r.get(3)?,
                        outcome: r.get(4)?,
                        ticket: r.get::<_, Option<i64>>(5)?.map(|t| t as u64),
                        price: r.get(6)?,
                        reason: r.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn count(&self) -> EngineResult<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM commands", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}
