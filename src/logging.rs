//! Structured JSON-lines logging.
//!
//! Every record goes to stdout and to a per-run directory under `LOG_DIR`
//! (`events.jsonl` for info and above, `trace.jsonl` for debug/trace).
//! Filter with `LOG_LEVEL` and `LOG_DOMAINS` (comma list or `all`).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Levels and domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Market,   // bar windows, indicator readings
    Strategy, // zone labels, entry/reverse signals
    Risk,     // TP/SL levels, stop-loss strip/restore
    Exec,     // venue commands and their outcomes
    Schedule, // session phase, tick pacing
    System,   // startup, shutdown, configuration
    Notify,   // operator notices
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Market => "market",
            Domain::Strategy => "strategy",
            Domain::Risk => "risk",
            Domain::Exec => "exec",
            Domain::Schedule => "schedule",
            Domain::System => "system",
            Domain::Notify => "notify",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] cannot create {}: {}", path.display(), err);
            None
        }
    }
}

fn run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("z-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let run_dir = PathBuf::from(base).join(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({ "run_id": run_id, "ts": ts_now(), "pid": process::id() }).to_string(),
        );
        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

/// Credentials never reach a log line.
fn redact(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in ["token", "notify_token", "chat_id"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), Value::String("[REDACTED]".to_string()));
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["intent_id", "symbol", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(sink: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(Ok(mut w)) = sink.as_ref().map(|s| s.lock()) {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core
// =============================================================================

pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain, event, fields);
}

fn emit_record(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let ctx = run_context();
    let (mut top, data) = split_fields(redact(fields));

    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("domain".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), top.remove("msg").unwrap_or(Value::String(String::new())));
    entry.extend(top);
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

// =============================================================================
// Domain helpers
// =============================================================================

pub fn log_bar_window(symbol: &str, timeframe: &str, len: usize, last_ts: i64) {
    log(
        Level::Trace,
        Domain::Market,
        "bar_window",
        obj(&[
            ("symbol", v_str(symbol)),
            ("timeframe", v_str(timeframe)),
            ("len", json!(len)),
            ("last_ts", json!(last_ts)),
        ]),
    );
}

pub fn log_indicators(symbol: &str, atr: f64, rsi: f64, liquidity: f64, peak_close: f64) {
    log(
        Level::Debug,
        Domain::Market,
        "indicators",
        obj(&[
            ("symbol", v_str(symbol)),
            ("atr", v_num(atr)),
            ("rsi", v_num(rsi)),
            ("liquidity", v_num(liquidity)),
            ("peak_close", v_num(peak_close)),
        ]),
    );
}

pub fn log_signal(symbol: &str, entry: &str, reverse: &str, short_zone: &str, long_zone: &str) {
    log(
        Level::Debug,
        Domain::Strategy,
        "signal",
        obj(&[
            ("symbol", v_str(symbol)),
            ("entry", v_str(entry)),
            ("reverse", v_str(reverse)),
            ("short_zone_3", v_str(short_zone)),
            ("long_zone_3", v_str(long_zone)),
        ]),
    );
}

pub fn log_command(intent_id: &str, symbol: &str, action: &str, side: &str, price: f64, ticket: u64) {
    log(
        Level::Info,
        Domain::Exec,
        "command",
        obj(&[
            ("intent_id", v_str(intent_id)),
            ("symbol", v_str(symbol)),
            ("action", v_str(action)),
            ("side", v_str(side)),
            ("price", v_num(price)),
            ("ticket", json!(ticket)),
        ]),
    );
}

pub fn log_command_failed(intent_id: &str, symbol: &str, action: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Exec,
        "command_failed",
        obj(&[
            ("intent_id", v_str(intent_id)),
            ("symbol", v_str(symbol)),
            ("action", v_str(action)),
            ("reason", v_str(reason)),
        ]),
    );
}

pub fn log_stop_loss(symbol: &str, ticket: u64, stop_loss: Option<f64>) {
    log(
        Level::Info,
        Domain::Risk,
        if stop_loss.is_some() { "stop_loss_restored" } else { "stop_loss_removed" },
        obj(&[
            ("symbol", v_str(symbol)),
            ("ticket", json!(ticket)),
            ("stop_loss", stop_loss.map(v_num).unwrap_or(Value::Null)),
        ]),
    );
}

/// Floating profit summed over the symbol's open positions.
pub fn log_position_profit(symbol: &str, positions: usize, profit: f64) {
    log(
        Level::Info,
        Domain::Risk,
        "position_profit",
        obj(&[
            ("symbol", v_str(symbol)),
            ("positions", json!(positions)),
            ("profit", v_num(profit)),
        ]),
    );
}

pub fn log_symbol_skipped(symbol: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Market,
        "symbol_skipped",
        obj(&[("symbol", v_str(symbol)), ("reason", v_str(reason))]),
    );
}

pub fn log_phase(phase: &str, counter: u8) {
    log(
        Level::Debug,
        Domain::Schedule,
        "phase",
        obj(&[("phase", v_str(phase)), ("counter", json!(counter))]),
    );
}

pub fn log_tick_summary(phase: &str, symbols: usize, commands: usize, failures: usize, elapsed_ms: f64) {
    log(
        Level::Info,
        Domain::Schedule,
        "tick_summary",
        obj(&[
            ("phase", v_str(phase)),
            ("symbols", json!(symbols)),
            ("commands", json!(commands)),
            ("failures", json!(failures)),
            ("elapsed_ms", v_num(elapsed_ms)),
        ]),
    );
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Non-finite readings serialize as null.
pub fn v_num(n: f64) -> Value {
    json!(n)
}
