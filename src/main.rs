use std::sync::Arc;

use anyhow::{Context, Result};

use zonefx::config::Config;
use zonefx::engine::Engine;
use zonefx::journal::Journal;
use zonefx::logging::{log, obj, v_str, Domain, Level};
use zonefx::notify::{ChatNotifier, FanOut, LogNotifier, Notifier};
use zonefx::schedule::Shutdown;
use zonefx::venue::{BridgeVenue, PaperVenue, Venue};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;
    if let Err(err) = cfg.validate() {
        log(Level::Fatal, Domain::System, "config_invalid", obj(&[("reason", v_str(&err.to_string()))]));
        return Err(err.into());
    }

    let bridge: Arc<dyn Venue> = Arc::new(
        BridgeVenue::new(&cfg.venue_url, cfg.venue_timeout()).context("venue bridge client")?,
    );
    let venue: Arc<dyn Venue> = if cfg.paper {
        Arc::new(PaperVenue::new(bridge))
    } else {
        bridge
    };
    log(
        Level::Info,
        Domain::System,
        "venue",
        obj(&[
            ("url", v_str(&cfg.venue_url)),
            ("mode", v_str(if cfg.paper { "paper" } else { "live" })),
        ]),
    );

    let mut sinks: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if let (Some(token), Some(chat)) = (&cfg.notify_token, &cfg.notify_chat_id) {
        sinks.push(Box::new(ChatNotifier::new(token, chat, cfg.venue_timeout())?));
    }
    let notifier: Arc<dyn Notifier> = Arc::new(FanOut(sinks));

    let journal = Journal::open(&cfg.journal_path)
        .with_context(|| format!("opening journal {}", cfg.journal_path))?;
    log(
        Level::Info,
        Domain::System,
        "journal_opened",
        obj(&[
            ("path", v_str(&cfg.journal_path)),
            ("commands", serde_json::json!(journal.count()?)),
        ]),
    );

    let shutdown = Shutdown::new();
    shutdown.listen_ctrl_c();

    let mut engine = Engine::new(cfg, venue, notifier)
        .with_journal(journal)
        .with_shutdown(shutdown);
    engine.run().await;
    Ok(())
}
