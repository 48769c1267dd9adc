// Draft room console entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout belongs to the console)
// 2. Load config
// 3. Open database and pick the session to resume or create
// 4. Load the draft order and player pool
// 5. Open the engine (re-arms the clock of a running session)
// 6. Spawn the event dispatcher and the stdin reader thread
// 7. Run the console loop until quit
// 8. Stop the clock and let the dispatcher drain

mod app;
mod commands;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use draftroom_core::config;
use draftroom_core::db::Database;
use draftroom_core::draft::order::DraftOrder;
use draftroom_core::engine::DraftEngine;
use draftroom_core::events::{self, EventSink, JsonLinesSink, LogSink};
use draftroom_core::players::PlayerPool;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Draft room starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {}s pick timer, {}s warning, restricted tags {:?}",
        config.draft.pick_timer_secs, config.draft.warning_secs, config.autopick.restricted_tags
    );

    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    let session_id = match &config.draft.session_id {
        Some(id) => id.clone(),
        None => db
            .get_current_session_id()
            .context("failed to read current session id")?
            .unwrap_or_else(Database::generate_session_id),
    };

    let order = DraftOrder::load(Path::new(&config.data_paths.draft_order))
        .context("failed to load draft order")?;
    let players = PlayerPool::load_csv(Path::new(&config.data_paths.players))
        .context("failed to load player pool")?;
    info!(
        "Loaded {} slots across {} teams and {} players",
        order.len(),
        order.teams().len(),
        players.len()
    );

    let engine = DraftEngine::open(
        config.engine_settings(),
        db,
        Arc::new(players),
        &session_id,
        order,
    )
    .await
    .context("failed to open draft session")?;
    info!("Session {} ready", session_id);

    if let Some(parent) = Path::new(&config.data_paths.event_log).parent() {
        std::fs::create_dir_all(parent).context("failed to create event log directory")?;
    }
    let sinks: Vec<Box<dyn EventSink>> = vec![
        Box::new(LogSink),
        Box::new(JsonLinesSink::new(&config.data_paths.event_log)),
    ];
    let dispatcher = events::spawn_dispatcher(engine.subscribe(), sinks);

    // Blocking stdin on a plain thread; a Tokio stdin read would hold up
    // runtime shutdown until the next line arrives.
    let (line_tx, line_rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    println!("Draft room: session {session_id}. Type 'help' for commands.");
    let mut stdout = std::io::stdout();
    if let Err(e) = app::run(&engine, line_rx, &mut stdout).await {
        error!("Console loop error: {:#}", e);
    }

    engine.shutdown().await;
    drop(engine);

    // The bus closes with the engine; give queued events a moment to land.
    let _ = tokio::time::timeout(Duration::from_secs(5), dispatcher).await;

    info!("Draft room shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (not the terminal, which is used by
/// the console).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("draftroom.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("draftroom_core=info,draftroom=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
