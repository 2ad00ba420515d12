use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use flowfocus_core::notify::Alerts;
use flowfocus_core::overlay::{LocalOverlayHost, OverlayView, PushPayload};
use flowfocus_core::storage::{Database, PersistenceStore, SessionSink};
use flowfocus_core::timer::{EngineDeps, TickOutcome, TimerEngine};
use flowfocus_core::{Config, Event, LogNotifier, SessionConfig, TimerState};
use tokio::sync::{broadcast, watch};
use tracing::warn;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start the current session
    Start,
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// Skip to the next session
    Skip,
    /// Reset to the first focus session
    Reset,
    /// Print current timer state as JSON
    Status,
    /// Keep the engine running in the foreground until Ctrl-C
    Run {
        /// Show the compact overlay instead of the primary display
        #[arg(long)]
        minimized: bool,
    },
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    if let TimerAction::Run { minimized } = action {
        return run_foreground(minimized);
    }

    let db = Arc::new(Database::open()?);
    let config = Config::load_or_default().session_config();
    let store = PersistenceStore::new(db.clone());
    let alerts = Alerts::new(Arc::new(LogNotifier));
    let now = Utc::now();

    let mut machine = store.restore(now, &config);
    let mut events = Vec::new();

    // Catch up on whatever happened since the last invocation.
    if machine.awaiting_arm() {
        machine.start(now);
    }
    if let TickOutcome::Completed(event) = machine.reconcile(now) {
        if let Event::SessionCompleted { record, .. } = &event {
            db.record(record)?;
            alerts.session_finished(&config, record.session_type);
        }
        events.push(event);
        if machine.awaiting_arm() {
            machine.start(now);
        }
    }

    let event = match action {
        TimerAction::Start => machine.start(now),
        TimerAction::Pause => machine.pause(now),
        TimerAction::Resume => machine.resume(now),
        TimerAction::Skip => Some(machine.skip(now)),
        TimerAction::Reset => Some(machine.reset(now)),
        TimerAction::Status | TimerAction::Run { .. } => None,
    };
    events.extend(event);
    store.write(machine.state());
    store.write_config(machine.config());

    if events.is_empty() {
        events.push(machine.snapshot(now));
    }
    for event in &events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    Ok(())
}

enum Display {
    Primary(watch::Receiver<TimerState>, SessionConfig),
    Overlay(watch::Receiver<String>),
}

impl Display {
    async fn next_line(&mut self) -> Option<String> {
        match self {
            Display::Primary(rx, config) => {
                rx.changed().await.ok()?;
                let state = rx.borrow_and_update().clone();
                let payload = PushPayload::from_state(0, &state);
                let total = config.duration_secs(state.current_session_type);
                Some(OverlayView::from_payload(&payload, total).render())
            }
            Display::Overlay(rx) => {
                rx.changed().await.ok()?;
                let frame = rx.borrow_and_update().clone();
                Some(frame)
            }
        }
    }
}

fn run_foreground(minimized: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let db = Arc::new(Database::open()?);
        let config = Config::load_or_default().session_config();
        let host = LocalOverlayHost::new();
        let deps = EngineDeps::new(config.clone(), PersistenceStore::new(db.clone()))
            .with_sink(db)
            .with_overlay(Arc::new(host.clone()));
        let engine = TimerEngine::spawn(deps);
        let mut events = engine.events();

        if let Some(event) = engine.start().await? {
            println!("{}", serde_json::to_string(&event)?);
        }

        let mut display = Display::Primary(engine.subscribe(), config);
        if minimized {
            if engine.minimize().await? {
                if let Some(surface) = host.surface() {
                    display = Display::Overlay(surface.frames());
                }
            } else {
                warn!("overlay unavailable; showing the primary display");
            }
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(event) => println!("{}", serde_json::to_string(&event)?),
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                line = display.next_line() => match line {
                    Some(line) => eprintln!("{line}"),
                    None => break,
                },
            }
        }

        engine.shutdown().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
