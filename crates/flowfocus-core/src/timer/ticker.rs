//! Background ticker.
//!
//! Runs on its own OS thread so it keeps its ~1 Hz cadence even when the
//! async runtime driving the primary tick loop is starved or throttled.
//! It owns nothing but a target instant: it recomputes remaining time from
//! the wall clock and reports, and the engine decides what the report
//! means.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::clock::{remaining_secs, WallClock};

/// Default ticker cadence.
pub const TICKER_PERIOD: Duration = Duration::from_secs(1);

/// What the ticker thread reports back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TickerReport {
    Tick {
        remaining: u64,
        timestamp: DateTime<Utc>,
        target: DateTime<Utc>,
    },
    Complete {
        target: DateTime<Utc>,
    },
}

impl TickerReport {
    pub fn target(&self) -> DateTime<Utc> {
        match self {
            TickerReport::Tick { target, .. } | TickerReport::Complete { target } => *target,
        }
    }
}

#[derive(Debug)]
enum TickerCommand {
    Start(DateTime<Utc>),
    Stop,
    Shutdown,
}

/// Handle to the ticker thread. Dropping it shuts the thread down.
pub struct BackgroundTicker {
    commands: mpsc::Sender<TickerCommand>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTicker {
    /// Spawn the ticker thread.
    ///
    /// # Errors
    /// Returns an error if the OS refuses to create the thread.
    pub fn spawn(
        clock: Arc<dyn WallClock>,
        period: Duration,
        reports: UnboundedSender<TickerReport>,
    ) -> std::io::Result<Self> {
        let (commands, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("flowfocus-ticker".into())
            .spawn(move || run_loop(rx, clock, period, reports))?;
        Ok(Self {
            commands,
            handle: Some(handle),
        })
    }

    /// Begin counting down to `target`, replacing any previous target.
    pub fn start(&self, target: DateTime<Utc>) {
        self.send(TickerCommand::Start(target));
    }

    pub fn stop(&self) {
        self.send(TickerCommand::Stop);
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.join();
    }

    fn send(&self, command: TickerCommand) {
        if self.commands.send(command).is_err() {
            warn!("background ticker thread is gone; command dropped");
        }
    }

    fn join(&mut self) {
        let _ = self.commands.send(TickerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("background ticker thread panicked");
            }
        }
    }
}

impl Drop for BackgroundTicker {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_loop(
    rx: mpsc::Receiver<TickerCommand>,
    clock: Arc<dyn WallClock>,
    period: Duration,
    reports: UnboundedSender<TickerReport>,
) {
    let mut target: Option<DateTime<Utc>> = None;
    loop {
        let command = if target.is_some() {
            match rx.recv_timeout(period) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        match command {
            Some(TickerCommand::Start(t)) => {
                debug!(deadline = %t, "ticker armed");
                target = Some(t);
            }
            Some(TickerCommand::Stop) => {
                debug!("ticker stopped");
                target = None;
            }
            Some(TickerCommand::Shutdown) => break,
            None => {}
        }

        let Some(t) = target else { continue };
        let now = clock.now();
        let remaining = remaining_secs(t, now);
        let report = if remaining == 0 {
            target = None;
            TickerReport::Complete { target: t }
        } else {
            TickerReport::Tick {
                remaining,
                timestamp: now,
                target: t,
            }
        };
        if reports.send(report).is_err() {
            // Engine dropped its receiver.
            break;
        }
    }
    debug!("ticker thread exiting");
}
