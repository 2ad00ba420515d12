//! Engine side of the companion display.
//!
//! The channel owns at most one live surface and the loop that pushes the
//! current [`TimerState`] onto it. Surfaces talk back through a
//! [`SurfaceLink`] stamped with the generation of the surface that owns it,
//! so a close signal from a surface that was already replaced or torn down
//! is recognised and ignored. The link also cancels the surface's push
//! loop the moment the surface reports itself closed, before the engine has
//! seen the signal.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{OverlayMessage, PushPayload, SurfaceEvent};
use super::template::{compact_layout, ScreenSize, SurfaceGeometry};
use crate::error::OverlayError;
use crate::timer::{SessionConfig, TimerState};

/// Default push cadence.
pub const PUSH_PERIOD: Duration = Duration::from_millis(100);

/// Creates detached surfaces. Implemented by whatever window system hosts
/// the companion display.
pub trait OverlayHost: Send + Sync {
    /// # Errors
    /// Returns an error when the host refuses to create the surface.
    fn open(
        &self,
        geometry: SurfaceGeometry,
        config: &SessionConfig,
        link: SurfaceLink,
    ) -> Result<Arc<dyn OverlaySurface>, OverlayError>;
}

pub trait OverlaySurface: Send + Sync {
    /// Deliver one encoded [`OverlayMessage`].
    ///
    /// # Errors
    /// Returns [`OverlayError::Closed`] once the surface is gone.
    fn post(&self, message: Value) -> Result<(), OverlayError>;

    /// Apply a new placement or session lengths to an already open surface.
    fn reconfigure(&self, geometry: SurfaceGeometry, config: &SessionConfig);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSignal {
    pub generation: u64,
    pub event: SurfaceEvent,
}

/// Return path from a surface to the engine.
#[derive(Debug, Clone)]
pub struct SurfaceLink {
    generation: u64,
    tx: mpsc::UnboundedSender<SurfaceSignal>,
    closed: CancellationToken,
}

impl SurfaceLink {
    pub(crate) fn new(
        generation: u64,
        tx: mpsc::UnboundedSender<SurfaceSignal>,
        closed: CancellationToken,
    ) -> Self {
        Self { generation, tx, closed }
    }

    pub fn send(&self, event: SurfaceEvent) {
        if event == SurfaceEvent::Closed {
            self.closed.cancel();
        }
        let signal = SurfaceSignal {
            generation: self.generation,
            event,
        };
        if self.tx.send(signal).is_err() {
            debug!(?event, "engine gone; surface signal dropped");
        }
    }
}

struct LiveSurface {
    generation: u64,
    surface: Arc<dyn OverlaySurface>,
    pusher: JoinHandle<()>,
    closed: CancellationToken,
    last_ack: u64,
}

impl LiveSurface {
    fn stop(&self) {
        self.closed.cancel();
        self.pusher.abort();
    }
}

pub struct OverlaySyncChannel {
    host: Option<Arc<dyn OverlayHost>>,
    screen: ScreenSize,
    push_period: Duration,
    signals: mpsc::UnboundedSender<SurfaceSignal>,
    generation: u64,
    live: Option<LiveSurface>,
}

impl OverlaySyncChannel {
    /// Returns the channel and the receiver its surfaces signal into.
    pub fn new(
        host: Option<Arc<dyn OverlayHost>>,
        screen: ScreenSize,
        push_period: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SurfaceSignal>) {
        let (signals, rx) = mpsc::unbounded_channel();
        let channel = Self {
            host,
            screen,
            push_period,
            signals,
            generation: 0,
            live: None,
        };
        (channel, rx)
    }

    pub fn is_open(&self) -> bool {
        self.live.is_some()
    }

    /// Open the surface, or update the one already open. Must be called
    /// from within a tokio runtime.
    ///
    /// Returns false when no surface could be created; the engine then
    /// keeps running primary-only.
    pub fn open(&mut self, state: watch::Receiver<TimerState>, config: &SessionConfig) -> bool {
        let geometry = compact_layout(self.screen);
        if let Some(live) = &self.live {
            live.surface.reconfigure(geometry, config);
            return true;
        }
        let Some(host) = &self.host else {
            warn!("no overlay host available; staying on the primary surface");
            return false;
        };

        self.generation += 1;
        let closed = CancellationToken::new();
        let link = SurfaceLink::new(self.generation, self.signals.clone(), closed.clone());
        let surface = match host.open(geometry, config, link) {
            Ok(surface) => surface,
            Err(e) => {
                warn!(error = %e, "overlay surface creation failed");
                return false;
            }
        };

        let pusher = tokio::spawn(push_loop(
            surface.clone(),
            state,
            self.push_period,
            closed.clone(),
        ));
        info!(generation = self.generation, ?geometry, "overlay surface opened");
        self.live = Some(LiveSurface {
            generation: self.generation,
            surface,
            pusher,
            closed,
            last_ack: 0,
        });
        true
    }

    /// Primary-initiated teardown.
    pub fn close(&mut self) {
        if let Some(live) = self.live.take() {
            live.stop();
            if let Err(e) = live.surface.post(OverlayMessage::Close.to_value()) {
                debug!(error = %e, "surface already closed");
            }
            info!(generation = live.generation, "overlay surface closed");
        }
    }

    pub fn reconfigure(&self, config: &SessionConfig) {
        if let Some(live) = &self.live {
            live.surface.reconfigure(compact_layout(self.screen), config);
        }
    }

    /// Apply a signal from a surface. Returns true when the live surface
    /// reported that it was closed.
    pub fn handle_signal(&mut self, signal: SurfaceSignal) -> bool {
        let Some(live) = self.live.as_mut() else {
            return false;
        };
        if live.generation != signal.generation {
            debug!(generation = signal.generation, "signal from a retired surface");
            return false;
        }
        match signal.event {
            SurfaceEvent::Ack { seq } => {
                if seq != live.last_ack + 1 {
                    debug!(expected = live.last_ack + 1, got = seq, "overlay ack gap");
                }
                live.last_ack = seq;
                false
            }
            SurfaceEvent::Closed => {
                live.stop();
                self.live = None;
                info!(generation = signal.generation, "overlay surface closed by user");
                true
            }
        }
    }
}

impl Drop for OverlaySyncChannel {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.stop();
        }
    }
}

async fn push_loop(
    surface: Arc<dyn OverlaySurface>,
    state: watch::Receiver<TimerState>,
    period: Duration,
    closed: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seq = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            _ = interval.tick() => {}
        }
        if closed.is_cancelled() {
            break;
        }
        seq += 1;
        let payload = PushPayload::from_state(seq, &state.borrow());
        if let Err(e) = surface.post(OverlayMessage::Push(payload).to_value()) {
            debug!(error = %e, "stopping overlay pushes");
            break;
        }
    }
}
