//! In-process companion surface.
//!
//! Renders every accepted push into a text frame published on a watch
//! channel. The CLI prints the frames; tests inspect them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::channel::{OverlayHost, OverlaySurface, SurfaceLink};
use super::protocol::{decode_message, OverlayMessage, SurfaceEvent};
use super::template::{OverlayView, SurfaceGeometry};
use crate::error::OverlayError;
use crate::timer::SessionConfig;

#[derive(Default)]
struct HostInner {
    blocked: bool,
    opened: u32,
    current: Option<LocalSurface>,
}

/// Host for [`LocalSurface`]s. Clones share state.
#[derive(Clone, Default)]
pub struct LocalOverlayHost {
    inner: Arc<Mutex<HostInner>>,
}

impl LocalOverlayHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that refuses every surface, like a blocked popup.
    pub fn blocked() -> Self {
        let host = Self::default();
        host.lock().blocked = true;
        host
    }

    /// The most recently opened surface.
    pub fn surface(&self) -> Option<LocalSurface> {
        self.lock().current.clone()
    }

    /// How many surfaces this host has created.
    pub fn opened(&self) -> u32 {
        self.lock().opened
    }

    fn lock(&self) -> MutexGuard<'_, HostInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OverlayHost for LocalOverlayHost {
    fn open(
        &self,
        geometry: SurfaceGeometry,
        config: &SessionConfig,
        link: SurfaceLink,
    ) -> Result<Arc<dyn OverlaySurface>, OverlayError> {
        let mut inner = self.lock();
        if inner.blocked {
            return Err(OverlayError::Blocked("local host is blocked".into()));
        }
        let surface = LocalSurface::new(geometry, config.clone(), link);
        inner.opened += 1;
        inner.current = Some(surface.clone());
        Ok(Arc::new(surface))
    }
}

struct SurfaceState {
    geometry: SurfaceGeometry,
    config: SessionConfig,
    applied: u64,
    rejected: u64,
    closed: bool,
}

struct Shared {
    link: SurfaceLink,
    frame: watch::Sender<String>,
    state: Mutex<SurfaceState>,
}

#[derive(Clone)]
pub struct LocalSurface {
    shared: Arc<Shared>,
}

impl LocalSurface {
    fn new(geometry: SurfaceGeometry, config: SessionConfig, link: SurfaceLink) -> Self {
        let (frame, _) = watch::channel(String::new());
        Self {
            shared: Arc::new(Shared {
                link,
                frame,
                state: Mutex::new(SurfaceState {
                    geometry,
                    config,
                    applied: 0,
                    rejected: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Rendered frames, newest last.
    pub fn frames(&self) -> watch::Receiver<String> {
        self.shared.frame.subscribe()
    }

    pub fn current_frame(&self) -> String {
        self.shared.frame.borrow().clone()
    }

    /// Pushes applied so far.
    pub fn applied(&self) -> u64 {
        self.lock().applied
    }

    /// Messages discarded by validation.
    pub fn rejected(&self) -> u64 {
        self.lock().rejected
    }

    pub fn geometry(&self) -> SurfaceGeometry {
        self.lock().geometry
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Simulate the user closing the surface.
    pub fn close_by_user(&self) {
        self.lock().closed = true;
        self.shared.link.send(SurfaceEvent::Closed);
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OverlaySurface for LocalSurface {
    fn post(&self, message: Value) -> Result<(), OverlayError> {
        let mut state = self.lock();
        if state.closed {
            return Err(OverlayError::Closed);
        }
        match decode_message(&message) {
            Ok(OverlayMessage::Push(payload)) => {
                let total = state.config.duration_secs(payload.session_type);
                let frame = OverlayView::from_payload(&payload, total).render();
                self.shared.frame.send_if_modified(|current| {
                    if *current == frame {
                        return false;
                    }
                    *current = frame;
                    true
                });
                state.applied += 1;
                drop(state);
                self.shared.link.send(SurfaceEvent::Ack { seq: payload.seq });
            }
            Ok(OverlayMessage::Close) => {
                debug!("surface closed by the primary");
                state.closed = true;
            }
            Err(e) => {
                warn!(error = %e, "discarding invalid overlay message");
                state.rejected += 1;
            }
        }
        Ok(())
    }

    fn reconfigure(&self, geometry: SurfaceGeometry, config: &SessionConfig) {
        let mut state = self.lock();
        state.geometry = geometry;
        state.config = config.clone();
    }
}
