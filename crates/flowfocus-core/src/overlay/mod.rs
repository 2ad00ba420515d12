//! Companion display kept in sync with the engine.

mod channel;
mod local;
pub mod protocol;
pub mod template;

pub use channel::{
    OverlayHost, OverlaySurface, OverlaySyncChannel, SurfaceLink, SurfaceSignal, PUSH_PERIOD,
};
pub use local::{LocalOverlayHost, LocalSurface};
pub use protocol::{decode_message, OverlayMessage, PushPayload, SurfaceEvent};
pub use template::{compact_layout, format_clock, OverlayView, ScreenSize, SurfaceGeometry};
