//! Compact surface layout and its rendering template.

use serde::Serialize;

use super::protocol::PushPayload;

const SCREEN_MARGIN: u32 = 15;

const TEMPLATE: &str = "{title} | {time} | {progress}% | {status}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Placement of the companion surface in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurfaceGeometry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Size the surface for the compact layout and anchor it top-right.
pub fn compact_layout(screen: ScreenSize) -> SurfaceGeometry {
    let width = fit(220, 160, 300, screen.width, 0.8);
    let height = fit(160, 120, 250, screen.height, 0.7);
    SurfaceGeometry {
        x: screen.width.saturating_sub(width + SCREEN_MARGIN),
        y: SCREEN_MARGIN,
        width,
        height,
    }
}

fn fit(preferred: u32, min: u32, max: u32, screen: u32, share: f64) -> u32 {
    let cap = max.min((f64::from(screen) * share).floor() as u32);
    preferred.min(cap).max(min)
}

/// `MM:SS`; anything that is not a finite, non-negative count renders as
/// `00:00`.
pub fn format_clock(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "00:00".to_string();
    }
    let secs = secs.floor() as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Values substituted into the template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayView {
    pub title: &'static str,
    pub time: String,
    pub progress: u8,
    pub status: &'static str,
}

impl OverlayView {
    /// `total_secs` is the configured length of the pushed session type.
    pub fn from_payload(payload: &PushPayload, total_secs: u64) -> Self {
        let progress = if total_secs == 0 {
            0.0
        } else {
            let done = total_secs.saturating_sub(payload.remaining) as f64;
            (done / total_secs as f64 * 100.0).clamp(0.0, 100.0)
        };
        let status = if payload.is_running {
            "Running"
        } else if payload.remaining == 0 {
            "Complete"
        } else {
            "Paused"
        };
        Self {
            title: payload.session_type.display_name(),
            time: format_clock(payload.remaining as f64),
            progress: progress.round() as u8,
            status,
        }
    }

    pub fn render(&self) -> String {
        TEMPLATE
            .replace("{title}", self.title)
            .replace("{time}", &self.time)
            .replace("{progress}", &self.progress.to_string())
            .replace("{status}", self.status)
    }
}
