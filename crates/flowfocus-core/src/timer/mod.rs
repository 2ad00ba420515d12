mod clock;
mod engine;
mod runtime;
mod session;
mod state;
mod ticker;

pub use clock::{remaining_secs, DriftCorrectingClock, ManualClock, SystemClock, WallClock};
pub use engine::{SessionStateMachine, TickOutcome};
pub use runtime::{EngineDeps, EngineSettings, TimerEngine};
pub use session::{SessionConfig, SessionType};
pub use state::{RunPhase, TimerRecord, TimerState};
pub use ticker::{BackgroundTicker, TickerReport, TICKER_PERIOD};
