//! Async timer engine.
//!
//! [`TimerEngine`] is a cloneable handle to a single actor task that owns the
//! [`SessionStateMachine`]. Every input reaches the actor as a message:
//! commands from the handle, ticks from the primary loop, reports from the
//! [`BackgroundTicker`] thread, signals from the companion surface, and the
//! delayed auto-start. The actor is therefore the only writer of
//! [`TimerState`], and it persists and publishes the state after every
//! mutation.
//!
//! Before each transition the actor cancels the primary loop, stops the
//! ticker and drops any pending auto-start, then re-arms whatever the new
//! state needs.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::{SystemClock, WallClock};
use super::engine::{SessionStateMachine, TickOutcome};
use super::session::SessionConfig;
use super::state::{RunPhase, TimerState};
use super::ticker::{BackgroundTicker, TickerReport, TICKER_PERIOD};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::notify::{Alerts, Cue, LogNotifier, Notifier};
use crate::overlay::{OverlayHost, OverlaySyncChannel, ScreenSize, SurfaceSignal, PUSH_PERIOD};
use crate::storage::{PersistenceStore, SessionSink};

/// Cadences and delays of the engine's scheduled work.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Primary tick loop period.
    pub primary_tick: Duration,
    pub ticker_period: Duration,
    pub push_period: Duration,
    /// Pause between a completion and the auto-started next session.
    pub cue_delay: Duration,
    pub screen: ScreenSize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            primary_tick: Duration::from_millis(250),
            ticker_period: TICKER_PERIOD,
            push_period: PUSH_PERIOD,
            cue_delay: Duration::from_secs(1),
            screen: ScreenSize::default(),
        }
    }
}

/// Collaborators handed to [`TimerEngine::spawn`].
pub struct EngineDeps {
    pub config: SessionConfig,
    pub store: PersistenceStore,
    pub clock: Arc<dyn WallClock>,
    pub sink: Option<Arc<dyn SessionSink>>,
    pub notifier: Arc<dyn Notifier>,
    pub overlay: Option<Arc<dyn OverlayHost>>,
    pub settings: EngineSettings,
}

impl EngineDeps {
    pub fn new(config: SessionConfig, store: PersistenceStore) -> Self {
        Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            sink: None,
            notifier: Arc::new(LogNotifier),
            overlay: None,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_overlay(mut self, host: Arc<dyn OverlayHost>) -> Self {
        self.overlay = Some(host);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }
}

enum Command {
    Start(oneshot::Sender<Option<Event>>),
    Pause(oneshot::Sender<Option<Event>>),
    Resume(oneshot::Sender<Option<Event>>),
    Skip(oneshot::Sender<Event>),
    Reset(oneshot::Sender<Event>),
    Minimize(oneshot::Sender<bool>),
    Restore(oneshot::Sender<()>),
    IsMinimized(oneshot::Sender<bool>),
    UpdateConfig(SessionConfig, oneshot::Sender<()>),
    SetPrimaryVisible(bool, oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug)]
enum Internal {
    Tick(DateTime<Utc>),
    AutoStart(u64),
}

/// Handle to a running engine. Clones address the same engine.
#[derive(Clone)]
pub struct TimerEngine {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<TimerState>,
    events: broadcast::Sender<Event>,
}

impl TimerEngine {
    /// Recover state from the store and start the engine task. Must be
    /// called from within a tokio runtime.
    ///
    /// A stored idle or paused session is re-seeded when `config` changed
    /// its length since the snapshot was written.
    pub fn spawn(deps: EngineDeps) -> Self {
        let EngineDeps {
            config,
            store,
            clock,
            sink,
            notifier,
            overlay,
            settings,
        } = deps;

        let machine = store.restore(clock.now(), &config);

        let (state_tx, state_rx) = watch::channel(machine.state().clone());
        let (events_tx, _) = broadcast::channel(64);
        let (command_tx, command_rx) = mpsc::channel(32);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (overlay, signals) = OverlaySyncChannel::new(overlay, settings.screen, settings.push_period);

        let ticker = match BackgroundTicker::spawn(clock.clone(), settings.ticker_period, report_tx) {
            Ok(ticker) => Some(ticker),
            Err(e) => {
                warn!(error = %e, "background ticker unavailable; relying on the primary loop");
                None
            }
        };

        let mut actor = Actor {
            machine,
            store,
            clock,
            sink,
            alerts: Alerts::new(notifier),
            overlay,
            ticker,
            primary: None,
            pending_start: None,
            pending_generation: 0,
            internal_tx,
            state_tx,
            events_tx: events_tx.clone(),
            settings,
            minimized: false,
            visible: true,
        };
        actor.boot();
        tokio::spawn(actor.run(command_rx, internal_rx, report_rx, signals));

        Self {
            commands: command_tx,
            state: state_rx,
            events: events_tx,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// The latest published state.
    pub fn get_snapshot(&self) -> TimerState {
        self.state.borrow().clone()
    }

    /// Watch channel carrying every published state.
    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state.clone()
    }

    /// Stream of engine events, including completions that happen between
    /// commands.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub async fn is_minimized(&self) -> Result<bool> {
        self.request(Command::IsMinimized).await
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn start(&self) -> Result<Option<Event>> {
        self.request(Command::Start).await
    }

    pub async fn pause(&self) -> Result<Option<Event>> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<Option<Event>> {
        self.request(Command::Resume).await
    }

    pub async fn skip(&self) -> Result<Event> {
        self.request(Command::Skip).await
    }

    pub async fn reset(&self) -> Result<Event> {
        self.request(Command::Reset).await
    }

    /// Open the companion surface. Returns false when the host refused it.
    pub async fn minimize(&self) -> Result<bool> {
        self.request(Command::Minimize).await
    }

    /// Close the companion surface and return to the primary one.
    pub async fn restore(&self) -> Result<()> {
        self.request(Command::Restore).await
    }

    pub async fn update_config(&self, config: SessionConfig) -> Result<()> {
        self.request(|reply| Command::UpdateConfig(config, reply)).await
    }

    /// Report primary-surface visibility. Becoming visible recomputes the
    /// remaining time from the wall clock at once.
    pub async fn set_primary_visible(&self, visible: bool) -> Result<()> {
        self.request(|reply| Command::SetPrimaryVisible(visible, reply)).await
    }

    /// Stop all scheduled work and end the engine task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| CoreError::EngineStopped)?;
        rx.await.map_err(|_| CoreError::EngineStopped)
    }
}

struct Actor {
    machine: SessionStateMachine,
    store: PersistenceStore,
    clock: Arc<dyn WallClock>,
    sink: Option<Arc<dyn SessionSink>>,
    alerts: Alerts,
    overlay: OverlaySyncChannel,
    ticker: Option<BackgroundTicker>,
    primary: Option<JoinHandle<()>>,
    pending_start: Option<JoinHandle<()>>,
    pending_generation: u64,
    internal_tx: mpsc::UnboundedSender<Internal>,
    state_tx: watch::Sender<TimerState>,
    events_tx: broadcast::Sender<Event>,
    settings: EngineSettings,
    minimized: bool,
    visible: bool,
}

impl Actor {
    fn boot(&mut self) {
        let state = self.machine.state();
        info!(
            session = state.current_session,
            session_type = %state.current_session_type,
            remaining = state.time_remaining,
            phase = ?state.phase,
            "timer engine starting"
        );
        self.store.write_config(self.machine.config());
        self.commit(None);
        if self.machine.awaiting_arm() {
            let event = self.machine.start(self.clock.now());
            self.arm_loops();
            self.commit(event.as_ref());
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut reports: mpsc::UnboundedReceiver<TickerReport>,
        mut signals: mpsc::UnboundedReceiver<SurfaceSignal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).is_break() {
                        return;
                    }
                }
                Some(input) = internal.recv() => self.on_internal(input),
                Some(report) = reports.recv() => self.on_tick(report.target()),
                Some(signal) = signals.recv() => self.on_signal(signal),
            }
        }
        self.teardown();
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Start(reply) => {
                let _ = reply.send(self.start());
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.resume());
            }
            Command::Skip(reply) => {
                let _ = reply.send(self.skip());
            }
            Command::Reset(reply) => {
                let _ = reply.send(self.reset());
            }
            Command::Minimize(reply) => {
                let _ = reply.send(self.minimize());
            }
            Command::Restore(reply) => {
                self.restore();
                let _ = reply.send(());
            }
            Command::IsMinimized(reply) => {
                let _ = reply.send(self.minimized);
            }
            Command::UpdateConfig(config, reply) => {
                self.update_config(config);
                let _ = reply.send(());
            }
            Command::SetPrimaryVisible(visible, reply) => {
                self.set_primary_visible(visible);
                let _ = reply.send(());
            }
            Command::Shutdown(reply) => {
                self.teardown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // ── Operations ───────────────────────────────────────────────────

    fn start(&mut self) -> Option<Event> {
        if self.machine.is_armed() {
            return None;
        }
        self.cancel_scheduled();
        let from_idle = self.machine.state().phase == RunPhase::Idle;
        let event = self.machine.start(self.clock.now());
        if from_idle {
            self.alerts.cue(self.machine.config(), Cue::Start);
        }
        self.arm_loops();
        self.commit(event.as_ref());
        event
    }

    fn pause(&mut self) -> Option<Event> {
        if self.machine.state().phase != RunPhase::Running {
            return None;
        }
        self.cancel_scheduled();
        let event = self.machine.pause(self.clock.now());
        self.alerts.cue(self.machine.config(), Cue::Pause);
        self.commit(event.as_ref());
        event
    }

    fn resume(&mut self) -> Option<Event> {
        if self.machine.state().phase != RunPhase::Paused {
            return None;
        }
        self.cancel_scheduled();
        let event = self.machine.resume(self.clock.now());
        self.arm_loops();
        self.commit(event.as_ref());
        event
    }

    fn skip(&mut self) -> Event {
        self.cancel_scheduled();
        let event = self.machine.skip(self.clock.now());
        self.arm_loops();
        self.commit(Some(&event));
        event
    }

    fn reset(&mut self) -> Event {
        self.cancel_scheduled();
        let event = self.machine.reset(self.clock.now());
        self.commit(Some(&event));
        event
    }

    fn minimize(&mut self) -> bool {
        let opened = self
            .overlay
            .open(self.state_tx.subscribe(), self.machine.config());
        self.minimized = opened;
        opened
    }

    fn restore(&mut self) {
        self.overlay.close();
        self.minimized = false;
    }

    fn update_config(&mut self, config: SessionConfig) {
        if self.machine.update_config(config, self.clock.now()) {
            self.cancel_scheduled();
            self.arm_loops();
        }
        self.overlay.reconfigure(self.machine.config());
        self.store.write_config(self.machine.config());
        self.commit(None);
    }

    fn set_primary_visible(&mut self, visible: bool) {
        self.visible = visible;
        debug!(visible, "primary surface visibility changed");
        if visible {
            let outcome = self.machine.reconcile(self.clock.now());
            self.apply(outcome);
        }
    }

    // ── Inputs ───────────────────────────────────────────────────────

    fn on_internal(&mut self, input: Internal) {
        match input {
            Internal::Tick(target) => self.on_tick(target),
            Internal::AutoStart(generation) => {
                if generation != self.pending_generation || !self.machine.awaiting_arm() {
                    return;
                }
                self.pending_start = None;
                let event = self.machine.start(self.clock.now());
                self.arm_loops();
                self.commit(event.as_ref());
            }
        }
    }

    fn on_tick(&mut self, target: DateTime<Utc>) {
        let outcome = self.machine.tick(target, self.clock.now());
        self.apply(outcome);
    }

    fn on_signal(&mut self, signal: SurfaceSignal) {
        if self.overlay.handle_signal(signal) {
            self.minimized = false;
        }
    }

    fn apply(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Stale | TickOutcome::Unchanged => {}
            TickOutcome::Updated(remaining) => {
                debug!(remaining, visible = self.visible, "tick");
                self.commit(None);
            }
            TickOutcome::Completed(event) => self.finish(event),
        }
    }

    fn finish(&mut self, event: Event) {
        self.cancel_scheduled();
        if let Event::SessionCompleted { record, next, .. } = &event {
            info!(finished = %record.session_type, next = %next, "session completed");
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.record(record) {
                    warn!(error = %e, "failed to record completed session");
                }
            }
            self.alerts
                .session_finished(self.machine.config(), record.session_type);
        }
        self.commit(Some(&event));
        if self.machine.awaiting_arm() {
            self.schedule_auto_start();
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Stop the primary loop, the ticker and any pending auto-start.
    fn cancel_scheduled(&mut self) {
        if let Some(handle) = self.primary.take() {
            handle.abort();
        }
        if let Some(ticker) = &self.ticker {
            ticker.stop();
        }
        if let Some(handle) = self.pending_start.take() {
            handle.abort();
        }
        self.pending_generation += 1;
    }

    /// Start the primary loop and the ticker against the armed target.
    fn arm_loops(&mut self) {
        let Some(target) = self.machine.target() else {
            return;
        };
        let tx = self.internal_tx.clone();
        let period = self.settings.primary_tick;
        self.primary = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(Internal::Tick(target)).is_err() {
                    break;
                }
            }
        }));
        if let Some(ticker) = &self.ticker {
            ticker.start(target);
        }
    }

    fn schedule_auto_start(&mut self) {
        self.pending_generation += 1;
        let generation = self.pending_generation;
        let tx = self.internal_tx.clone();
        let delay = self.settings.cue_delay;
        self.pending_start = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::AutoStart(generation));
        }));
    }

    /// Persist and publish the current state.
    fn commit(&mut self, event: Option<&Event>) {
        let state = self.machine.state().clone();
        self.store.write(&state);
        self.state_tx.send_replace(state);
        if let Some(event) = event {
            // No subscribers is fine.
            let _ = self.events_tx.send(event.clone());
        }
    }

    fn teardown(&mut self) {
        self.cancel_scheduled();
        self.overlay.close();
        self.minimized = false;
        if let Some(ticker) = self.ticker.take() {
            // Joining the thread blocks; keep it off the runtime workers.
            tokio::task::spawn_blocking(move || ticker.shutdown());
        }
        info!("timer engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NotifyError, StorageError};
    use crate::events::CompletedSession;
    use crate::notify::CompletionNotice;
    use crate::overlay::LocalOverlayHost;
    use crate::storage::{KvStore, MemoryKv, SNAPSHOT_KEY};
    use crate::timer::{ManualClock, SessionType};
    use chrono::Local;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Sink(Mutex<Vec<CompletedSession>>);

    impl SessionSink for Sink {
        fn record(&self, session: &CompletedSession) -> std::result::Result<(), StorageError> {
            self.0.lock().unwrap().push(session.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        cues: Mutex<Vec<Cue>>,
        notices: Mutex<Vec<CompletionNotice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: &CompletionNotice) -> std::result::Result<(), NotifyError> {
            self.notices.lock().unwrap().push(notice.clone());
            Ok(())
        }

        fn play_cue(&self, cue: Cue, _volume: u8) -> std::result::Result<(), NotifyError> {
            self.cues.lock().unwrap().push(cue);
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _notice: &CompletionNotice) -> std::result::Result<(), NotifyError> {
            Err(NotifyError::PermissionDenied)
        }

        fn play_cue(&self, _cue: Cue, _volume: u8) -> std::result::Result<(), NotifyError> {
            Err(NotifyError::Dispatch("no audio device".into()))
        }
    }

    fn local_noon() -> DateTime<Utc> {
        Local::now()
            .date_naive()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    struct Harness {
        engine: TimerEngine,
        clock: ManualClock,
        sink: Arc<Sink>,
        kv: MemoryKv,
    }

    fn standard(auto_start: bool) -> SessionConfig {
        SessionConfig::from_minutes(25, 5, 15, 4).with_auto_start(auto_start)
    }

    fn harness(auto_start: bool, overlay: Option<LocalOverlayHost>) -> Harness {
        let clock = ManualClock::new(local_noon());
        harness_with(standard(auto_start), overlay, clock, MemoryKv::new(), Arc::new(LogNotifier))
    }

    fn harness_with(
        config: SessionConfig,
        overlay: Option<LocalOverlayHost>,
        clock: ManualClock,
        kv: MemoryKv,
        notifier: Arc<dyn Notifier>,
    ) -> Harness {
        let sink = Arc::new(Sink::default());
        let mut deps = EngineDeps::new(config, PersistenceStore::new(kv.clone()))
            .with_clock(Arc::new(clock.clone()))
            .with_sink(sink.clone())
            .with_notifier(notifier);
        if let Some(host) = overlay {
            deps = deps.with_overlay(Arc::new(host));
        }
        Harness {
            engine: TimerEngine::spawn(deps),
            clock,
            sink,
            kv,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn focus_completion_fires_once() {
        let h = harness(false, None);
        assert!(matches!(h.engine.start().await.unwrap(), Some(Event::TimerStarted { .. })));
        assert!(h.engine.start().await.unwrap().is_none());

        h.clock.advance_secs(1500);
        settle().await;
        settle().await;

        let records = h.sink.0.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_type, SessionType::Focus);
        assert_eq!(records[0].duration_seconds, 1500);

        let s = h.engine.get_snapshot();
        assert_eq!(s.current_session, 1);
        assert_eq!(s.current_session_type, SessionType::ShortBreak);
        assert_eq!(s.time_remaining, 300);
        assert!(!s.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_start_waits_for_cue_delay() {
        let h = harness(true, None);
        let mut events = h.engine.events();
        h.engine.start().await.unwrap();
        h.clock.advance_secs(1500);
        settle().await;

        let s = h.engine.get_snapshot();
        assert_eq!(s.current_session_type, SessionType::ShortBreak);
        assert!(s.is_running());
        assert_eq!(s.time_remaining, 300);

        tokio::time::sleep(Duration::from_secs(1)).await;
        h.clock.advance_secs(10);
        settle().await;
        assert_eq!(h.engine.get_snapshot().time_remaining, 290);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event);
        }
        assert!(matches!(kinds.first(), Some(Event::TimerStarted { .. })));
        assert!(kinds.iter().any(|e| matches!(e, Event::SessionCompleted { .. })));
        assert!(matches!(
            kinds.last(),
            Some(Event::TimerStarted {
                session_type: SessionType::ShortBreak,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_cancels_pending_auto_start() {
        let h = harness(true, None);
        h.engine.start().await.unwrap();
        h.clock.advance_secs(1500);
        settle().await;
        assert!(h.engine.pause().await.unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(3)).await;
        h.clock.advance_secs(30);
        settle().await;
        let s = h.engine.get_snapshot();
        assert_eq!(s.phase, RunPhase::Paused);
        assert_eq!(s.time_remaining, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_engine_stays_frozen() {
        let h = harness(false, None);
        h.engine.start().await.unwrap();
        h.clock.advance_secs(100);
        h.engine.pause().await.unwrap();
        h.clock.advance_secs(5000);
        settle().await;
        assert_eq!(h.engine.get_snapshot().time_remaining, 1400);
        assert!(h.sink.0.lock().unwrap().is_empty());

        assert!(matches!(
            h.engine.resume().await.unwrap(),
            Some(Event::TimerResumed { remaining_secs: 1400, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn every_operation_persists() {
        let h = harness(false, None);
        h.engine.start().await.unwrap();
        let raw = h.kv.kv_get(SNAPSHOT_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["isRunning"], true);
        assert_eq!(json["isPaused"], false);

        h.engine.skip().await.unwrap();
        let raw = h.kv.kv_get(SNAPSHOT_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["currentSessionType"], "shortBreak");
        assert_eq!(json["isRunning"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn becoming_visible_reconciles_immediately() {
        let h = harness(false, None);
        h.engine.start().await.unwrap();
        h.engine.set_primary_visible(false).await.unwrap();
        h.clock.advance_secs(100);
        h.engine.set_primary_visible(true).await.unwrap();
        assert_eq!(h.engine.get_snapshot().time_remaining, 1400);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_running_snapshot() {
        let clock = ManualClock::new(local_noon());
        let kv = MemoryKv::new();
        let config = SessionConfig::default();
        let mut state = TimerState::initial(&config, clock.now());
        state.phase = RunPhase::Running;
        state.time_remaining = 600;
        PersistenceStore::new(kv.clone()).write(&state);

        clock.advance_secs(120);
        let h = harness_with(standard(false), None, clock, kv, Arc::new(LogNotifier));
        let s = h.engine.get_snapshot();
        assert_eq!(s.phase, RunPhase::Running);
        assert_eq!(s.time_remaining, 480);

        h.clock.advance_secs(30);
        settle().await;
        assert_eq!(h.engine.get_snapshot().time_remaining, 450);
    }

    #[tokio::test(start_paused = true)]
    async fn config_update_reseeds_idle_timer() {
        let h = harness(false, None);
        h.engine
            .update_config(SessionConfig::from_minutes(50, 10, 30, 4))
            .await
            .unwrap();
        assert_eq!(h.engine.get_snapshot().time_remaining, 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_idle_session_is_reseeded_on_boot() {
        let clock = ManualClock::new(local_noon());
        let kv = MemoryKv::new();
        let first = harness_with(standard(false), None, clock.clone(), kv.clone(), Arc::new(LogNotifier));
        assert_eq!(first.engine.get_snapshot().time_remaining, 1500);
        first.engine.shutdown().await.unwrap();

        let longer = SessionConfig::from_minutes(50, 5, 15, 4);
        let h = harness_with(longer, None, clock, kv.clone(), Arc::new(LogNotifier));
        assert_eq!(h.engine.get_snapshot().time_remaining, 3000);
        let raw = kv.kv_get(SNAPSHOT_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["timeRemaining"], 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn start_cue_only_plays_from_idle() {
        let notifier = Arc::new(RecordingNotifier::default());
        let config = SessionConfig {
            desktop_notifications: true,
            ..standard(true)
        };
        let clock = ManualClock::new(local_noon());
        let h = harness_with(config, None, clock, MemoryKv::new(), notifier.clone());

        h.engine.start().await.unwrap();
        h.clock.advance_secs(100);
        h.engine.pause().await.unwrap();
        h.engine.resume().await.unwrap();
        h.clock.advance_secs(1400);
        settle().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;

        let s = h.engine.get_snapshot();
        assert_eq!(s.current_session_type, SessionType::ShortBreak);
        assert_eq!(s.phase, RunPhase::Running);
        assert_eq!(
            *notifier.cues.lock().unwrap(),
            vec![Cue::Start, Cue::Pause, Cue::Complete]
        );
        assert_eq!(
            *notifier.notices.lock().unwrap(),
            vec![CompletionNotice::for_finished(SessionType::Focus)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_notifier_does_not_block_recording() {
        let config = SessionConfig {
            desktop_notifications: true,
            ..standard(false)
        };
        let clock = ManualClock::new(local_noon());
        let h = harness_with(config, None, clock, MemoryKv::new(), Arc::new(FailingNotifier));

        assert!(h.engine.start().await.unwrap().is_some());
        h.clock.advance_secs(1500);
        settle().await;
        settle().await;

        let records = h.sink.0.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_type, SessionType::Focus);
        assert_eq!(h.engine.get_snapshot().current_session_type, SessionType::ShortBreak);
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_close_clears_minimized_and_stops_pushes() {
        let host = LocalOverlayHost::new();
        let h = harness(false, Some(host.clone()));
        h.engine.start().await.unwrap();
        assert!(h.engine.minimize().await.unwrap());
        assert!(h.engine.is_minimized().await.unwrap());
        settle().await;

        let surface = host.surface().unwrap();
        assert!(surface.applied() > 0);
        assert!(surface.current_frame().starts_with("Focus Time | 25:00"));

        surface.close_by_user();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.engine.is_minimized().await.unwrap());

        let applied = surface.applied();
        settle().await;
        assert_eq!(surface.applied(), applied);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_closes_surface() {
        let host = LocalOverlayHost::new();
        let h = harness(false, Some(host.clone()));
        assert!(h.engine.minimize().await.unwrap());
        h.engine.restore().await.unwrap();
        assert!(!h.engine.is_minimized().await.unwrap());
        assert!(host.surface().unwrap().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_overlay_stays_primary() {
        let h = harness(false, Some(LocalOverlayHost::blocked()));
        assert!(!h.engine.minimize().await.unwrap());
        assert!(!h.engine.is_minimized().await.unwrap());
        assert!(h.engine.start().await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_further_commands() {
        let h = harness(false, None);
        h.engine.start().await.unwrap();
        h.engine.shutdown().await.unwrap();
        assert!(matches!(h.engine.start().await, Err(CoreError::EngineStopped)));
    }
}
