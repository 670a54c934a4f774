//! In-process stand-ins for the device collaborators.
//!
//! These back the CLI `run` command and the test suites. They behave like
//! the real services where the core depends on it: the pedometer streams
//! cumulative totals, the session service only starts a session at the
//! requested instant, expires it after a maximum runtime, and invalidates
//! on request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{
    Clock, ExtendedRuntimeSession, HapticEngine, HapticKind, InvalidationReason,
    RuntimeSessionService, SessionEvent, SessionEventKind, SessionEventSender, SessionId,
    StepCounter, StepUpdate,
};
use crate::error::PlatformError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A clock pinned to one instant.
#[derive(Debug)]
pub struct ManualClock {
    now: DateTime<Local>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self { now }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now
    }
}

// ── Haptics ─────────────────────────────────────────────────────────────

/// Haptic engine that records every tap it is asked to play.
#[derive(Debug, Default)]
pub struct RecordingHaptics {
    played: Mutex<Vec<HapticKind>>,
}

impl RecordingHaptics {
    pub fn played(&self) -> Vec<HapticKind> {
        lock(&self.played).clone()
    }

    pub fn count(&self, kind: HapticKind) -> usize {
        lock(&self.played).iter().filter(|k| **k == kind).count()
    }

    pub fn total(&self) -> usize {
        lock(&self.played).len()
    }
}

impl HapticEngine for RecordingHaptics {
    fn play(&self, kind: HapticKind) {
        debug!(?kind, "haptic tap");
        lock(&self.played).push(kind);
    }
}

// ── Pedometer ───────────────────────────────────────────────────────────

#[derive(Default)]
struct PedometerInner {
    updates: Option<mpsc::UnboundedSender<StepUpdate>>,
    total: u64,
    walker: Option<JoinHandle<()>>,
}

/// Step counter fed by hand, or by an automatic walker when
/// `steps_per_second` is non-zero.
pub struct SimulatedPedometer {
    available: bool,
    steps_per_second: u32,
    inner: Mutex<PedometerInner>,
}

impl Default for SimulatedPedometer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPedometer {
    pub fn new() -> Self {
        Self {
            available: true,
            steps_per_second: 0,
            inner: Mutex::new(PedometerInner::default()),
        }
    }

    /// A device without step counting hardware.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Deliver a new total every second, `steps_per_second` higher each time.
    pub fn walking(steps_per_second: u32) -> Self {
        Self {
            steps_per_second,
            ..Self::new()
        }
    }

    /// Start totals at `total`, like a pedometer that has counted all day.
    pub fn with_total(self, total: u64) -> Self {
        lock(&self.inner).total = total;
        self
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.inner).updates.is_some()
    }

    /// Deliver an explicit cumulative total. Returns false when not streaming.
    pub fn deliver_total(&self, total: u64) -> bool {
        let mut inner = lock(&self.inner);
        inner.total = total;
        match &inner.updates {
            Some(tx) => tx.send(Ok(total)).is_ok(),
            None => false,
        }
    }

    /// Add `steps` to the running total and deliver it.
    pub fn take_steps(&self, steps: u64) -> bool {
        let total = lock(&self.inner).total + steps;
        self.deliver_total(total)
    }

    pub fn deliver_error(&self, message: &str) -> bool {
        match &lock(&self.inner).updates {
            Some(tx) => tx.send(Err(PlatformError::Sensor(message.to_string()))).is_ok(),
            None => false,
        }
    }
}

impl StepCounter for SimulatedPedometer {
    fn is_step_counting_available(&self) -> bool {
        self.available
    }

    fn start_updates(&self, updates: mpsc::UnboundedSender<StepUpdate>) {
        let mut inner = lock(&self.inner);
        if let Some(walker) = inner.walker.take() {
            walker.abort();
        }
        if self.steps_per_second > 0 {
            let tx = updates.clone();
            let step = u64::from(self.steps_per_second);
            let mut total = inner.total;
            inner.walker = Some(tokio::spawn(async move {
                loop {
                    if tx.send(Ok(total)).is_err() {
                        break;
                    }
                    sleep(Duration::from_secs(1)).await;
                    total += step;
                }
            }));
        }
        inner.updates = Some(updates);
    }

    fn stop_updates(&self) {
        let mut inner = lock(&self.inner);
        if let Some(walker) = inner.walker.take() {
            walker.abort();
        }
        inner.updates = None;
    }
}

// ── Extended runtime sessions ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedPhase {
    Created,
    Scheduled,
    Running,
    Invalidated,
}

/// Observable snapshot of one simulated session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedSessionInfo {
    pub id: SessionId,
    pub requested_start: Option<DateTime<Utc>>,
    pub phase: SimulatedPhase,
    pub notify: Option<(HapticKind, Duration)>,
}

struct SessionSlot {
    info: SimulatedSessionInfo,
    lifecycle: Option<JoinHandle<()>>,
    notifier: Option<JoinHandle<()>>,
}

struct SessionShared {
    id: SessionId,
    events: SessionEventSender,
    slot: Mutex<SessionSlot>,
}

impl SessionShared {
    fn send(&self, kind: SessionEventKind) {
        let _ = self.events.send(SessionEvent {
            session: self.id,
            kind,
        });
    }

    fn snapshot(&self) -> SimulatedSessionInfo {
        lock(&self.slot).info.clone()
    }
}

/// Session service that runs sessions on tokio timers.
pub struct SimulatedSessionService {
    clock: Arc<dyn Clock>,
    haptics: Arc<dyn HapticEngine>,
    max_runtime: Duration,
    next_id: AtomicU64,
    sessions: Mutex<Vec<Arc<SessionShared>>>,
}

impl SimulatedSessionService {
    /// How long before expiry `WillExpire` is delivered.
    pub const EXPIRY_WARNING: Duration = Duration::from_secs(30);

    pub fn new(clock: Arc<dyn Clock>, haptics: Arc<dyn HapticEngine>) -> Self {
        Self {
            clock,
            haptics,
            max_runtime: Duration::from_secs(30 * 60),
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_runtime(mut self, max_runtime: Duration) -> Self {
        self.max_runtime = max_runtime;
        self
    }

    pub fn sessions(&self) -> Vec<SimulatedSessionInfo> {
        lock(&self.sessions).iter().map(|s| s.snapshot()).collect()
    }

    pub fn session(&self, id: SessionId) -> Option<SimulatedSessionInfo> {
        lock(&self.sessions)
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.snapshot())
    }

    /// Sessions not yet invalidated.
    pub fn live_sessions(&self) -> Vec<SimulatedSessionInfo> {
        self.sessions()
            .into_iter()
            .filter(|s| s.phase != SimulatedPhase::Invalidated)
            .collect()
    }
}

impl RuntimeSessionService for SimulatedSessionService {
    fn create_session(&self, events: SessionEventSender) -> Box<dyn ExtendedRuntimeSession> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(SessionShared {
            id,
            events,
            slot: Mutex::new(SessionSlot {
                info: SimulatedSessionInfo {
                    id,
                    requested_start: None,
                    phase: SimulatedPhase::Created,
                    notify: None,
                },
                lifecycle: None,
                notifier: None,
            }),
        });
        lock(&self.sessions).push(Arc::clone(&shared));
        Box::new(SimulatedSession {
            shared,
            clock: Arc::clone(&self.clock),
            haptics: Arc::clone(&self.haptics),
            max_runtime: self.max_runtime,
        })
    }
}

struct SimulatedSession {
    shared: Arc<SessionShared>,
    clock: Arc<dyn Clock>,
    haptics: Arc<dyn HapticEngine>,
    max_runtime: Duration,
}

impl ExtendedRuntimeSession for SimulatedSession {
    fn id(&self) -> SessionId {
        self.shared.id
    }

    fn start_at(&self, at: DateTime<Utc>) {
        let mut slot = lock(&self.shared.slot);
        if slot.info.phase != SimulatedPhase::Created {
            warn!(session = self.shared.id, "start_at on a session that was already started");
            return;
        }
        slot.info.phase = SimulatedPhase::Scheduled;
        slot.info.requested_start = Some(at);

        let delay = (at - self.clock.now().with_timezone(&Utc))
            .to_std()
            .unwrap_or(Duration::ZERO);
        let warning = Self::warning_lead(self.max_runtime);
        let until_warning = self.max_runtime - warning;
        let shared = Arc::clone(&self.shared);

        slot.lifecycle = Some(tokio::spawn(async move {
            sleep(delay).await;
            if !shared.transition(SimulatedPhase::Scheduled, SimulatedPhase::Running) {
                return;
            }
            info!(session = shared.id, "simulated session started");
            shared.send(SessionEventKind::Started);

            sleep(until_warning).await;
            shared.send(SessionEventKind::WillExpire);

            sleep(warning).await;
            if shared.transition(SimulatedPhase::Running, SimulatedPhase::Invalidated) {
                shared.stop_notifier();
                shared.send(SessionEventKind::Invalidated {
                    reason: InvalidationReason::Expired,
                    error: None,
                });
            }
        }));
    }

    fn notify_user(&self, haptic: HapticKind, repeat_every: Duration) {
        let mut slot = lock(&self.shared.slot);
        if slot.info.phase != SimulatedPhase::Running {
            warn!(session = self.shared.id, "notify_user outside a running session ignored");
            return;
        }
        if let Some(previous) = slot.notifier.take() {
            previous.abort();
        }
        slot.info.notify = Some((haptic, repeat_every));
        let haptics = Arc::clone(&self.haptics);
        slot.notifier = Some(tokio::spawn(async move {
            loop {
                haptics.play(haptic);
                sleep(repeat_every).await;
            }
        }));
    }

    fn invalidate(&self) {
        {
            let mut slot = lock(&self.shared.slot);
            if slot.info.phase == SimulatedPhase::Invalidated {
                return;
            }
            slot.info.phase = SimulatedPhase::Invalidated;
            if let Some(task) = slot.lifecycle.take() {
                task.abort();
            }
            if let Some(task) = slot.notifier.take() {
                task.abort();
            }
        }
        self.shared.send(SessionEventKind::Invalidated {
            reason: InvalidationReason::None,
            error: None,
        });
    }
}

impl SimulatedSession {
    fn warning_lead(max_runtime: Duration) -> Duration {
        SimulatedSessionService::EXPIRY_WARNING.min(max_runtime / 2)
    }
}

impl SessionShared {
    fn transition(&self, from: SimulatedPhase, to: SimulatedPhase) -> bool {
        let mut slot = lock(&self.slot);
        if slot.info.phase != from {
            return false;
        }
        slot.info.phase = to;
        true
    }

    fn stop_notifier(&self) {
        if let Some(task) = lock(&self.slot).notifier.take() {
            task.abort();
        }
    }
}
