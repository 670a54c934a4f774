//! Background smart-alarm session.
//!
//! Requests an extended-runtime session that starts at the alarm instant,
//! so the wrist is woken even when the app is not in front. The platform
//! refuses windows further out than [`MAX_SESSION_HORIZON_HOURS`].
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Scheduled -> Running -> Idle
//!           |_________invalidated___^
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::alarm::Alarm;
use crate::events::{Event, EventBus, SkipReason};
use crate::occurrence::ScheduledOccurrence;
use crate::platform::{
    Clock, ExtendedRuntimeSession, HapticKind, RuntimeSessionService, SessionEvent,
    SessionEventKind, SessionEventSender, SessionId,
};

/// Furthest ahead the platform will start a session.
pub const MAX_SESSION_HORIZON_HOURS: u32 = 36;

pub fn max_session_horizon() -> chrono::Duration {
    chrono::Duration::hours(MAX_SESSION_HORIZON_HOURS.into())
}

/// `0 < delay <= horizon`, with `horizon` clamped to the platform limit.
pub fn within_horizon(delay: chrono::Duration, horizon: chrono::Duration) -> bool {
    delay > chrono::Duration::zero() && delay <= horizon.min(max_session_horizon())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub enabled: bool,
    pub horizon: chrono::Duration,
    /// Cadence of the user notification while a session runs.
    pub notify_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            horizon: max_session_horizon(),
            notify_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Scheduled,
    Running,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub is_session_scheduled: bool,
    pub is_session_running: bool,
    pub fire_at: Option<DateTime<Utc>>,
    pub session: Option<SessionId>,
}

impl SessionState {
    fn scheduled(session: SessionId, fire_at: DateTime<Utc>) -> Self {
        Self {
            phase: SessionPhase::Scheduled,
            is_session_scheduled: true,
            is_session_running: false,
            fire_at: Some(fire_at),
            session: Some(session),
        }
    }
}

pub struct SessionCoordinator {
    service: Arc<dyn RuntimeSessionService>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    events: EventBus,
    lifecycle: SessionEventSender,
    current: Option<Box<dyn ExtendedRuntimeSession>>,
    state: watch::Sender<SessionState>,
}

impl SessionCoordinator {
    /// Returns the coordinator and the receiver its sessions report on.
    /// Feed every received event back through [`Self::handle_event`].
    pub fn new(
        service: Arc<dyn RuntimeSessionService>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
        events: EventBus,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (lifecycle, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::default());
        let coordinator = Self {
            service,
            clock,
            config,
            events,
            lifecycle,
            current: None,
            state,
        };
        (coordinator, rx)
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current.as_ref().map(|s| s.id())
    }

    fn reject(&self, reason: SkipReason, delay_secs: Option<f64>) {
        self.events.publish(Event::SmartAlarmRejected {
            reason,
            delay_secs,
            at: Utc::now(),
        });
    }

    /// Replace any session with one that starts at the alarm's next
    /// occurrence. Returns the start instant when a session was requested.
    pub fn schedule_smart_alarm(&mut self, alarm: &Alarm) -> Option<DateTime<Local>> {
        self.invalidate_current();

        if !self.config.enabled {
            debug!("Smart alarm sessions are turned off.");
            self.reject(SkipReason::SmartAlarmOff, None);
            return None;
        }
        if !alarm.is_enabled {
            info!("Alarm disabled, no smart alarm session.");
            self.reject(SkipReason::Disabled, None);
            return None;
        }

        let now = self.clock.now();
        let occurrence = ScheduledOccurrence::resolve(&alarm.local_time(&Local), &now);
        let delay_secs = occurrence.delay_secs();
        if !within_horizon(occurrence.delay, self.config.horizon) {
            let reason = if occurrence.delay <= chrono::Duration::zero() {
                SkipReason::NonPositiveDelay
            } else {
                SkipReason::BeyondHorizon
            };
            warn!(delay_secs, ?reason, "Smart alarm delay out of range, not scheduling.");
            self.reject(reason, Some(delay_secs));
            return None;
        }

        let fire_at = occurrence.fire_at.with_timezone(&Utc);
        let session = self.service.create_session(self.lifecycle.clone());
        let id = session.id();
        session.start_at(fire_at);
        self.current = Some(session);
        self.state.send_replace(SessionState::scheduled(id, fire_at));

        info!(session = id, fire_at = %occurrence.fire_at, delay_secs, "Smart alarm session scheduled");
        self.events.publish(Event::SmartAlarmScheduled {
            session: id,
            fire_at,
            delay_secs,
            at: Utc::now(),
        });
        Some(occurrence.fire_at)
    }

    /// Invalidate the active session, if any. Returns whether one existed.
    pub fn cancel_smart_alarm(&mut self) -> bool {
        let cancelled = self.invalidate_current();
        if cancelled {
            info!("Smart alarm session cancelled");
        }
        cancelled
    }

    /// Stop a ringing session. Same effect as cancelling.
    pub fn stop_ringing(&mut self) -> bool {
        let stopped = self.invalidate_current();
        if stopped {
            info!("Smart alarm stopped by user");
        }
        stopped
    }

    fn invalidate_current(&mut self) -> bool {
        let Some(session) = self.current.take() else {
            self.state.send_if_modified(|s| {
                let changed = *s != SessionState::default();
                *s = SessionState::default();
                changed
            });
            return false;
        };
        // The platform confirms with an Invalidated event for this id; it
        // arrives after `current` has moved on and is ignored.
        session.invalidate();
        self.state.send_replace(SessionState::default());
        true
    }

    /// Apply one lifecycle event. Events of sessions other than the
    /// current one are stale and ignored.
    pub fn handle_event(&mut self, event: SessionEvent) {
        let Some(session) = self.current.as_ref().filter(|s| s.id() == event.session) else {
            debug!(session = event.session, kind = ?event.kind, "Ignoring event for a stale session");
            return;
        };
        let id = session.id();

        match event.kind {
            SessionEventKind::Started => {
                // Must be registered before this handler returns.
                session.notify_user(HapticKind::Notification, self.config.notify_interval);
                self.state.send_modify(|s| {
                    s.phase = SessionPhase::Running;
                    s.is_session_scheduled = false;
                    s.is_session_running = true;
                });
                info!(session = id, "Smart alarm session started");
                self.events.publish(Event::SmartAlarmStarted {
                    session: id,
                    at: Utc::now(),
                });
            }
            SessionEventKind::WillExpire => {
                info!(session = id, "Smart alarm session will expire");
                self.events.publish(Event::SmartAlarmWillExpire {
                    session: id,
                    at: Utc::now(),
                });
            }
            SessionEventKind::Invalidated { reason, error } => {
                match &error {
                    Some(error) => warn!(session = id, ?reason, %error, "Smart alarm session invalidated"),
                    None => info!(session = id, ?reason, "Smart alarm session invalidated"),
                }
                self.current = None;
                self.state.send_replace(SessionState::default());
                self.events.publish(Event::SmartAlarmInvalidated {
                    session: id,
                    reason,
                    error,
                    at: Utc::now(),
                });
            }
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(session) = self.current.take() {
            session.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulated::{
        ManualClock, RecordingHaptics, SimulatedPhase, SimulatedSessionService,
    };
    use crate::platform::InvalidationReason;
    use chrono::TimeZone;

    struct Rig {
        coordinator: SessionCoordinator,
        rx: mpsc::UnboundedReceiver<SessionEvent>,
        service: Arc<SimulatedSessionService>,
        haptics: Arc<RecordingHaptics>,
    }

    fn local(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 11, 18, h, m, 0).unwrap()
    }

    fn rig_with(config: SessionConfig) -> Rig {
        let clock = Arc::new(ManualClock::new(local(7, 0)));
        let haptics = Arc::new(RecordingHaptics::default());
        let service = Arc::new(
            SimulatedSessionService::new(clock.clone(), haptics.clone())
                .with_max_runtime(Duration::from_secs(600)),
        );
        let (coordinator, rx) =
            SessionCoordinator::new(service.clone(), clock, config, EventBus::default());
        Rig {
            coordinator,
            rx,
            service,
            haptics,
        }
    }

    fn rig() -> Rig {
        rig_with(SessionConfig::default())
    }

    fn alarm(h: u32, m: u32, enabled: bool) -> Alarm {
        Alarm::new(local(h, m).with_timezone(&Utc), enabled)
    }

    fn pump(rig: &mut Rig) {
        while let Ok(event) = rig.rx.try_recv() {
            rig.coordinator.handle_event(event);
        }
    }

    #[test]
    fn horizon_window() {
        let horizon = max_session_horizon();
        assert!(!within_horizon(chrono::Duration::zero(), horizon));
        assert!(!within_horizon(chrono::Duration::seconds(-5), horizon));
        assert!(within_horizon(chrono::Duration::seconds(1), horizon));
        assert!(within_horizon(chrono::Duration::hours(36), horizon));
        assert!(!within_horizon(chrono::Duration::hours(37), horizon));
        // Config cannot raise the platform limit.
        assert!(!within_horizon(chrono::Duration::hours(37), chrono::Duration::hours(48)));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_alarm_creates_no_session() {
        let mut rig = rig();
        assert_eq!(rig.coordinator.schedule_smart_alarm(&alarm(7, 30, false)), None);
        assert_eq!(rig.coordinator.state(), SessionState::default());
        assert!(rig.service.sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_beyond_horizon_is_rejected() {
        let mut rig = rig_with(SessionConfig {
            horizon: chrono::Duration::hours(1),
            ..SessionConfig::default()
        });
        assert_eq!(rig.coordinator.schedule_smart_alarm(&alarm(12, 0, true)), None);
        assert_eq!(rig.coordinator.state().phase, SessionPhase::Idle);
        assert!(rig.service.sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn schedules_session_at_occurrence() {
        let mut rig = rig();
        let fire = rig.coordinator.schedule_smart_alarm(&alarm(7, 30, true)).unwrap();
        assert_eq!(fire, local(7, 30));

        let state = rig.coordinator.state();
        assert_eq!(state.phase, SessionPhase::Scheduled);
        assert!(state.is_session_scheduled);
        assert!(!state.is_session_running);

        let sessions = rig.service.live_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].requested_start, Some(local(7, 30).with_timezone(&Utc)));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_keeps_one_live_session() {
        let mut rig = rig();
        rig.coordinator.schedule_smart_alarm(&alarm(7, 30, true));
        rig.coordinator.schedule_smart_alarm(&alarm(8, 0, true));
        pump(&mut rig);

        assert_eq!(rig.service.sessions().len(), 2);
        let live = rig.service.live_sessions();
        assert_eq!(live.len(), 1);
        assert_eq!(Some(live[0].id), rig.coordinator.current_session());
        // The first session's invalidation must not reset the second.
        assert_eq!(rig.coordinator.state().phase, SessionPhase::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn started_session_runs_and_notifies() {
        let mut rig = rig();
        rig.coordinator.schedule_smart_alarm(&alarm(7, 30, true));
        tokio::time::sleep(Duration::from_secs(30 * 60 + 1)).await;
        pump(&mut rig);

        let state = rig.coordinator.state();
        assert_eq!(state.phase, SessionPhase::Running);
        assert!(state.is_session_running);
        assert!(!state.is_session_scheduled);

        let id = rig.coordinator.current_session().unwrap();
        let info = rig.service.session(id).unwrap();
        assert_eq!(info.phase, SimulatedPhase::Running);
        assert_eq!(info.notify, Some((HapticKind::Notification, Duration::from_secs(2))));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rig.haptics.count(HapticKind::Notification) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_returns_to_idle() {
        let mut rig = rig();
        rig.coordinator.schedule_smart_alarm(&alarm(7, 30, true));
        tokio::time::sleep(Duration::from_secs(30 * 60 + 1)).await;
        pump(&mut rig);
        tokio::time::sleep(Duration::from_secs(600)).await;
        pump(&mut rig);

        assert_eq!(rig.coordinator.state(), SessionState::default());
        assert_eq!(rig.coordinator.current_session(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_warning_keeps_session_running() {
        let mut rig = rig();
        rig.coordinator.schedule_smart_alarm(&alarm(7, 30, true));
        tokio::time::sleep(Duration::from_secs(30 * 60 + 1)).await;
        pump(&mut rig);
        let id = rig.coordinator.current_session().unwrap();
        let mut events = rig.coordinator.events.subscribe();

        // Past the warning, before the 600 s runtime runs out.
        tokio::time::sleep(Duration::from_secs(575)).await;
        pump(&mut rig);

        let state = rig.coordinator.state();
        assert_eq!(state.phase, SessionPhase::Running);
        assert!(state.is_session_running);
        assert_eq!(rig.coordinator.current_session(), Some(id));
        assert!(matches!(
            events.try_recv().unwrap(),
            Event::SmartAlarmWillExpire { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn error_invalidation_resets_state() {
        let mut rig = rig();
        rig.coordinator.schedule_smart_alarm(&alarm(7, 30, true));
        let id = rig.coordinator.current_session().unwrap();
        let mut events = rig.coordinator.events.subscribe();

        rig.coordinator.handle_event(SessionEvent {
            session: id,
            kind: SessionEventKind::Invalidated {
                reason: InvalidationReason::Error,
                error: Some("system refused".into()),
            },
        });
        assert_eq!(rig.coordinator.state().phase, SessionPhase::Idle);
        assert!(matches!(
            events.try_recv().unwrap(),
            Event::SmartAlarmInvalidated {
                reason: InvalidationReason::Error,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_events_are_ignored() {
        let mut rig = rig();
        rig.coordinator.schedule_smart_alarm(&alarm(7, 30, true));
        let id = rig.coordinator.current_session().unwrap();

        rig.coordinator.handle_event(SessionEvent {
            session: id + 100,
            kind: SessionEventKind::Started,
        });
        assert_eq!(rig.coordinator.state().phase, SessionPhase::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ringing_invalidates_running_session() {
        let mut rig = rig();
        rig.coordinator.schedule_smart_alarm(&alarm(7, 30, true));
        tokio::time::sleep(Duration::from_secs(30 * 60 + 1)).await;
        pump(&mut rig);
        assert!(rig.coordinator.state().is_session_running);

        assert!(rig.coordinator.stop_ringing());
        assert_eq!(rig.coordinator.state(), SessionState::default());
        assert!(rig.service.live_sessions().is_empty());

        let taps = rig.haptics.count(HapticKind::Notification);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(rig.haptics.count(HapticKind::Notification), taps);
        assert!(!rig.coordinator.stop_ringing());
    }
}
