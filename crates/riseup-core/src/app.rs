//! Application service wiring the store, the foreground runner, the
//! smart-alarm coordinator and the motion gate together.
//!
//! Front ends call the entry points below; every alarm edit re-invokes
//! both scheduling paths.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::alarm::Alarm;
use crate::events::{Event, EventBus};
use crate::haptics::HapticPlayer;
use crate::motion::{MotionConfirmation, MotionMonitor, MotionState};
use crate::platform::simulated::{RecordingHaptics, SimulatedPedometer, SimulatedSessionService};
use crate::platform::{
    Clock, HapticEngine, RuntimeSessionService, SessionEvent, StepCounter, SystemClock,
};
use crate::runner::{AlarmRunner, RingConfig, RunnerState};
use crate::session::{SessionConfig, SessionCoordinator, SessionState};
use crate::storage::Config;
use crate::store::AlarmStore;

/// Device collaborators handed to [`AlarmApp`].
#[derive(Clone)]
pub struct Platform {
    pub clock: Arc<dyn Clock>,
    pub haptics: Arc<dyn HapticEngine>,
    pub steps: Arc<dyn StepCounter>,
    pub sessions: Arc<dyn RuntimeSessionService>,
}

impl Platform {
    /// Everything in-process on the system clock.
    pub fn simulated(steps_per_second: u32, session_max_runtime: Duration) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let haptics: Arc<dyn HapticEngine> = Arc::new(RecordingHaptics::default());
        let sessions = SimulatedSessionService::new(Arc::clone(&clock), Arc::clone(&haptics))
            .with_max_runtime(session_max_runtime);
        Self {
            clock,
            haptics,
            steps: Arc::new(SimulatedPedometer::walking(steps_per_second)),
            sessions: Arc::new(sessions),
        }
    }
}

/// Snapshot of everything a front end shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppStatus {
    pub alarm: Alarm,
    pub formatted_time: String,
    pub runner: RunnerState,
    pub session: SessionState,
    pub motion: MotionState,
}

pub struct AlarmApp {
    store: AlarmStore,
    runner: AlarmRunner,
    coordinator: SessionCoordinator,
    session_events: mpsc::UnboundedReceiver<SessionEvent>,
    motion: Arc<MotionMonitor>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl AlarmApp {
    pub fn new(
        store: AlarmStore,
        platform: &Platform,
        ring: RingConfig,
        session: SessionConfig,
        events: EventBus,
    ) -> Self {
        let motion = Arc::new(MotionMonitor::new(Arc::clone(&platform.steps), events.clone()));
        let runner = AlarmRunner::new(
            Arc::clone(&platform.clock),
            HapticPlayer::new(Arc::clone(&platform.haptics)),
            motion.clone(),
            ring,
            events.clone(),
        );
        let (coordinator, session_events) = SessionCoordinator::new(
            Arc::clone(&platform.sessions),
            Arc::clone(&platform.clock),
            session,
            events.clone(),
        );
        Self {
            store,
            runner,
            coordinator,
            session_events,
            motion,
            clock: Arc::clone(&platform.clock),
            events,
        }
    }

    pub fn from_config(store: AlarmStore, platform: &Platform, config: &Config, events: EventBus) -> Self {
        Self::new(store, platform, config.ring_config(), config.session_config(), events)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &AlarmStore {
        &self.store
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    /// Schedule both paths for the stored alarm, as on app start.
    pub fn launch(&mut self) -> AppStatus {
        info!(alarm = %self.store.alarm().formatted_time(), "Launching");
        self.reschedule();
        self.status()
    }

    fn reschedule(&mut self) {
        let alarm = self.store.alarm();
        self.runner.schedule_if_needed(&alarm);
        self.coordinator.schedule_smart_alarm(&alarm);
    }

    fn changed(&mut self, alarm: &Alarm) {
        self.events.publish(Event::AlarmUpdated {
            alarm_id: alarm.id,
            time: alarm.formatted_time(),
            is_enabled: alarm.is_enabled,
            at: Utc::now(),
        });
        self.reschedule();
    }

    pub fn set_enabled(&mut self, is_enabled: bool) -> Alarm {
        let alarm = self.store.set_enabled(is_enabled);
        self.changed(&alarm);
        alarm
    }

    pub fn update_alarm(&mut self, time: DateTime<Utc>, is_enabled: bool) -> Alarm {
        let alarm = self.store.update_alarm(time, is_enabled);
        self.changed(&alarm);
        alarm
    }

    /// Edit screen save: a local time of day placed on today's date.
    pub fn set_time_of_day(&mut self, time_of_day: NaiveTime, is_enabled: bool) -> Alarm {
        let now = self.clock.now();
        let alarm = self.store.update_time_of_day(time_of_day, &now, is_enabled);
        self.changed(&alarm);
        alarm
    }

    /// "I'm up": stop the ringing alarm. Only allowed once the step goal
    /// has been reached; returns whether the alarm was stopped.
    pub fn dismiss(&mut self) -> bool {
        let state = self.runner.state();
        if !(state.step_goal_reached || self.motion.goal_reached()) {
            debug!(steps = self.motion.steps_since_start(), "Dismiss refused, step goal not reached");
            return false;
        }
        info!("Wearer is up, stopping alarm");
        self.runner.cancel();
        true
    }

    pub fn stop_smart_alarm(&mut self) -> bool {
        self.coordinator.stop_ringing()
    }

    pub fn status(&self) -> AppStatus {
        let alarm = self.store.alarm();
        AppStatus {
            formatted_time: alarm.formatted_time(),
            alarm,
            runner: self.runner.state(),
            session: self.coordinator.state(),
            motion: self.motion.state(),
        }
    }

    /// Apply session lifecycle events already delivered. Returns how many
    /// were handled.
    pub fn pump_session_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.session_events.try_recv() {
            self.coordinator.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Drive session lifecycle events into the coordinator until
    /// `shutdown` resolves. This is the single actor that owns all state.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = self.session_events.recv() => match event {
                    Some(event) => self.coordinator.handle_event(event),
                    None => break,
                },
            }
        }
        debug!("Event loop stopped");
    }

    /// Cancel both paths.
    pub fn shutdown(&mut self) {
        self.runner.cancel();
        self.coordinator.cancel_smart_alarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulated::ManualClock;
    use crate::runner::RunnerPhase;
    use crate::session::SessionPhase;
    use chrono::TimeZone;

    struct Rig {
        app: AlarmApp,
        pedometer: Arc<SimulatedPedometer>,
    }

    fn local(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 11, 18, h, m, 0).unwrap()
    }

    fn rig() -> Rig {
        let clock = Arc::new(ManualClock::new(local(7, 0)));
        let haptics = Arc::new(RecordingHaptics::default());
        let pedometer = Arc::new(SimulatedPedometer::new());
        let platform = Platform {
            clock: clock.clone(),
            haptics: haptics.clone(),
            steps: pedometer.clone(),
            sessions: Arc::new(SimulatedSessionService::new(clock, haptics)),
        };
        let store = AlarmStore::in_memory(Alarm::new(local(7, 1).with_timezone(&Utc), false));
        let app = AlarmApp::new(
            store,
            &platform,
            RingConfig::default(),
            SessionConfig::default(),
            EventBus::default(),
        );
        Rig { app, pedometer }
    }

    #[tokio::test(start_paused = true)]
    async fn launch_with_disabled_alarm_schedules_nothing() {
        let mut rig = rig();
        let status = rig.app.launch();
        assert_eq!(status.runner.phase, RunnerPhase::Idle);
        assert_eq!(status.session.phase, SessionPhase::Idle);
        assert_eq!(status.formatted_time, "7:01 AM");
    }

    #[tokio::test(start_paused = true)]
    async fn enabling_schedules_both_paths() {
        let mut rig = rig();
        rig.app.launch();
        rig.app.set_enabled(true);
        let status = rig.app.status();
        assert_eq!(status.runner.phase, RunnerPhase::Scheduled);
        assert_eq!(status.session.phase, SessionPhase::Scheduled);
        assert_eq!(status.runner.fire_at, status.session.fire_at);

        rig.app.set_enabled(false);
        let status = rig.app.status();
        assert_eq!(status.runner.phase, RunnerPhase::Idle);
        assert_eq!(status.session.phase, SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_moves_both_paths() {
        let mut rig = rig();
        rig.app.set_time_of_day(NaiveTime::from_hms_opt(6, 30, 0).unwrap(), true);
        let status = rig.app.status();
        // 06:30 has passed at 07:00, so tomorrow.
        let tomorrow = Local.with_ymd_and_hms(2025, 11, 19, 6, 30, 0).unwrap();
        assert_eq!(status.runner.fire_at, Some(tomorrow.with_timezone(&Utc)));
        assert_eq!(status.session.fire_at, Some(tomorrow.with_timezone(&Utc)));
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_requires_step_goal() {
        let mut rig = rig();
        rig.app.set_enabled(true);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(rig.app.status().runner.is_ringing);
        assert!(!rig.app.dismiss());
        assert!(rig.app.status().runner.is_ringing);

        rig.pedometer.deliver_total(100);
        rig.pedometer.deliver_total(125);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(rig.app.dismiss());
        assert!(!rig.app.status().runner.is_ringing);
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_pumps_session_lifecycle() {
        let mut rig = rig();
        rig.app.set_enabled(true);
        rig.app
            .run_until(tokio::time::sleep(Duration::from_secs(62)))
            .await;
        let status = rig.app.status();
        assert_eq!(status.session.phase, SessionPhase::Running);

        assert!(rig.app.stop_smart_alarm());
        rig.app.pump_session_events();
        assert_eq!(rig.app.status().session.phase, SessionPhase::Idle);
    }
}
