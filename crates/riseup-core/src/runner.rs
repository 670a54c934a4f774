//! Foreground alarm timer.
//!
//! The runner owns at most one delayed task. When the alarm time arrives
//! it rings: it starts motion confirmation and plays haptic bursts at a
//! fixed interval until the step goal is reached, the burst cap is hit,
//! or the alarm is cancelled.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Scheduled -> Ringing -> Idle
//!   ^________cancel()_______|
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alarm::Alarm;
use crate::cancel::{cancel_pair, CancelHandle, CancelToken};
use crate::events::{Event, EventBus, SkipReason};
use crate::haptics::{HapticPattern, HapticPlayer};
use crate::motion::MotionConfirmation;
use crate::occurrence::{next_occurrence_at, ScheduledOccurrence};
use crate::platform::Clock;

/// Ringing parameters. Defaults cap a ring at 60 bursts 1.5 s apart (about
/// 90 seconds) and ask for 20 steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingConfig {
    pub step_goal: u32,
    pub max_bursts: u32,
    pub burst_interval: Duration,
    pub pattern: HapticPattern,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            step_goal: 20,
            max_bursts: 60,
            burst_interval: Duration::from_millis(1500),
            pattern: HapticPattern::RapidFire,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerPhase {
    #[default]
    Idle,
    Scheduled,
    Ringing,
}

/// Published runner state. Reset on every scheduling request.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RunnerState {
    pub phase: RunnerPhase,
    pub is_ringing: bool,
    pub step_goal_reached: bool,
    pub fire_at: Option<DateTime<Utc>>,
    pub bursts: u32,
    /// Bumped by every schedule and every cancel. A task only writes
    /// state while this still carries its own id.
    pub schedule_id: u64,
}

struct ActiveTimer {
    schedule_id: u64,
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

pub struct AlarmRunner {
    clock: Arc<dyn Clock>,
    haptics: HapticPlayer,
    motion: Arc<dyn MotionConfirmation>,
    config: RingConfig,
    events: EventBus,
    state: Arc<watch::Sender<RunnerState>>,
    active: Option<ActiveTimer>,
    last_id: u64,
}

impl AlarmRunner {
    pub fn new(
        clock: Arc<dyn Clock>,
        haptics: HapticPlayer,
        motion: Arc<dyn MotionConfirmation>,
        config: RingConfig,
        events: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(RunnerState::default());
        Self {
            clock,
            haptics,
            motion,
            config,
            events,
            state: Arc::new(state),
            active: None,
            last_id: 0,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunnerState> {
        self.state.subscribe()
    }

    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    /// Replace any pending or running alarm with one for `alarm`.
    ///
    /// Returns the fire instant when a timer was armed. Disabled alarms and
    /// non-positive delays leave the runner idle.
    pub fn schedule_if_needed(&mut self, alarm: &Alarm) -> Option<DateTime<Local>> {
        self.cancel();

        if !alarm.is_enabled {
            info!("Alarm disabled, not scheduling.");
            self.events.publish(Event::AlarmSkipped {
                reason: SkipReason::Disabled,
                delay_secs: None,
                at: Utc::now(),
            });
            return None;
        }

        let now = self.clock.now();
        let occurrence = ScheduledOccurrence::resolve(&alarm.local_time(&Local), &now);
        let Some(delay) = occurrence.delay_std() else {
            warn!(delay_secs = occurrence.delay_secs(), "Computed non-positive delay, not scheduling.");
            self.events.publish(Event::AlarmSkipped {
                reason: SkipReason::NonPositiveDelay,
                delay_secs: Some(occurrence.delay_secs()),
                at: Utc::now(),
            });
            return None;
        };

        let schedule_id = self.next_id();
        let fire_at = occurrence.fire_at.with_timezone(&Utc);
        self.state.send_replace(RunnerState {
            phase: RunnerPhase::Scheduled,
            fire_at: Some(fire_at),
            schedule_id,
            ..RunnerState::default()
        });
        info!(
            schedule_id,
            fire_at = %occurrence.fire_at,
            delay_secs = occurrence.delay_secs(),
            "Scheduling main alarm"
        );
        self.events.publish(Event::AlarmScheduled {
            schedule_id,
            fire_at,
            delay_secs: occurrence.delay_secs(),
            at: Utc::now(),
        });

        let (cancel, mut token) = cancel_pair();
        let ring = RingTask {
            schedule_id,
            state: Arc::clone(&self.state),
            haptics: self.haptics.clone(),
            motion: Arc::clone(&self.motion),
            config: self.config,
            events: self.events.clone(),
        };
        let task = tokio::spawn(async move {
            if token.sleep(delay).await {
                ring.run(&mut token).await;
            }
        });
        self.active = Some(ActiveTimer {
            schedule_id,
            cancel,
            task,
        });

        Some(occurrence.fire_at)
    }

    /// Cancel the pending or ringing alarm and reset the flags. Safe to
    /// call in any state.
    pub fn cancel(&mut self) {
        let cancelled = self.active.take().and_then(|active| {
            active.cancel.cancel();
            (!active.task.is_finished()).then_some(active.schedule_id)
        });
        self.motion.stop_monitoring();

        let schedule_id = self.next_id();
        self.state.send_replace(RunnerState {
            schedule_id,
            ..RunnerState::default()
        });

        if let Some(schedule_id) = cancelled {
            info!(schedule_id, "Main alarm cancelled");
            self.events.publish(Event::AlarmCancelled {
                schedule_id,
                at: Utc::now(),
            });
        }
    }

    pub fn has_active_timer(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| !a.task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for AlarmRunner {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}

/// The body of one scheduled alarm, from ring to finish.
struct RingTask {
    schedule_id: u64,
    state: Arc<watch::Sender<RunnerState>>,
    haptics: HapticPlayer,
    motion: Arc<dyn MotionConfirmation>,
    config: RingConfig,
    events: EventBus,
}

impl RingTask {
    fn update(&self, apply: impl FnOnce(&mut RunnerState)) -> bool {
        self.state.send_if_modified(|s| {
            if s.schedule_id != self.schedule_id {
                return false;
            }
            apply(s);
            true
        })
    }

    async fn run(&self, token: &mut CancelToken) {
        let started = !token.is_cancelled()
            && self.update(|s| {
                s.phase = RunnerPhase::Ringing;
                s.is_ringing = true;
                s.step_goal_reached = false;
                s.bursts = 0;
            });
        if !started {
            return;
        }

        info!(schedule_id = self.schedule_id, "Main alarm ringing now!");
        self.events.publish(Event::AlarmRinging {
            schedule_id: self.schedule_id,
            at: Utc::now(),
        });
        let run = self.motion.start_monitoring(self.config.step_goal);
        if token.is_cancelled() {
            // cancel() may have stopped motion before this run started.
            self.motion.stop_run(run);
            return;
        }

        let mut bursts = 0;
        for burst in 1..=self.config.max_bursts {
            if token.is_cancelled() {
                break;
            }
            if self.motion.goal_reached() {
                info!("Movement goal reached, stopping alarm.");
                self.update(|s| s.step_goal_reached = true);
                break;
            }

            debug!(burst, "Main alarm haptic burst");
            self.haptics.play(self.config.pattern);
            bursts = burst;
            self.update(|s| s.bursts = burst);
            self.events.publish(Event::HapticBurst {
                schedule_id: self.schedule_id,
                burst,
                max_bursts: self.config.max_bursts,
                at: Utc::now(),
            });

            if !token.sleep(self.config.burst_interval).await {
                break;
            }
        }

        if token.is_cancelled() {
            // cancel() already stopped motion and reset the state.
            return;
        }

        self.motion.stop_run(run);
        let reached = self.motion.goal_reached();
        self.update(|s| {
            s.phase = RunnerPhase::Idle;
            s.is_ringing = false;
            s.step_goal_reached = reached;
            s.fire_at = None;
        });
        info!(bursts, goal_reached = reached, "Main alarm finished ringing.");
        self.events.publish(Event::AlarmFinished {
            schedule_id: self.schedule_id,
            bursts,
            step_goal_reached: reached,
            at: Utc::now(),
        });
    }
}

/// Outcome of [`quick_alarm`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickAlarmReport {
    pub fire_at: DateTime<Local>,
    pub waited_secs: f64,
    pub bursts: u32,
}

/// One-off test alarm: wait until the next `time_of_day`, then play
/// `bursts` rapid-fire patterns `interval` apart. Cancel by dropping the
/// future.
pub async fn quick_alarm(
    clock: &dyn Clock,
    haptics: &HapticPlayer,
    time_of_day: NaiveTime,
    bursts: u32,
    interval: Duration,
) -> Option<QuickAlarmReport> {
    let now = clock.now();
    let fire_at = next_occurrence_at(time_of_day, &now);
    let delay = (fire_at - now).to_std().ok().filter(|d| !d.is_zero())?;

    info!(fire_at = %fire_at, minutes = delay.as_secs() / 60, "Quick alarm armed");
    tokio::time::sleep(delay).await;

    for burst in 1..=bursts {
        debug!(burst, "Quick alarm burst");
        haptics.play(HapticPattern::RapidFire);
        tokio::time::sleep(interval).await;
    }
    info!("Quick alarm fired");

    Some(QuickAlarmReport {
        fire_at,
        waited_secs: delay.as_secs_f64(),
        bursts,
    })
}
