//! Motion confirmation: did the wearer actually get up?
//!
//! The first pedometer total after monitoring starts becomes the
//! baseline. Each later total yields `max(total - baseline, 0)` steps; the
//! goal is reached once that delta meets the configured step goal, and
//! stays reached until monitoring restarts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PlatformError;
use crate::events::{Event, EventBus};
use crate::platform::{StepCounter, StepUpdate};

/// Baseline-relative step tracking for one monitoring run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepBaseline {
    goal: u32,
    baseline: Option<u64>,
    steps: u64,
    goal_reached: bool,
}

impl StepBaseline {
    pub fn new(goal: u32) -> Self {
        Self {
            goal,
            baseline: None,
            steps: 0,
            goal_reached: false,
        }
    }

    /// Feed a cumulative total; returns the steps since the baseline.
    pub fn record(&mut self, total: u64) -> u64 {
        let baseline = *self.baseline.get_or_insert(total);
        self.steps = total.saturating_sub(baseline);
        if self.steps >= u64::from(self.goal) {
            self.goal_reached = true;
        }
        self.steps
    }

    pub fn baseline(&self) -> Option<u64> {
        self.baseline
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn goal_reached(&self) -> bool {
        self.goal_reached
    }
}

/// Published motion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MotionState {
    pub steps_since_start: u64,
    pub goal_reached: bool,
    pub is_monitoring: bool,
    pub step_goal: u32,
    /// Increments on every `start_monitoring`.
    pub run: u64,
}

/// What the alarm runner needs from a motion gate.
pub trait MotionConfirmation: Send + Sync {
    /// Starts a fresh run and returns its id.
    fn start_monitoring(&self, step_goal: u32) -> u64;

    /// Idempotent.
    fn stop_monitoring(&self);

    /// Stops monitoring only if `run` is still the current run.
    fn stop_run(&self, run: u64);

    fn goal_reached(&self) -> bool;

    fn steps_since_start(&self) -> u64;
}

/// [`MotionConfirmation`] over a platform [`StepCounter`].
pub struct MotionMonitor {
    counter: Arc<dyn StepCounter>,
    state: Arc<watch::Sender<MotionState>>,
    events: EventBus,
    pump: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type PumpSlot = Option<JoinHandle<()>>;

impl MotionMonitor {
    pub fn new(counter: Arc<dyn StepCounter>, events: EventBus) -> Self {
        let (state, _) = watch::channel(MotionState::default());
        Self {
            counter,
            state: Arc::new(state),
            events,
            pump: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MotionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MotionState> {
        self.state.subscribe()
    }

    /// Caller holds the pump lock.
    fn stop_locked(&self, pump: &mut PumpSlot, run: Option<u64>) {
        let was_monitoring = self.state.send_if_modified(|s| {
            if run.is_some_and(|run| run != s.run) || !s.is_monitoring {
                return false;
            }
            s.is_monitoring = false;
            true
        });
        if !was_monitoring {
            return;
        }
        info!("stopping motion monitoring");
        self.counter.stop_updates();
        if let Some(task) = pump.take() {
            task.abort();
        }
    }

    fn spawn_pump(&self, run: u64, step_goal: u32, mut updates: mpsc::UnboundedReceiver<StepUpdate>) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut baseline = StepBaseline::new(step_goal);
            while let Some(update) = updates.recv().await {
                let total = match update {
                    Ok(total) => total,
                    Err(e) => {
                        warn!("Pedometer error: {e}");
                        continue;
                    }
                };

                let was_reached = baseline.goal_reached();
                let steps = baseline.record(total);
                let reached = baseline.goal_reached();

                let applied = state.send_if_modified(|s| {
                    if s.run != run || !s.is_monitoring {
                        return false;
                    }
                    s.steps_since_start = steps;
                    s.goal_reached = reached;
                    true
                });
                if !applied {
                    // Stopped or superseded while this update was in flight.
                    break;
                }

                debug!(steps, goal = step_goal, "steps since start");
                events.publish(Event::MotionProgress {
                    steps_since_start: steps,
                    step_goal,
                    at: Utc::now(),
                });
                if reached && !was_reached {
                    info!(steps, "step goal reached");
                    events.publish(Event::StepGoalReached {
                        steps_since_start: steps,
                        at: Utc::now(),
                    });
                }
            }
        })
    }
}

impl MotionConfirmation for MotionMonitor {
    fn start_monitoring(&self, step_goal: u32) -> u64 {
        let mut pump = lock(&self.pump);
        if let Some(previous) = pump.take() {
            previous.abort();
            self.counter.stop_updates();
        }

        let mut run = 0;
        if !self.counter.is_step_counting_available() {
            warn!("{}", PlatformError::Unavailable("Step counting"));
            self.state.send_modify(|s| {
                run = s.run + 1;
                *s = MotionState {
                    step_goal,
                    run,
                    ..MotionState::default()
                };
            });
            return run;
        }

        info!(step_goal, "starting motion monitoring");
        self.state.send_modify(|s| {
            run = s.run + 1;
            *s = MotionState {
                steps_since_start: 0,
                goal_reached: false,
                is_monitoring: true,
                step_goal,
                run,
            };
        });

        let (tx, rx) = mpsc::unbounded_channel();
        self.counter.start_updates(tx);
        *pump = Some(self.spawn_pump(run, step_goal, rx));
        run
    }

    fn stop_monitoring(&self) {
        let mut pump = lock(&self.pump);
        self.stop_locked(&mut pump, None);
    }

    fn stop_run(&self, run: u64) {
        let mut pump = lock(&self.pump);
        self.stop_locked(&mut pump, Some(run));
    }

    fn goal_reached(&self) -> bool {
        self.state.borrow().goal_reached
    }

    fn steps_since_start(&self) -> u64 {
        self.state.borrow().steps_since_start
    }
}
