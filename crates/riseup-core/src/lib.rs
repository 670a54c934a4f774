//! # RiseUp Core Library
//!
//! Core logic for the RiseUp wrist alarm: one alarm, a haptic foreground
//! timer that keeps buzzing until the wearer has walked a few steps, and a
//! background smart-alarm session that wakes the device at the alarm time.
//!
//! ## Architecture
//!
//! - **Occurrence**: resolves the next instant a time of day occurs
//! - **Runner**: the foreground alarm timer state machine
//! - **Session**: the background extended-runtime session coordinator
//! - **Motion**: step-count confirmation that the wearer got up
//! - **Storage**: SQLite key-value persistence and TOML configuration
//! - **Platform**: narrow contracts for clock, haptics, pedometer and
//!   sessions, with an in-process simulation
//!
//! ## Key Components
//!
//! - [`AlarmApp`]: application service the front end drives
//! - [`AlarmRunner`]: foreground timer
//! - [`SessionCoordinator`]: background session state machine
//! - [`AlarmStore`]: the persisted alarm

pub mod alarm;
pub mod app;
pub mod cancel;
pub mod error;
pub mod events;
pub mod haptics;
pub mod motion;
pub mod occurrence;
pub mod platform;
pub mod runner;
pub mod session;
pub mod storage;
pub mod store;

pub use alarm::{format_short, parse_time_of_day, Alarm};
pub use app::{AlarmApp, AppStatus, Platform};
pub use error::{ConfigError, CoreError, DatabaseError, PlatformError, ValidationError};
pub use events::{Event, EventBus, SkipReason};
pub use haptics::{HapticPattern, HapticPlayer};
pub use motion::{MotionConfirmation, MotionMonitor, MotionState, StepBaseline};
pub use occurrence::{next_occurrence, next_occurrence_at, ScheduledOccurrence};
pub use runner::{quick_alarm, AlarmRunner, QuickAlarmReport, RingConfig, RunnerPhase, RunnerState};
pub use session::{SessionConfig, SessionCoordinator, SessionPhase, SessionState, MAX_SESSION_HORIZON_HOURS};
pub use storage::{Config, Database};
pub use store::{AlarmStore, STORAGE_KEY};
