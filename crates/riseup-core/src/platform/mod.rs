//! Narrow contracts for the device collaborators.
//!
//! The core never talks to hardware directly. A wrist device provides:
//! - a wall clock
//! - a haptic engine that plays single taps, fire-and-forget
//! - a step counter streaming cumulative totals
//! - an extended-runtime session service that wakes the app at an instant
//!
//! [`simulated`] implements all of them in-process.

pub mod simulated;

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PlatformError;

/// Source of "now" in device-local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// One tap the haptic engine knows how to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticKind {
    Notification,
    Click,
    DirectionUp,
    DirectionDown,
    Success,
    Failure,
    Retry,
    Start,
    Stop,
}

pub trait HapticEngine: Send + Sync {
    /// Play a single tap. Must return immediately.
    fn play(&self, kind: HapticKind);
}

/// One pedometer delivery: the cumulative step total since
/// `start_updates`, or a sensor error for that delivery.
pub type StepUpdate = Result<u64, PlatformError>;

pub trait StepCounter: Send + Sync {
    fn is_step_counting_available(&self) -> bool;

    /// Begin streaming totals into `updates`. Replaces any previous stream.
    fn start_updates(&self, updates: mpsc::UnboundedSender<StepUpdate>);

    /// Stop streaming. Safe to call when not streaming.
    fn stop_updates(&self);
}

pub type SessionId = u64;

/// Why the platform ended an extended-runtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    /// Invalidated by the app itself.
    None,
    /// Another session was already running.
    SessionInProgress,
    /// The session reached its maximum runtime.
    Expired,
    /// The app lost the foreground before the session could continue.
    ResignedFrontmost,
    /// The system refused the session (e.g. low power).
    SuppressedBySystem,
    /// The session failed; see the accompanying error.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEventKind {
    Started,
    WillExpire,
    Invalidated {
        reason: InvalidationReason,
        error: Option<String>,
    },
}

/// A lifecycle notification for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session: SessionId,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;

/// A background execution window granted by the platform.
pub trait ExtendedRuntimeSession: Send + Sync {
    fn id(&self) -> SessionId;

    /// Ask the platform to start the session at `at`.
    fn start_at(&self, at: DateTime<Utc>);

    /// Register the recurring user-facing notification. Must be called
    /// from the `Started` handler; sessions that run without notifying
    /// the user count against the app.
    fn notify_user(&self, haptic: HapticKind, repeat_every: Duration);

    fn invalidate(&self);
}

pub trait RuntimeSessionService: Send + Sync {
    /// Create a session whose lifecycle events go to `events`.
    fn create_session(&self, events: SessionEventSender) -> Box<dyn ExtendedRuntimeSession>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_event_json_shape() {
        let event = SessionEvent {
            session: 3,
            kind: SessionEventKind::Invalidated {
                reason: InvalidationReason::Expired,
                error: None,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["session"], 3);
        assert_eq!(json["kind"], "invalidated");
        assert_eq!(json["reason"], "expired");
    }
}
