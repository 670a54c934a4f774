use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::platform::{InvalidationReason, SessionId};

/// Every state change in the system produces an Event.
/// The CLI streams them; tests subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AlarmUpdated {
        alarm_id: Uuid,
        time: String,
        is_enabled: bool,
        at: DateTime<Utc>,
    },
    AlarmScheduled {
        schedule_id: u64,
        fire_at: DateTime<Utc>,
        delay_secs: f64,
        at: DateTime<Utc>,
    },
    /// A scheduling request that intentionally did nothing.
    AlarmSkipped {
        reason: SkipReason,
        delay_secs: Option<f64>,
        at: DateTime<Utc>,
    },
    AlarmRinging {
        schedule_id: u64,
        at: DateTime<Utc>,
    },
    HapticBurst {
        schedule_id: u64,
        burst: u32,
        max_bursts: u32,
        at: DateTime<Utc>,
    },
    MotionProgress {
        steps_since_start: u64,
        step_goal: u32,
        at: DateTime<Utc>,
    },
    StepGoalReached {
        steps_since_start: u64,
        at: DateTime<Utc>,
    },
    AlarmFinished {
        schedule_id: u64,
        bursts: u32,
        step_goal_reached: bool,
        at: DateTime<Utc>,
    },
    AlarmCancelled {
        schedule_id: u64,
        at: DateTime<Utc>,
    },
    SmartAlarmScheduled {
        session: SessionId,
        fire_at: DateTime<Utc>,
        delay_secs: f64,
        at: DateTime<Utc>,
    },
    SmartAlarmRejected {
        reason: SkipReason,
        delay_secs: Option<f64>,
        at: DateTime<Utc>,
    },
    SmartAlarmStarted {
        session: SessionId,
        at: DateTime<Utc>,
    },
    SmartAlarmWillExpire {
        session: SessionId,
        at: DateTime<Utc>,
    },
    SmartAlarmInvalidated {
        session: SessionId,
        reason: InvalidationReason,
        error: Option<String>,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The alarm is switched off.
    Disabled,
    /// Resolved fire instant is not in the future.
    NonPositiveDelay,
    /// Resolved fire instant lies beyond the session horizon.
    BeyondHorizon,
    /// Smart alarm sessions are turned off in config.
    SmartAlarmOff,
}

/// Broadcast fan-out for [`Event`]s.
///
/// Publishing never fails: with no subscribers the event is dropped, and
/// subscribers that fall behind skip the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = Event::AlarmSkipped {
            reason: SkipReason::NonPositiveDelay,
            delay_secs: Some(0.0),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "alarm_skipped");
        assert_eq!(json["reason"], "non_positive_delay");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(Event::AlarmRinging {
            schedule_id: 1,
            at: Utc::now(),
        });

        let mut rx = bus.subscribe();
        bus.publish(Event::AlarmCancelled {
            schedule_id: 1,
            at: Utc::now(),
        });
        assert!(matches!(rx.recv().await.unwrap(), Event::AlarmCancelled { .. }));
    }
}
