//! The single alarm an installation owns.

use chrono::{DateTime, Duration, DurationRound, Local, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::occurrence::local_instant;

/// The one alarm of the app.
///
/// `time` is a full instant but only its local hour and minute are ever
/// used; see [`crate::occurrence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: Uuid,
    pub time: DateTime<Utc>,
    pub is_enabled: bool,
}

impl Alarm {
    pub fn new(time: DateTime<Utc>, is_enabled: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            time,
            is_enabled,
        }
    }

    /// First-launch default: the next top of the hour after `now`, disabled.
    pub fn default_for<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        // Truncation works on the local wall time of `now`'s zone.
        let time = now
            .clone()
            .duration_trunc(Duration::hours(1))
            .map(|top| top + Duration::hours(1))
            .unwrap_or_else(|_| now.clone());
        Self::new(time.with_timezone(&Utc), false)
    }

    pub fn local_time<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Tz> {
        self.time.with_timezone(tz)
    }

    /// Hour and minute in the device-local zone.
    pub fn time_of_day(&self) -> NaiveTime {
        let local = self.time.with_timezone(&Local);
        NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or_default()
    }

    /// Short user-facing time like "7:15 AM".
    pub fn formatted_time(&self) -> String {
        format_short(self.time_of_day())
    }
}

pub fn format_short(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

/// Parse a user-entered time of day.
///
/// Accepts 24-hour `H:MM` / `HH:MM` and 12-hour `h:MM AM` / `h:MMpm`.
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, ValidationError> {
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();
    let invalid = || ValidationError::InvalidTimeOfDay {
        input: input.to_string(),
    };

    if upper.ends_with("AM") || upper.ends_with("PM") {
        let (clock, meridiem) = upper.split_at(upper.len() - 2);
        let clock = clock.trim_end();
        return NaiveTime::parse_from_str(&format!("{clock} {meridiem}"), "%I:%M %p")
            .map_err(|_| invalid());
    }

    NaiveTime::parse_from_str(trimmed, "%H:%M").map_err(|_| invalid())
}

/// Place a local time of day on today's date, as the alarm's stored instant.
///
/// DST is resolved like the occurrence resolver does: a time inside a
/// spring-forward gap slides one hour later.
pub fn instant_for_time_of_day<Tz: TimeZone>(time: NaiveTime, now: &DateTime<Tz>) -> DateTime<Utc> {
    local_instant(&now.timezone(), now.date_naive(), time.hour(), time.minute())
        .unwrap_or_else(|| now.clone())
        .with_timezone(&Utc)
}
