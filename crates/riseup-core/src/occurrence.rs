//! Next-occurrence resolution for a wall-clock time of day.
//!
//! Only the hour and minute of the alarm time matter. The candidate is
//! built on `now`'s calendar date in `now`'s time zone; if it is at or
//! before `now` it moves to the next calendar day.
//!
//! ```text
//! alarm 07:15, now 07:14  ->  today 07:15
//! alarm 07:15, now 07:15  ->  tomorrow 07:15
//! alarm 07:15, now 07:16  ->  tomorrow 07:15
//! ```
//!
//! Day advancement is calendar arithmetic on the local date, so across a
//! DST change the returned instant can be 23 or 25 hours after the
//! same-day candidate.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike};

/// Compute the next instant strictly after `now` whose local hour and
/// minute match `time_of_day`. Seconds are always zero.
pub fn next_occurrence<Tz: TimeZone>(time_of_day: &DateTime<Tz>, now: &DateTime<Tz>) -> DateTime<Tz> {
    let wall = time_of_day.with_timezone(&now.timezone());
    next_occurrence_of(wall.hour(), wall.minute(), now)
}

/// Same as [`next_occurrence`] for a bare `NaiveTime`.
pub fn next_occurrence_at<Tz: TimeZone>(time_of_day: NaiveTime, now: &DateTime<Tz>) -> DateTime<Tz> {
    next_occurrence_of(time_of_day.hour(), time_of_day.minute(), now)
}

fn next_occurrence_of<Tz: TimeZone>(hour: u32, minute: u32, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    let candidate = local_instant(&tz, today, hour, minute).unwrap_or_else(|| now.clone());

    if candidate <= *now {
        // Already passed today (an exact match counts as passed).
        today
            .succ_opt()
            .and_then(|tomorrow| local_instant(&tz, tomorrow, hour, minute))
            .unwrap_or(candidate)
    } else {
        candidate
    }
}

/// Resolve `date hour:minute:00` in `tz`.
///
/// Ambiguous wall times (clocks falling back) resolve to the earlier
/// instant. Wall times inside a spring-forward gap slide forward by one
/// hour of wall time.
pub(crate) fn local_instant<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz.from_local_datetime(&(naive + Duration::hours(1))).earliest(),
    }
}

/// A resolved fire instant and its distance from the moment it was
/// computed. Derived on demand, never persisted.
#[derive(Debug, Clone)]
pub struct ScheduledOccurrence<Tz: TimeZone> {
    pub fire_at: DateTime<Tz>,
    pub delay: Duration,
}

impl<Tz: TimeZone> ScheduledOccurrence<Tz> {
    pub fn resolve(time_of_day: &DateTime<Tz>, now: &DateTime<Tz>) -> Self {
        let fire_at = next_occurrence(time_of_day, now);
        let delay = fire_at.clone().signed_duration_since(now.clone());
        Self { fire_at, delay }
    }

    /// The delay as a sleepable duration, only when strictly positive.
    pub fn delay_std(&self) -> Option<std::time::Duration> {
        if self.delay <= Duration::zero() {
            return None;
        }
        self.delay.to_std().ok()
    }

    pub fn delay_secs(&self) -> f64 {
        self.delay.num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono_tz::America::New_York;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn fires_today_when_time_is_still_ahead() {
        let alarm = utc(2025, 1, 1, 7, 15, 0);
        let now = utc(2025, 11, 18, 7, 14, 0);
        assert_eq!(next_occurrence(&alarm, &now), utc(2025, 11, 18, 7, 15, 0));
    }

    #[test]
    fn fires_tomorrow_when_time_has_passed() {
        let alarm = utc(2025, 1, 1, 7, 15, 0);
        let now = utc(2025, 11, 18, 7, 16, 0);
        assert_eq!(next_occurrence(&alarm, &now), utc(2025, 11, 19, 7, 15, 0));
    }

    #[test]
    fn exact_match_counts_as_passed() {
        let alarm = utc(2025, 1, 1, 7, 15, 0);
        let now = utc(2025, 11, 18, 7, 15, 0);
        assert_eq!(next_occurrence(&alarm, &now), utc(2025, 11, 19, 7, 15, 0));
    }

    #[test]
    fn alarm_seconds_are_ignored() {
        let alarm = utc(2025, 1, 1, 7, 15, 42);
        let now = utc(2025, 11, 18, 7, 15, 10);
        // Candidate 07:15:00 is before 07:15:10, so tomorrow.
        assert_eq!(next_occurrence(&alarm, &now), utc(2025, 11, 19, 7, 15, 0));
    }

    #[test]
    fn month_and_year_rollover() {
        let alarm = utc(2025, 6, 1, 6, 0, 0);
        let now = utc(2025, 12, 31, 23, 59, 0);
        assert_eq!(next_occurrence(&alarm, &now), utc(2026, 1, 1, 6, 0, 0));
    }

    #[test]
    fn day_advance_is_calendar_aware_across_spring_forward() {
        let alarm = New_York.with_ymd_and_hms(2025, 1, 1, 7, 0, 0).unwrap();
        let now = New_York.with_ymd_and_hms(2025, 3, 8, 8, 0, 0).unwrap();
        let fire = next_occurrence(&alarm, &now);
        assert_eq!(fire, New_York.with_ymd_and_hms(2025, 3, 9, 7, 0, 0).unwrap());
        // 23 wall-clock hours, one of which is skipped.
        assert_eq!(fire - now, Duration::hours(22));
    }

    #[test]
    fn day_advance_is_calendar_aware_across_fall_back() {
        let alarm = New_York.with_ymd_and_hms(2025, 1, 1, 7, 0, 0).unwrap();
        let now = New_York.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap();
        let fire = next_occurrence(&alarm, &now);
        // 23 wall-clock hours plus the repeated one.
        assert_eq!(fire - now, Duration::hours(24));
        assert_eq!(fire.naive_local(), NaiveDate::from_ymd_opt(2025, 11, 2).unwrap().and_hms_opt(7, 0, 0).unwrap());
    }

    #[test]
    fn gap_time_slides_forward() {
        let now = New_York.with_ymd_and_hms(2025, 3, 9, 1, 0, 0).unwrap();
        let fire = next_occurrence_at(NaiveTime::from_hms_opt(2, 30, 0).unwrap(), &now);
        assert_eq!(fire.naive_local().time(), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
        assert_eq!(fire.date_naive(), now.date_naive());
    }

    #[test]
    fn ambiguous_time_picks_earliest() {
        let now = New_York.with_ymd_and_hms(2025, 11, 2, 0, 0, 0).unwrap();
        let fire = next_occurrence_at(NaiveTime::from_hms_opt(1, 30, 0).unwrap(), &now);
        assert_eq!(fire.with_timezone(&Utc), utc(2025, 11, 2, 5, 30, 0));
    }

    #[test]
    fn scheduled_occurrence_delay() {
        let alarm = utc(2025, 1, 1, 7, 15, 0);
        let now = utc(2025, 11, 18, 7, 14, 30);
        let occ = ScheduledOccurrence::resolve(&alarm, &now);
        assert_eq!(occ.delay, Duration::seconds(30));
        assert_eq!(occ.delay_std(), Some(std::time::Duration::from_secs(30)));
        assert_eq!(occ.delay_secs(), 30.0);
    }

    #[test]
    fn non_positive_delay_is_not_sleepable() {
        let occ = ScheduledOccurrence {
            fire_at: utc(2025, 1, 1, 7, 0, 0),
            delay: Duration::zero(),
        };
        assert_eq!(occ.delay_std(), None);
    }
}
