//! The persisted alarm.
//!
//! Exactly one [`Alarm`] exists per installation. It is stored as JSON
//! under [`STORAGE_KEY`] and written through on every edit. Persistence
//! problems are logged and never surface to the caller.

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::alarm::{instant_for_time_of_day, Alarm};
use crate::storage::Database;

pub const STORAGE_KEY: &str = "RiseUp.mainAlarm";

pub struct AlarmStore {
    db: Option<Database>,
    alarm: watch::Sender<Alarm>,
}

impl AlarmStore {
    /// Read the alarm from `db`, falling back to the default for `now`
    /// when it is missing or cannot be decoded.
    pub fn load<Tz: TimeZone>(db: Database, now: &DateTime<Tz>) -> Self {
        let alarm = match db.kv_get(STORAGE_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<Alarm>(&json) {
                Ok(alarm) => {
                    debug!(id = %alarm.id, "Loaded alarm from storage");
                    alarm
                }
                Err(e) => {
                    warn!("Failed to decode stored alarm, using default: {e}");
                    Alarm::default_for(now)
                }
            },
            Ok(None) => {
                info!("No stored alarm, using default");
                Alarm::default_for(now)
            }
            Err(e) => {
                warn!("Failed to read stored alarm, using default: {e}");
                Alarm::default_for(now)
            }
        };
        let (alarm, _) = watch::channel(alarm);
        Self {
            db: Some(db),
            alarm,
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(alarm: Alarm) -> Self {
        let (alarm, _) = watch::channel(alarm);
        Self { db: None, alarm }
    }

    pub fn alarm(&self) -> Alarm {
        self.alarm.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Alarm> {
        self.alarm.subscribe()
    }

    /// Set time and enabled flag together. The id is kept.
    pub fn update_alarm(&self, time: DateTime<Utc>, is_enabled: bool) -> Alarm {
        self.mutate(|alarm| {
            alarm.time = time;
            alarm.is_enabled = is_enabled;
        })
    }

    /// Place `time_of_day` on today's local date and store it.
    pub fn update_time_of_day(&self, time_of_day: NaiveTime, now: &DateTime<Local>, is_enabled: bool) -> Alarm {
        self.update_alarm(instant_for_time_of_day(time_of_day, now), is_enabled)
    }

    pub fn set_enabled(&self, is_enabled: bool) -> Alarm {
        self.mutate(|alarm| alarm.is_enabled = is_enabled)
    }

    fn mutate(&self, apply: impl FnOnce(&mut Alarm)) -> Alarm {
        self.alarm.send_modify(apply);
        let alarm = self.alarm();
        self.save(&alarm);
        alarm
    }

    fn save(&self, alarm: &Alarm) {
        let Some(db) = &self.db else {
            return;
        };
        let json = match serde_json::to_string(alarm) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode alarm: {e}");
                return;
            }
        };
        if let Err(e) = db.kv_set(STORAGE_KEY, &json) {
            warn!("Failed to persist alarm: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 18, 7, 14, 0).unwrap()
    }

    #[test]
    fn missing_record_gives_default() {
        let store = AlarmStore::load(Database::open_memory().unwrap(), &now());
        let alarm = store.alarm();
        assert!(!alarm.is_enabled);
        assert_eq!(alarm.time, Utc.with_ymd_and_hms(2025, 11, 18, 8, 0, 0).unwrap());
    }

    #[test]
    fn garbage_record_gives_default() {
        let db = Database::open_memory().unwrap();
        db.kv_set(STORAGE_KEY, "{not json").unwrap();
        let store = AlarmStore::load(db, &now());
        assert!(!store.alarm().is_enabled);
    }

    #[test]
    fn edits_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("riseup.db");
        let time = Utc.with_ymd_and_hms(2025, 11, 18, 6, 30, 0).unwrap();

        let id = {
            let store = AlarmStore::load(Database::open_at(&path).unwrap(), &now());
            let alarm = store.update_alarm(time, true);
            assert_eq!(store.set_enabled(false).id, alarm.id);
            store.set_enabled(true);
            alarm.id
        };

        let store = AlarmStore::load(Database::open_at(&path).unwrap(), &now());
        let alarm = store.alarm();
        assert_eq!(alarm.id, id);
        assert_eq!(alarm.time, time);
        assert!(alarm.is_enabled);
    }

    #[test]
    fn subscribers_see_every_edit() {
        let store = AlarmStore::in_memory(Alarm::default_for(&now()));
        let mut rx = store.subscribe();
        store.set_enabled(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_enabled);
    }

    #[test]
    fn stored_record_is_plain_json() {
        let db = Database::open_memory().unwrap();
        let store = AlarmStore::load(db, &now());
        store.set_enabled(true);
        let json = store.db.as_ref().unwrap().kv_get(STORAGE_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["is_enabled"], true);
        assert!(value["id"].is_string());
    }
}
