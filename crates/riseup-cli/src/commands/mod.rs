pub mod alarm;
pub mod config;
pub mod haptics;
pub mod quick;
pub mod run;

use riseup_core::{Alarm, AlarmStore, Database};
use serde::Serialize;

/// Open the alarm store in the data directory.
pub fn open_store() -> Result<AlarmStore, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    Ok(AlarmStore::load(db, &chrono::Local::now()))
}

#[derive(Serialize)]
pub struct AlarmView<'a> {
    #[serde(flatten)]
    pub alarm: &'a Alarm,
    pub formatted_time: String,
}

impl<'a> AlarmView<'a> {
    pub fn new(alarm: &'a Alarm) -> Self {
        Self {
            alarm,
            formatted_time: alarm.formatted_time(),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
