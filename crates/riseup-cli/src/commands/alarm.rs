use chrono::Local;
use clap::Subcommand;
use riseup_core::parse_time_of_day;

use super::{open_store, print_json, AlarmView};

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Print the alarm as JSON
    Show,
    /// Set the alarm time (e.g. "07:15" or "7:15 AM")
    Set {
        time: String,
        /// Save the alarm switched off
        #[arg(long)]
        disabled: bool,
    },
    /// Switch the alarm on
    Enable,
    /// Switch the alarm off
    Disable,
}

pub fn run(action: AlarmAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let alarm = match action {
        AlarmAction::Show => store.alarm(),
        AlarmAction::Set { time, disabled } => {
            let time_of_day = parse_time_of_day(&time)?;
            store.update_time_of_day(time_of_day, &Local::now(), !disabled)
        }
        AlarmAction::Enable => store.set_enabled(true),
        AlarmAction::Disable => store.set_enabled(false),
    };
    print_json(&AlarmView::new(&alarm))
}
