use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use riseup_core::platform::simulated::RecordingHaptics;
use riseup_core::platform::SystemClock;
use riseup_core::{parse_time_of_day, quick_alarm, HapticPlayer};
use serde_json::json;

use super::print_json;

#[derive(Args)]
pub struct QuickArgs {
    /// Time of day to fire at (e.g. "07:15")
    time: String,
    /// Number of rapid-fire bursts
    #[arg(long, default_value = "4")]
    bursts: u32,
    /// Gap between bursts in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,
}

pub fn run(args: QuickArgs) -> Result<(), Box<dyn std::error::Error>> {
    let time_of_day = parse_time_of_day(&args.time)?;
    let haptics = Arc::new(RecordingHaptics::default());
    let player = HapticPlayer::new(haptics.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async {
        tokio::select! {
            report = quick_alarm(
                &SystemClock,
                &player,
                time_of_day,
                args.bursts,
                Duration::from_millis(args.interval_ms),
            ) => Some(report),
            _ = tokio::signal::ctrl_c() => None,
        }
    });

    match outcome {
        Some(Some(report)) => print_json(&json!({
            "status": "fired",
            "report": report,
            "taps": haptics.total(),
        })),
        Some(None) => print_json(&json!({ "status": "time must be in future" })),
        None => print_json(&json!({ "status": "cancelled" })),
    }
}
