use std::sync::Arc;

use clap::Args;
use riseup_core::platform::simulated::RecordingHaptics;
use riseup_core::{HapticPattern, HapticPlayer};
use serde_json::json;

use super::print_json;

#[derive(Args)]
pub struct HapticsArgs {
    /// single-tap, rapid-fire or wave
    pattern: String,
}

pub fn run(args: HapticsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pattern: HapticPattern = args.pattern.parse()?;
    let haptics = Arc::new(RecordingHaptics::default());
    let player = HapticPlayer::new(haptics.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(player.play_and_wait(pattern));

    print_json(&json!({
        "pattern": pattern,
        "taps": haptics.played(),
    }))
}
