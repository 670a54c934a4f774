use std::time::Duration;

use clap::Args;
use riseup_core::{AlarmApp, Config, Event, EventBus, Platform, RunnerPhase};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::{open_store, print_json};

#[derive(Args)]
pub struct RunArgs {
    /// Simulated walking pace once the alarm rings (0 = stand still)
    #[arg(long)]
    steps_per_second: Option<u32>,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let steps_per_second = args
        .steps_per_second
        .unwrap_or(config.simulation.steps_per_second);
    let platform = Platform::simulated(
        steps_per_second,
        Duration::from_secs(config.simulation.session_max_runtime_secs),
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let mut app = AlarmApp::from_config(open_store()?, &platform, &config, events);

        let status = app.launch();
        if status.runner.phase != RunnerPhase::Scheduled {
            warn!("Alarm is not scheduled; enable it with `riseup alarm enable`");
            return print_json(&status);
        }

        let stream = async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        match serde_json::to_string(&event) {
                            Ok(line) => println!("{line}"),
                            Err(e) => warn!("Failed to encode event: {e}"),
                        }
                        if matches!(event, Event::AlarmFinished { .. }) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event stream lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        };
        let shutdown = async {
            tokio::select! {
                _ = stream => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        };

        app.run_until(shutdown).await;
        app.shutdown();
        print_json(&app.status())
    })
}
