use clap::{Parser, Subcommand};
use riseup_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "riseup", version, about = "RiseUp haptic alarm")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show and edit the alarm
    Alarm {
        #[command(subcommand)]
        action: commands::alarm::AlarmAction,
    },
    /// Run the alarm against the simulated watch, streaming events as JSON lines
    Run(commands::run::RunArgs),
    /// One-off test alarm at a time of day
    Quick(commands::quick::QuickArgs),
    /// Play a haptic pattern
    Haptics(commands::haptics::HapticsArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = Config::load_or_default().logging.level;
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Alarm { action } => commands::alarm::run(action),
        Commands::Run(args) => commands::run::run(args),
        Commands::Quick(args) => commands::quick::run(args),
        Commands::Haptics(args) => commands::haptics::run(args),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
