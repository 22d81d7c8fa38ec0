use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use channel_gate::config::load_config;
use channel_gate::lifecycle::App;
use channel_gate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "channel-gate")]
#[command(about = "Paid-subscription access gate for a restricted channel", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "channel-gate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        offline_payments = config.payments.offline,
        chat_platform = config.telegram.enabled,
        sweep_interval_secs = config.sweeper.interval_secs,
        plans = config.plans.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let app = App::build(config).await?;
    app.run(listener).await?;

    Ok(())
}
