use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sonny_chat::Notifier;
use sonny_core::config::Config;
use sonny_supervisor::{InventoryRefresher, Supervisor};

#[derive(Parser)]
#[command(name = "monitor", version, about = "Run the sonny fault-detection control loop")]
struct Cli {
    /// Path to the sonny INI configuration file.
    #[arg(long, short = 'c', default_value = "/etc/sonny/sonny.conf")]
    config: PathBuf,

    /// Log output format: human or json.
    #[arg(long, default_value = "human")]
    format: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config, false) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("monitor: {e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = match sonny_cli::connect(config).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("monitor: {e}");
            return ExitCode::FAILURE;
        }
    };

    let notifier = Notifier::new(ctx.config.openstack.cloud.clone(), ctx.cache.clone());
    sonny_cli::logging::init(sonny_cli::logging::parse_format(&cli.format), Some(notifier));

    let refresher = Arc::new(InventoryRefresher::new(ctx.cloud.clone(), ctx.snapshot.clone()));
    let supervisor = Supervisor::new(
        ctx.snapshot.clone(),
        ctx.queue.clone(),
        refresher,
        ctx.config.default.clone(),
    );

    if let Err(e) = supervisor.run().await {
        tracing::error!(error = %e, "monitor exited");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
