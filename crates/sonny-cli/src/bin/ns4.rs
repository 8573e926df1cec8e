use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sonny_cache::JobQueue;
use sonny_core::config::Config;
use sonny_core::job::JobOutcome;
use sonny_core::time::now_epoch_secs;
use sonny_placement::MySqlPlacementDb;
use sonny_probe::Prober;
use sonny_supervisor::executors::Worker;
use sonny_supervisor::{InventoryRefresher, Resurrector};

#[derive(Parser)]
#[command(name = "ns4", version, about = "Run a sonny resurrection worker")]
struct Cli {
    /// Path to the sonny INI configuration file.
    #[arg(long, short = 'c', default_value = "/etc/sonny/sonny.conf")]
    config: PathBuf,

    /// Log output format: human or json.
    #[arg(long, default_value = "human")]
    format: String,

    /// Resurrect a single dead hypervisor onto a spare and exit, instead
    /// of draining the job queue.
    #[arg(long, requires = "spare_hypervisor")]
    dead_hypervisor: Option<String>,

    /// The idle hypervisor to move `dead_hypervisor`'s tenants onto.
    #[arg(long, requires = "dead_hypervisor")]
    spare_hypervisor: Option<String>,

    /// Clear the cooldown marker (`resurrection:timestamp`) and exit.
    #[arg(long)]
    reset_cooldown: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    sonny_cli::logging::init(sonny_cli::logging::parse_format(&cli.format), None);

    let config = match Config::from_file(&cli.config, true) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ns4: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mysql = config.mysql.clone().expect("require_mysql validated presence");

    let ctx = match sonny_cli::connect(config).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ns4: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.reset_cooldown {
        if let Err(e) = ctx.snapshot.clear_resurrection_timestamp().await {
            eprintln!("ns4: {e}");
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    let database_url = format!(
        "mysql://{}:{}@{}/nova",
        mysql.user,
        mysql.pass.clone().unwrap_or_default(),
        mysql.host
    );
    let placement = match MySqlPlacementDb::connect(&database_url).await {
        Ok(p) => Arc::new(p),
        Err(e) => {
            eprintln!("ns4: {e}");
            return ExitCode::FAILURE;
        }
    };
    let prober = Arc::new(Prober::new());
    let refresher = Arc::new(InventoryRefresher::new(ctx.cloud.clone(), ctx.snapshot.clone()));
    let resurrector = Arc::new(Resurrector::new(
        ctx.cloud.clone(),
        placement.clone(),
        prober.clone(),
        ctx.snapshot.clone(),
        refresher.clone(),
    ));

    if let (Some(dead), Some(spare)) = (cli.dead_hypervisor, cli.spare_hypervisor) {
        return match resurrector.resurrect(&dead, &spare, true).await {
            Ok(()) => {
                ctx.snapshot
                    .set_resurrection_timestamp(now_epoch_secs())
                    .await
                    .ok();
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("ns4: resurrection failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let worker = Worker {
        refresher,
        prober,
        snapshot: ctx.snapshot.clone(),
        resurrector,
    };

    loop {
        match ctx.queue.dequeue(5).await {
            Ok(Some(envelope)) => {
                let outcome = worker.execute(envelope.request).await;
                log_outcome(&envelope.id, &outcome);
                if let Err(e) = ctx.queue.finish(&envelope.id, outcome).await {
                    tracing::warn!(error = %e, "failed to record job outcome");
                }
            }
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "dequeue failed, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

fn log_outcome(job_id: &str, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Error { message } => tracing::warn!(%job_id, %message, "job failed"),
        _ => tracing::info!(%job_id, "job finished"),
    }
}
