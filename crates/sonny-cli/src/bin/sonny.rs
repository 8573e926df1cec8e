use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sonny_cache::db_index;
use sonny_cache::{InventoryCache, InventorySnapshot, RedisInventoryCache};
use sonny_chat::ChatBridge;
use sonny_cli::bootstrap::redis_url;
use sonny_cli::SlackTransport;
use sonny_core::config::Config;

#[derive(Parser)]
#[command(name = "sonny", version, about = "Run the sonny operator chat bridge")]
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
    sonny_cli::logging::init(sonny_cli::logging::parse_format(&cli.format), None);

    let config = match Config::from_file(&cli.config, false) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("sonny: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Some(slack) = config.slack.clone() else {
        eprintln!("sonny: SLACK section is required to run the chat bridge");
        return ExitCode::FAILURE;
    };

    // One InventorySnapshot per cloud named in SLACK.clouds, each backed
    // by that cloud's own Redis database. The bridge's own cache handle
    // (used for pub/sub) lives in the cross-cloud default namespace.
    let url = redis_url(&config.redis);
    let cache_db0 = match RedisInventoryCache::connect(&url, 0).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("sonny: {e}");
            return ExitCode::FAILURE;
        }
    };
    let cache: Arc<dyn InventoryCache> = Arc::new(cache_db0);

    let mut snapshots: HashMap<String, Arc<InventorySnapshot>> = HashMap::new();
    let clouds = if slack.clouds.is_empty() {
        vec![config.openstack.cloud.clone()]
    } else {
        slack.clouds.clone()
    };
    for cloud in &clouds {
        let db = db_index(cloud);
        let cache_for_cloud = match RedisInventoryCache::connect(&url, db).await {
            Ok(c) => c,
            Err(e) => {
                eprintln!("sonny: connecting cache for {cloud}: {e}");
                return ExitCode::FAILURE;
            }
        };
        snapshots.insert(
            cloud.clone(),
            Arc::new(InventorySnapshot::new(Arc::new(cache_for_cloud))),
        );
    }

    let transport = match SlackTransport::connect(slack.token.clone(), slack.channel.clone()).await {
        Ok(t) => Arc::new(t),
        Err(e) => {
            eprintln!("sonny: {e}");
            return ExitCode::FAILURE;
        }
    };

    let bridge = ChatBridge::new(cache, snapshots, transport, slack.channel.clone());
    if let Err(e) = bridge.run().await {
        tracing::error!(error = %e, "sonny exited");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
