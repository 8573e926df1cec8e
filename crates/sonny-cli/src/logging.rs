use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable colored output (for interactive use).
    Human,
    /// Structured JSON output (for daemon/agent mode).
    Json,
}

/// Parses the `--format` flag shared by all three binaries; anything
/// other than `"json"` falls back to human-readable output.
pub fn parse_format(s: &str) -> LogFormat {
    match s {
        "json" => LogFormat::Json,
        _ => LogFormat::Human,
    }
}

/// Initialize the global tracing subscriber. Call once at program
/// startup. Respects `RUST_LOG` for filtering; defaults to
/// `sonny=info,warn`. `notifier`, when given, is composed onto the same
/// registry so every log record also reaches the chat pub/sub topic
/// (spec §4.6) without a side-channel log handler.
pub fn init(format: LogFormat, notifier: Option<sonny_chat::Notifier>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sonny=info,warn"));

    match format {
        LogFormat::Human => {
            let subscriber = fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(subscriber)
                .with(notifier)
                .init();
        }
        LogFormat::Json => {
            let subscriber = fmt::layer().json().with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(subscriber)
                .with(notifier)
                .init();
        }
    }
}
