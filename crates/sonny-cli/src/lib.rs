//! Shared wiring for the `monitor`, `sonny`, and `ns4` binaries: config
//! loading, logging initialization, and cloud/cache/queue bootstrap.

pub mod bootstrap;
pub mod logging;
pub mod slack;

pub use bootstrap::{connect, Context};
pub use logging::LogFormat;
pub use slack::SlackTransport;
