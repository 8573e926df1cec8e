//! Operator chat bridge and log notifier for the sonny fault detector:
//! relays log lines onto the inventory cache's pub/sub and answers
//! operator status queries from a chat transport.

pub mod chatbridge;
pub mod notifier;

pub use chatbridge::{ChatBridge, ChatTransport};
pub use notifier::Notifier;
