use std::sync::Arc;

use sonny_cache::InventoryCache;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::span::Context;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context as LayerContext;
use tracing_subscriber::Layer;

/// A log sink that, for every emitted record, publishes the formatted
/// line on the cache's pub/sub topic named after the cloud (spec §4.6).
/// Implemented as an additional [`Layer`] composed onto the tracing
/// registry rather than a side-channel handler, so every existing `info!`
/// / `warn!` call site becomes chat-visible for free.
pub struct Notifier {
    sender: mpsc::UnboundedSender<String>,
}

impl Notifier {
    pub fn new(cloud: impl Into<String>, cache: Arc<dyn InventoryCache>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let topic = cloud.into();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                // A publish failure here must not itself generate a log
                // record through this same layer, or it recurses.
                if let Err(e) = cache.publish(&topic, &line).await {
                    eprintln!("notifier: failed to publish to {topic}: {e}");
                }
            }
        });
        Self { sender: tx }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for Notifier {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} {}",
            event.metadata().level(),
            visitor.message.unwrap_or_default()
        );
        // An unbounded channel never blocks; a full-on failure here means
        // the notifier's own background task has already died.
        let _ = self.sender.send(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sonny_core::Result;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[derive(Default)]
    struct RecordingCache {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl InventoryCache for RecordingCache {
        async fn get_raw(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn set_raw(&self, _key: &str, _value: String) -> Result<()> {
            Ok(())
        }
        async fn publish(&self, topic: &str, message: &str) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), message.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn emitted_event_is_published_to_cloud_topic() {
        let cache = Arc::new(RecordingCache::default());
        let notifier = Notifier::new("mycloud", cache.clone());
        let subscriber = Registry::default().with(notifier);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hv42 marked dead");
        });

        // Give the background publisher task a turn.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let published = cache.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "mycloud");
        assert!(published[0].1.contains("hv42 marked dead"));
    }
}
