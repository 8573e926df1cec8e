use std::time::Duration;

use tracing::warn;

/// Reconnection backoff for long-lived transports (the ChatBridge's chat
/// connection): sleep, then double the delay on every further failure,
/// capped so a flapping transport doesn't end up sleeping for hours.
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Sleep for the current delay, then double it (capped at `max`) for
    /// next time.
    pub async fn wait(&mut self) {
        warn!(delay_secs = self.current.as_secs(), "reconnecting after delay");
        tokio::time::sleep(self.current).await;
        self.current = (self.current * 2).min(self.max);
    }

    /// Reset after a successful reconnect so the next failure starts small
    /// again.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn doubles_each_wait_until_capped() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(1), Duration::from_millis(8));
        assert_eq!(backoff.current, Duration::from_millis(1));
        backoff.wait().await;
        assert_eq!(backoff.current, Duration::from_millis(2));
        backoff.wait().await;
        assert_eq!(backoff.current, Duration::from_millis(4));
        backoff.wait().await;
        assert_eq!(backoff.current, Duration::from_millis(8));
        backoff.wait().await;
        assert_eq!(backoff.current, Duration::from_millis(8));
    }

    #[tokio::test]
    async fn reset_returns_to_initial() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(1), Duration::from_millis(8));
        backoff.wait().await;
        backoff.wait().await;
        backoff.reset();
        assert_eq!(backoff.current, Duration::from_millis(1));
    }
}
