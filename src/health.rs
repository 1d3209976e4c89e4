use crate::transport::{ChannelState, GatewayTransport};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default tick period; the original module registered its check on a
/// two-second timer.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(2);

/// Timer-driven liveness check for the notification channel.
///
/// On every tick, reconnect when the channel is not established.
/// Failures are logged and retried on the next tick and are never fatal
/// to the host. The check only inspects one channel and must stay quick;
/// it never touches the feedback poller's connection.
pub struct HealthMonitor {
    channel: Arc<dyn GatewayTransport>,
    period: Duration,
    cancel: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        channel: Arc<dyn GatewayTransport>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        HealthMonitor {
            channel,
            period,
            cancel,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("health monitor stopping");
                    break;
                }
                _ = ticker.tick() => match self.channel.state() {
                    ChannelState::Established => {}
                    ChannelState::Closed => {
                        debug!("channel closed, health monitor exiting");
                        break;
                    }
                    state => {
                        debug!("push channel {}, reconnecting", state);
                        if let Err(e) = self.channel.connect().await {
                            warn!("push gateway reconnect failed: {}", e);
                        }
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use std::sync::Mutex;

    struct MockChannel {
        state: Mutex<ChannelState>,
        connects: Mutex<u32>,
        connect_fails: u32,
    }

    impl MockChannel {
        fn disconnected(connect_fails: u32) -> Arc<Self> {
            Arc::new(MockChannel {
                state: Mutex::new(ChannelState::Disconnected),
                connects: Mutex::new(0),
                connect_fails,
            })
        }
    }

    #[async_trait::async_trait]
    impl GatewayTransport for MockChannel {
        async fn connect(&self) -> Result<()> {
            let mut connects = self.connects.lock().unwrap();
            *connects += 1;
            if *connects <= self.connect_fails {
                return Err(Error::Connect("refused".to_string()));
            }
            *self.state.lock().unwrap() = ChannelState::Established;
            Ok(())
        }

        async fn send(&self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn receive_with_timeout(&self, _max: usize, _t: Duration) -> Result<Vec<u8>> {
            Err(Error::ReadTimeout)
        }

        fn state(&self) -> ChannelState {
            *self.state.lock().unwrap()
        }

        async fn close(&self) -> Result<()> {
            *self.state.lock().unwrap() = ChannelState::Closed;
            Ok(())
        }
    }

    #[tokio::test]
    async fn reconnects_a_disconnected_channel() {
        let channel = MockChannel::disconnected(0);
        let cancel = CancellationToken::new();
        let monitor = HealthMonitor::new(channel.clone(), Duration::from_millis(5), cancel.clone());

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(channel.state(), ChannelState::Established);
        assert_eq!(*channel.connects.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn retries_on_next_tick_after_failure() {
        let channel = MockChannel::disconnected(2);
        let cancel = CancellationToken::new();
        let monitor = HealthMonitor::new(channel.clone(), Duration::from_millis(5), cancel.clone());

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Two failed attempts, then success; never fatal.
        assert!(*channel.connects.lock().unwrap() >= 3);
        assert_eq!(channel.state(), ChannelState::Established);
    }

    #[tokio::test]
    async fn exits_when_channel_is_closed() {
        let channel = MockChannel::disconnected(0);
        channel.close().await.unwrap();
        let monitor = HealthMonitor::new(
            channel.clone(),
            Duration::from_millis(5),
            CancellationToken::new(),
        );

        // Returns on its own without a cancel.
        tokio::time::timeout(Duration::from_millis(100), monitor.run())
            .await
            .unwrap();
        assert_eq!(*channel.connects.lock().unwrap(), 0);
    }
}
