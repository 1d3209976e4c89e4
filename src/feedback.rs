use crate::{
    codec::FeedbackCodec,
    registry::TokenStore,
    transport::GatewayTransport,
    Error, Result,
};
use bytes::BytesMut;
use std::{sync::Arc, time::Duration};
use tokio_util::{codec::Decoder, sync::CancellationToken};
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 1024;

/// Background poller for the gateway's feedback service.
///
/// Runs on its own channel instance bound to the feedback endpoint,
/// isolated from the notification path. Feedback data arrives rarely:
/// `ReadTimeout` is the normal idle case and just loops. Received bytes
/// are buffered and drained as complete 38-byte records; each record's
/// token is deleted from the device registry in order. Partial tails
/// survive across reads.
///
/// The stop signal is cooperative and observed at read boundaries. On
/// `ConnectionClosed` or a handshake failure the poller logs and exits;
/// restarting is the host supervisor's job, not this subsystem's.
pub struct FeedbackPoller {
    channel: Arc<dyn GatewayTransport>,
    store: Arc<dyn TokenStore>,
    read_timeout: Duration,
    cancel: CancellationToken,
}

impl FeedbackPoller {
    pub fn new(
        channel: Arc<dyn GatewayTransport>,
        store: Arc<dyn TokenStore>,
        read_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        FeedbackPoller {
            channel,
            store,
            read_timeout,
            cancel,
        }
    }

    pub async fn run(self) -> Result<()> {
        if let Err(e) = self.channel.connect().await {
            error!("feedback service connect failed: {}", e);
            return Err(e);
        }
        info!("feedback poller started");

        let mut codec = FeedbackCodec;
        let mut buffer = BytesMut::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("feedback poller stopping");
                    break;
                }
                received = self.channel.receive_with_timeout(READ_CHUNK, self.read_timeout) => {
                    match received {
                        Ok(data) => {
                            buffer.extend_from_slice(&data);
                            self.drain(&mut codec, &mut buffer).await;
                        }
                        Err(Error::ReadTimeout) => continue,
                        Err(Error::ConnectionClosed) => {
                            // The feedback service sends its batch and
                            // closes; the remainder of the buffer can
                            // only be an incomplete record.
                            debug!("feedback service closed the connection");
                            break;
                        }
                        Err(e) => {
                            error!("feedback read failed: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        self.channel.close().await.ok();
        Ok(())
    }

    async fn drain(&self, codec: &mut FeedbackCodec, buffer: &mut BytesMut) {
        loop {
            match codec.decode(buffer) {
                Ok(Some(record)) => {
                    info!(
                        token = %record.token,
                        invalid_since = record.timestamp,
                        "feedback: token invalidated"
                    );
                    match self.store.delete(&record.token).await {
                        Ok(removed) => {
                            debug!(token = %record.token, removed, "registrations removed");
                        }
                        Err(e) => {
                            error!(token = %record.token, "registry delete failed: {}", e);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Record boundaries cannot be recovered mid-stream;
                    // drop the buffer and keep reading.
                    warn!("skipping malformed feedback data: {}", e);
                    buffer.clear();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        token::{DeviceToken, DEVICE_TOKEN_LEN},
        transport::ChannelState,
        Aor,
    };
    use std::{collections::VecDeque, sync::Mutex};

    /// Channel mock: each receive pops the next scripted outcome; an
    /// empty script parks forever (idle feedback service).
    struct MockChannel {
        script: Mutex<VecDeque<Result<Vec<u8>>>>,
    }

    impl MockChannel {
        fn new(script: Vec<Result<Vec<u8>>>) -> Arc<Self> {
            Arc::new(MockChannel {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait::async_trait]
    impl GatewayTransport for MockChannel {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn send(&self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn receive_with_timeout(&self, _max: usize, _t: Duration) -> Result<Vec<u8>> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(outcome) => outcome,
                None => std::future::pending().await,
            }
        }

        fn state(&self) -> ChannelState {
            ChannelState::Established
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockStore {
        deleted: Mutex<Vec<DeviceToken>>,
    }

    #[async_trait::async_trait]
    impl TokenStore for MockStore {
        async fn find_token(&self, _aor: &Aor) -> Result<Option<DeviceToken>> {
            Ok(None)
        }

        async fn upsert(&self, _aor: &Aor, _token: &DeviceToken, _call_id: &str) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, token: &DeviceToken) -> Result<u64> {
            self.deleted.lock().unwrap().push(*token);
            Ok(1)
        }

        async fn check_connection(&self) -> Result<()> {
            Ok(())
        }
    }

    fn record(timestamp: u32, fill: u8) -> Vec<u8> {
        let mut rec = Vec::with_capacity(38);
        rec.extend_from_slice(&timestamp.to_be_bytes());
        rec.extend_from_slice(&(DEVICE_TOKEN_LEN as u16).to_be_bytes());
        rec.extend_from_slice(&[fill; DEVICE_TOKEN_LEN]);
        rec
    }

    fn token(fill: u8) -> DeviceToken {
        DeviceToken::from_slice(&[fill; DEVICE_TOKEN_LEN]).unwrap()
    }

    #[tokio::test]
    async fn three_records_produce_three_deletes_in_order() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&record(1, 1));
        stream.extend_from_slice(&record(2, 2));
        stream.extend_from_slice(&record(3, 3));

        let channel = MockChannel::new(vec![Ok(stream), Err(Error::ConnectionClosed)]);
        let store = Arc::new(MockStore::default());
        let poller = FeedbackPoller::new(
            channel,
            store.clone(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        poller.run().await.unwrap();

        let deleted = store.deleted.lock().unwrap().clone();
        assert_eq!(deleted, vec![token(1), token(2), token(3)]);
    }

    #[tokio::test]
    async fn partial_tail_held_until_more_data_arrives() {
        let mut first = record(1, 1);
        first.extend_from_slice(&record(2, 2)[..20]);
        let rest = record(2, 2)[20..].to_vec();

        let channel = MockChannel::new(vec![
            Ok(first),
            Err(Error::ReadTimeout),
            Ok(rest),
            Err(Error::ConnectionClosed),
        ]);
        let store = Arc::new(MockStore::default());
        let poller = FeedbackPoller::new(
            channel,
            store.clone(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        poller.run().await.unwrap();

        let deleted = store.deleted.lock().unwrap().clone();
        assert_eq!(deleted, vec![token(1), token(2)]);
    }

    #[tokio::test]
    async fn trailing_partial_record_never_deletes() {
        let mut stream = record(1, 1);
        stream.extend_from_slice(&record(2, 2)[..20]);

        let channel = MockChannel::new(vec![Ok(stream), Err(Error::ConnectionClosed)]);
        let store = Arc::new(MockStore::default());
        let poller = FeedbackPoller::new(
            channel,
            store.clone(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        poller.run().await.unwrap();

        assert_eq!(store.deleted.lock().unwrap().clone(), vec![token(1)]);
    }

    #[tokio::test]
    async fn stop_signal_breaks_the_idle_loop() {
        let channel = MockChannel::new(vec![Err(Error::ReadTimeout)]);
        let store = Arc::new(MockStore::default());
        let cancel = CancellationToken::new();
        let poller = FeedbackPoller::new(
            channel,
            store.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        );

        let handle = tokio::spawn(poller.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        handle.await.unwrap().unwrap();
        assert!(store.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_record_skipped_and_polling_continues() {
        let mut bad = record(1, 1);
        bad[4] = 0;
        bad[5] = 16; // embedded token length 16

        let channel = MockChannel::new(vec![
            Ok(bad),
            Ok(record(2, 2)),
            Err(Error::ConnectionClosed),
        ]);
        let store = Arc::new(MockStore::default());
        let poller = FeedbackPoller::new(
            channel,
            store.clone(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        poller.run().await.unwrap();

        assert_eq!(store.deleted.lock().unwrap().clone(), vec![token(2)]);
    }
}
