use crate::{
    client::{PushClient, PushDefaults},
    config::PushConfig,
    feedback::FeedbackPoller,
    health::HealthMonitor,
    registry::{SqliteTokenStore, TokenStore},
    transport::{SecureChannel, TlsContext},
    Result,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Builder for [`PushService`].
///
/// A token store can be injected (any [`TokenStore`]); otherwise one is
/// opened from `db_url` when configured.
pub struct PushServiceBuilder {
    config: PushConfig,
    store: Option<Arc<dyn TokenStore>>,
}

impl PushServiceBuilder {
    pub fn new(config: PushConfig) -> Self {
        PushServiceBuilder {
            config,
            store: None,
        }
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the service: load credential material (the only fatal
    /// path), open the registry, connect eagerly when configured, and
    /// spawn the Health Monitor and — when a feedback endpoint and a
    /// registry are both present — the Feedback Poller.
    pub async fn build(self) -> Result<PushService> {
        let config = self.config;

        let tls = TlsContext::from_files(&config.cert_file, &config.key_file, &config.ca_file)?;

        let store: Option<Arc<dyn TokenStore>> = match self.store {
            Some(store) => Some(store),
            None => match &config.db_url {
                Some(url) => {
                    let store = SqliteTokenStore::connect(url, &config.table).await?;
                    store.init_schema().await?;
                    Some(Arc::new(store))
                }
                None => None,
            },
        };
        if let Some(store) = &store {
            store.check_connection().await?;
        }

        let channel = Arc::new(SecureChannel::new(
            tls.clone(),
            config.gateway_host.clone(),
            config.gateway_port,
            config.read_timeout(),
        ));
        if config.eager_connect {
            channel.connect().await?;
        }

        let cancel = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let monitor = HealthMonitor::new(
            channel.clone(),
            config.health_period(),
            cancel.child_token(),
        );
        tasks.push(tokio::spawn(monitor.run()));

        match (&config.feedback_host, &store) {
            (Some(feedback_host), Some(store)) => {
                let feedback_channel = Arc::new(SecureChannel::new(
                    tls.clone(),
                    feedback_host.clone(),
                    config.feedback_port,
                    config.feedback_read_timeout(),
                ));
                let poller = FeedbackPoller::new(
                    feedback_channel.clone(),
                    store.clone(),
                    feedback_channel.read_timeout(),
                    cancel.child_token(),
                );
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = poller.run().await {
                        warn!("feedback poller exited with error: {}", e);
                    }
                }));
            }
            (Some(_), None) => {
                warn!("feedback endpoint configured without a device registry, poller disabled");
            }
            _ => {}
        }

        let defaults = PushDefaults {
            alert: config.alert.clone(),
            sound: config.sound.clone(),
            badge: config.badge,
        };
        let client = PushClient::new(channel.clone(), store.clone(), defaults);

        info!(
            gateway = %format!("{}:{}", config.gateway_host, config.gateway_port),
            eager = config.eager_connect,
            "push service ready"
        );

        Ok(PushService {
            channel,
            client,
            cancel,
            tasks,
        })
    }
}

/// Process-wide context owning the gateway channel, the push client and
/// the background tasks. Replaces the original design's module-global
/// server handle with an explicitly constructed, explicitly shut-down
/// object.
pub struct PushService {
    channel: Arc<SecureChannel>,
    client: PushClient,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for PushService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushService")
            .field("channel", &self.channel)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl PushService {
    /// Handle for issuing push operations. Cheap to clone; all clones
    /// share the service's channel and registry.
    pub fn client(&self) -> PushClient {
        self.client.clone()
    }

    pub fn channel(&self) -> &Arc<SecureChannel> {
        &self.channel
    }

    /// Stop background tasks, close the gateway session and release
    /// credential material.
    pub async fn shutdown(self) -> Result<()> {
        info!("push service shutting down");
        self.cancel.cancel();
        for task in self.tasks {
            task.await.ok();
        }
        self.channel.close().await
    }
}
