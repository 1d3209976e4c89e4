use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

/// Configuration surface of the push subsystem.
///
/// Field names and defaults mirror the module parameters of the original
/// deployment: sandbox gateway endpoints, "You have a call" as the
/// default alert, badge -1 (omitted), 100 ms notification reads and
/// 500 ms feedback reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Client certificate (PEM).
    pub cert_file: PathBuf,
    /// Client private key (PEM).
    pub key_file: PathBuf,
    /// CA bundle the gateway certificate is verified against (PEM).
    pub ca_file: PathBuf,

    pub gateway_host: String,
    pub gateway_port: u16,
    pub read_timeout_ms: u64,

    /// Default alert text for `push_request`.
    pub alert: String,
    pub sound: Option<String>,
    /// Negative means the badge is omitted from the payload.
    pub badge: i32,

    /// Feedback endpoint; `None` disables the feedback poller.
    pub feedback_host: Option<String>,
    pub feedback_port: u16,
    pub feedback_read_timeout_ms: u64,

    /// Storage connection descriptor, e.g. `sqlite:push.db?mode=rwc`;
    /// `None` disables the device registry.
    pub db_url: Option<String>,
    pub table: String,

    /// Connect to the gateway at service build instead of lazily on the
    /// first send.
    pub eager_connect: bool,

    pub health_period_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            cert_file: PathBuf::new(),
            key_file: PathBuf::new(),
            ca_file: PathBuf::new(),
            gateway_host: "gateway.sandbox.push.apple.com".to_string(),
            gateway_port: 2195,
            read_timeout_ms: 100,
            alert: "You have a call".to_string(),
            sound: None,
            badge: -1,
            feedback_host: None,
            feedback_port: 2196,
            feedback_read_timeout_ms: 500,
            db_url: None,
            table: "push_apns".to_string(),
            eager_connect: false,
            health_period_ms: crate::health::DEFAULT_PERIOD.as_millis() as u64,
        }
    }
}

impl PushConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn feedback_read_timeout(&self) -> Duration {
        Duration::from_millis(self.feedback_read_timeout_ms)
    }

    pub fn health_period(&self) -> Duration {
        Duration::from_millis(self.health_period_ms)
    }
}
