use crate::{
    codec::{encode_notification, NotificationPayload},
    registry::TokenStore,
    sip_ext::IdentityContext,
    transport::GatewayTransport,
    Aor, DeviceToken, Error, Result,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default notification content configured at startup.
#[derive(Debug, Clone)]
pub struct PushDefaults {
    pub alert: String,
    pub sound: Option<String>,
    pub badge: i32,
}

/// Orchestrates send / register / status operations against the push
/// gateway and the device registry.
///
/// Every operation validates the device-token length first and fails
/// fast before touching the network or storage. A failed send is retried
/// exactly once after a reconnect; a second failure surfaces as
/// `DeliveryFailed` with the Call-ID and token logged for operator
/// correlation.
#[derive(Clone)]
pub struct PushClient {
    transport: Arc<dyn GatewayTransport>,
    store: Option<Arc<dyn TokenStore>>,
    defaults: PushDefaults,
}

impl PushClient {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        store: Option<Arc<dyn TokenStore>>,
        defaults: PushDefaults,
    ) -> Self {
        PushClient {
            transport,
            store,
            defaults,
        }
    }

    /// Send the default alert to a directly supplied token.
    pub async fn push_request(&self, ctx: &IdentityContext, token: &str) -> Result<()> {
        let token = DeviceToken::from_hex(token)?;
        let payload = self.default_payload(self.defaults.alert.clone(), None);
        self.deliver(ctx, &token, &payload).await
    }

    /// Send a custom alert text, with an optional structured payload
    /// merged at the top level.
    pub async fn push_message(
        &self,
        ctx: &IdentityContext,
        token: &str,
        message: &str,
        custom: Option<Map<String, Value>>,
    ) -> Result<()> {
        let token = DeviceToken::from_hex(token)?;
        let payload = self.default_payload(message.to_string(), custom);
        self.deliver(ctx, &token, &payload).await
    }

    /// Record a device registration for the recipient of this request.
    pub async fn push_register(&self, ctx: &IdentityContext, token: &str) -> Result<()> {
        let token = DeviceToken::from_hex(token)?;
        let aor = Aor::from_uri(&ctx.to_uri)?;
        let store = self.store()?;

        debug!(call_id = %ctx.call_id, aor = %aor, token = %token, "registering device");
        store.upsert(&aor, &token, &ctx.call_id).await
    }

    /// Resolve the recipient's token through the registry and send.
    /// Fails with `DeviceNotFound` when no registration exists.
    pub async fn push_message_by_identity(
        &self,
        ctx: &IdentityContext,
        message: &str,
        custom: Option<Map<String, Value>>,
    ) -> Result<()> {
        let aor = Aor::from_uri(&ctx.to_uri)?;
        let store = self.store()?;

        let token = store
            .find_token(&aor)
            .await?
            .ok_or_else(|| Error::DeviceNotFound(aor.to_string()))?;

        let payload = self.default_payload(message.to_string(), custom);
        self.deliver(ctx, &token, &payload).await
    }

    /// Protocol-level status reporting. Reserved.
    pub async fn push_status(&self, _token: &str, _code: u32) -> Result<()> {
        Err(Error::Unsupported("push_status".to_string()))
    }

    fn default_payload(
        &self,
        alert: String,
        custom: Option<Map<String, Value>>,
    ) -> NotificationPayload {
        let mut payload = NotificationPayload::new(alert).badge(self.defaults.badge);
        if let Some(sound) = &self.defaults.sound {
            payload = payload.sound(sound.clone());
        }
        if let Some(custom) = custom {
            payload = payload.custom(custom);
        }
        payload
    }

    fn store(&self) -> Result<&Arc<dyn TokenStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::Storage("no device registry configured".to_string()))
    }

    /// Encode and write one notification. A write failure triggers one
    /// reconnect and one resend; a second failure is final.
    async fn deliver(
        &self,
        ctx: &IdentityContext,
        token: &DeviceToken,
        payload: &NotificationPayload,
    ) -> Result<()> {
        let json = payload.to_json()?;
        let frame = encode_notification(token, &json)?;

        match self.transport.send(&frame).await {
            Ok(()) => Ok(()),
            Err(Error::Write(e)) => {
                warn!(
                    call_id = %ctx.call_id,
                    token = %token,
                    "push write failed ({}), reconnecting once",
                    e
                );
                self.resend_once(ctx, token, &frame).await
            }
            Err(e) => Err(e),
        }
    }

    async fn resend_once(
        &self,
        ctx: &IdentityContext,
        token: &DeviceToken,
        frame: &[u8],
    ) -> Result<()> {
        let retry = async {
            self.transport.connect().await?;
            self.transport.send(frame).await
        }
        .await;

        retry.map_err(|e| {
            error!(
                call_id = %ctx.call_id,
                token = %token,
                "push delivery failed after reconnect: {}",
                e
            );
            Error::DeliveryFailed(format!("call id {}, token {}: {}", ctx.call_id, token, e))
        })
    }
}
