use super::MAX_PAYLOAD_LEN;
use crate::{Error, Result};
use serde_json::{json, Map, Value};

/// Notification content, serialized to the gateway's JSON payload shape:
/// `{"aps": {"alert": ..., "badge": ..., "sound": ...}, <custom>...}`.
///
/// Badge is omitted when negative, sound when unset; custom keys merge at
/// the top level next to `aps`. Serialization enforces the protocol's
/// 256-byte ceiling by truncating the alert text, never the structure.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub alert: String,
    pub badge: i32,
    pub sound: Option<String>,
    pub custom: Option<Map<String, Value>>,
}

impl NotificationPayload {
    pub fn new(alert: impl Into<String>) -> Self {
        NotificationPayload {
            alert: alert.into(),
            badge: -1,
            sound: None,
            custom: None,
        }
    }

    pub fn badge(mut self, badge: i32) -> Self {
        self.badge = badge;
        self
    }

    pub fn sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn custom(mut self, custom: Map<String, Value>) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Serialize to JSON bytes, truncating the alert so the result fits
    /// in [`MAX_PAYLOAD_LEN`]. Fails with `PayloadTooLarge` when the
    /// non-alert portion alone leaves no room for any alert text.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let bytes = self.serialize_with_alert(&self.alert);
        if bytes.len() <= MAX_PAYLOAD_LEN {
            return Ok(bytes);
        }

        // Everything except the alert text is fixed; the alert gets
        // whatever budget is left.
        let overhead = self.serialize_with_alert("").len();
        if overhead >= MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge(bytes.len()));
        }

        let budget = MAX_PAYLOAD_LEN - overhead;
        let mut alert = truncate_on_char_boundary(&self.alert, budget).to_string();
        let mut bytes = self.serialize_with_alert(&alert);
        // JSON escaping can expand characters past the byte budget; trim
        // further until the serialized form fits.
        while bytes.len() > MAX_PAYLOAD_LEN && !alert.is_empty() {
            alert.pop();
            bytes = self.serialize_with_alert(&alert);
        }
        if bytes.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    fn serialize_with_alert(&self, alert: &str) -> Vec<u8> {
        let mut aps = Map::new();
        aps.insert("alert".to_string(), json!(alert));
        if self.badge >= 0 {
            aps.insert("badge".to_string(), json!(self.badge));
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".to_string(), json!(sound));
        }

        let mut root = Map::new();
        root.insert("aps".to_string(), Value::Object(aps));
        if let Some(custom) = &self.custom {
            for (key, value) in custom {
                root.insert(key.clone(), value.clone());
            }
        }

        serde_json::to_vec(&Value::Object(root)).unwrap_or_default()
    }
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
