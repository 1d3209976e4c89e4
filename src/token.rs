use crate::{Error, Result};
use std::fmt;

/// Device token length on the wire, in bytes.
pub const DEVICE_TOKEN_LEN: usize = 32;

/// Device token length as a hex string.
pub const DEVICE_TOKEN_HEX_LEN: usize = DEVICE_TOKEN_LEN * 2;

/// Fixed-length opaque identifier for a device's push endpoint.
///
/// Tokens arrive from SIP clients as 64 hex characters and travel on the
/// wire as 32 raw bytes. Construction validates the length invariant, so
/// holding a `DeviceToken` means it is safe to send or store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceToken([u8; DEVICE_TOKEN_LEN]);

impl DeviceToken {
    /// Parse a token from its 64-character hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != DEVICE_TOKEN_HEX_LEN {
            return Err(Error::InvalidTokenLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| Error::InvalidTokenEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Build a token from exactly 32 raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; DEVICE_TOKEN_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidTokenLength(bytes.len()))?;
        Ok(DeviceToken(raw))
    }

    pub fn as_bytes(&self) -> &[u8; DEVICE_TOKEN_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken({})", self.to_hex())
    }
}

impl std::str::FromStr for DeviceToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}
