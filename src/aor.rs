use crate::{Error, Result};
use std::fmt;

/// Maximum user-part length in bytes.
pub const MAX_USER_LEN: usize = 64;
/// Maximum host-part length in bytes.
pub const MAX_HOST_LEN: usize = 128;
/// Maximum combined AOR length in bytes, including the `@` separator.
pub const MAX_AOR_LEN: usize = 256;

/// Address of Record: the normalized subscriber identity derived from a
/// SIP URI, used as the registry key for device-token lookups.
///
/// The AOR is the lowercased `user@host` of the URI (bare host when the
/// URI carries no user part). Length limits are enforced at extraction,
/// never by truncation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aor(String);

impl Aor {
    /// Extract the AOR from a parsed SIP URI.
    pub fn from_uri(uri: &rsip::Uri) -> Result<Self> {
        let user = uri.auth.as_ref().map(|a| a.user.as_str()).unwrap_or("");
        let host = uri.host_with_port.host.to_string();

        if user.len() > MAX_USER_LEN
            || host.len() > MAX_HOST_LEN
            || user.len() + host.len() + 1 > MAX_AOR_LEN
        {
            return Err(Error::AorTooLong(format!("{}@{}", user, host)));
        }

        let aor = if user.is_empty() {
            host.to_lowercase()
        } else {
            format!("{}@{}", user, host).to_lowercase()
        };
        Ok(Aor(aor))
    }

    /// Parse a URI string and extract the AOR from it.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = rsip::Uri::try_from(uri).map_err(|e| Error::UriParse(e.to_string()))?;
        Self::from_uri(&uri)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Aor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
