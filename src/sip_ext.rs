use crate::{Error, Result};
use rsip::prelude::{HeadersExt, ToTypedHeader, UntypedHeader};

/// Identity context pulled out of an inbound SIP request by the host's
/// SIP layer.
///
/// Only two things are consumed from the message: the Call-ID (required,
/// used as the diagnostic correlation key on every logged failure) and
/// the To-URI (the recipient identity for register / lookup paths).
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub call_id: String,
    pub to_uri: rsip::Uri,
}

impl IdentityContext {
    pub fn from_request(req: &rsip::Request) -> Result<Self> {
        let call_id = req
            .call_id_header()
            .map_err(|e| Error::SipMessage(format!("missing Call-ID header: {}", e)))?
            .value()
            .trim()
            .to_string();
        if call_id.is_empty() {
            return Err(Error::SipMessage("empty Call-ID header".to_string()));
        }

        let to_uri = req
            .to_header()
            .map_err(|e| Error::SipMessage(format!("missing To header: {}", e)))?
            .typed()
            .map_err(|e| Error::SipMessage(format!("unparsable To header: {}", e)))?
            .uri;

        Ok(IdentityContext { call_id, to_uri })
    }
}
