use std::fmt;

/// Errors produced by the push subsystem.
///
/// Variants group into the classes the caller cares about:
/// * validation — rejected before any I/O (`InvalidTokenLength`,
///   `InvalidTokenEncoding`, `AorTooLong`, `UriParse`, `SipMessage`)
/// * transport — `Connect`, `Handshake`, `Certificate`, `Write`,
///   `ReadTimeout`, `ConnectionClosed`
/// * protocol — `PayloadTooLarge`, `MalformedFeedback`
/// * storage — `Storage`
/// * not-found — `DeviceNotFound` (not a system fault)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidTokenLength(usize),
    InvalidTokenEncoding(String),
    AorTooLong(String),
    UriParse(String),
    SipMessage(String),
    PayloadTooLarge(usize),
    MalformedFeedback(String),
    Connect(String),
    Handshake(String),
    Certificate(String),
    Write(String),
    ReadTimeout,
    ConnectionClosed,
    Io(String),
    Storage(String),
    DeviceNotFound(String),
    DeliveryFailed(String),
    Unsupported(String),
}

impl Error {
    /// True for errors that are rejected before any network or storage
    /// operation is attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidTokenLength(_)
                | Error::InvalidTokenEncoding(_)
                | Error::AorTooLong(_)
                | Error::UriParse(_)
                | Error::SipMessage(_)
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connect(_)
                | Error::Handshake(_)
                | Error::Certificate(_)
                | Error::Write(_)
                | Error::ReadTimeout
                | Error::ConnectionClosed
                | Error::Io(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTokenLength(len) => {
                write!(f, "invalid device token length: {}", len)
            }
            Error::InvalidTokenEncoding(e) => write!(f, "invalid device token encoding: {}", e),
            Error::AorTooLong(aor) => write!(f, "address of record too long: {}", aor),
            Error::UriParse(e) => write!(f, "URI parse error: {}", e),
            Error::SipMessage(e) => write!(f, "SIP message error: {}", e),
            Error::PayloadTooLarge(len) => write!(f, "payload too large: {} bytes", len),
            Error::MalformedFeedback(e) => write!(f, "malformed feedback record: {}", e),
            Error::Connect(e) => write!(f, "connect error: {}", e),
            Error::Handshake(e) => write!(f, "TLS handshake error: {}", e),
            Error::Certificate(e) => write!(f, "certificate error: {}", e),
            Error::Write(e) => write!(f, "write error: {}", e),
            Error::ReadTimeout => write!(f, "read timed out"),
            Error::ConnectionClosed => write!(f, "connection closed by peer"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Storage(e) => write!(f, "storage error: {}", e),
            Error::DeviceNotFound(aor) => write!(f, "no device token registered for {}", aor),
            Error::DeliveryFailed(e) => write!(f, "push delivery failed: {}", e),
            Error::Unsupported(what) => write!(f, "{} is not supported", what),
        }
    }
}

impl std::error::Error for Error {}

impl From<rsip::Error> for Error {
    fn from(e: rsip::Error) -> Self {
        Error::SipMessage(e.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

// Required by the tokio_util::codec::Decoder bound; transport paths map
// io::Error to Connect/Handshake/Write/ConnectionClosed explicitly.
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
