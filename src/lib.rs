// APNs push delivery for SIP servers

pub mod aor;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod feedback;
pub mod health;
pub mod registry;
pub mod service;
pub mod sip_ext;
pub mod token;
pub mod transport;

pub use aor::Aor;
pub use client::PushClient;
pub use config::PushConfig;
pub use error::Error;
pub use service::{PushService, PushServiceBuilder};
pub use sip_ext::IdentityContext;
pub use token::DeviceToken;

pub type Result<T> = std::result::Result<T, Error>;
