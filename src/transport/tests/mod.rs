
use crate::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::{
    rustls::{pki_types, ServerConfig},
    TlsAcceptor,
};

pub const CA_PEM: &[u8] = include_bytes!("../../../tests/fixtures/ca.pem");
pub const SERVER_CERT_PEM: &[u8] = include_bytes!("../../../tests/fixtures/server.pem");
pub const SERVER_KEY_PEM: &[u8] = include_bytes!("../../../tests/fixtures/server.key");

/// TLS acceptor for the in-test gateway, using the fixture certificate
/// issued for `localhost`.
pub fn test_acceptor() -> TlsAcceptor {
    let certs = rustls_pemfile::certs(&mut &SERVER_CERT_PEM[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .expect("fixture certificate parses");
    let key = rustls_pemfile::pkcs8_private_keys(&mut &SERVER_KEY_PEM[..])
        .next()
        .expect("fixture key present")
        .expect("fixture key parses");

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, pki_types::PrivateKeyDer::Pkcs8(key))
        .expect("server TLS config");
    TlsAcceptor::from(Arc::new(config))
}

/// Bind a listener on an ephemeral port for the in-test gateway.
pub async fn bind_gateway() -> Result<(TcpListener, u16)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}
