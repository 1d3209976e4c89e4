use crate::{Error, Result};
use std::{fmt, io::BufReader, path::Path, sync::Arc};
use tokio_rustls::{
    rustls::{pki_types, ClientConfig, RootCertStore},
    TlsConnector,
};

/// Client-side TLS credential material for the push gateway.
///
/// Holds the built connector: client certificate chain, private key and
/// the CA bundle the gateway's certificate is verified against. The
/// material is loaded once and shared by reference across every
/// `SecureChannel` (production and feedback use the same identity).
pub struct TlsContext {
    connector: TlsConnector,
}

impl TlsContext {
    /// Load certificate, private key and CA bundle from PEM files.
    pub fn from_files(cert: &Path, key: &Path, ca: &Path) -> Result<Arc<Self>> {
        let read = |path: &Path| {
            std::fs::read(path)
                .map_err(|e| Error::Certificate(format!("cannot read {}: {}", path.display(), e)))
        };
        Self::from_pem(&read(cert)?, &read(key)?, &read(ca)?)
    }

    /// Build the context from in-memory PEM data.
    pub fn from_pem(cert: &[u8], key: &[u8], ca: &[u8]) -> Result<Arc<Self>> {
        let certs = load_certs(cert)?;
        if certs.is_empty() {
            return Err(Error::Certificate("no certificate in PEM data".to_string()));
        }
        let key = load_private_key(key)?;

        let mut root_store = RootCertStore::empty();
        for root in load_certs(ca)? {
            root_store
                .add(root)
                .map_err(|e| Error::Certificate(format!("bad CA certificate: {}", e)))?;
        }
        if root_store.is_empty() {
            return Err(Error::Certificate("no CA certificate in PEM data".to_string()));
        }

        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_client_auth_cert(certs, key)
            .map_err(|e| Error::Certificate(format!("client auth setup failed: {}", e)))?;

        Ok(Arc::new(TlsContext {
            connector: TlsConnector::from(Arc::new(config)),
        }))
    }

    pub fn connector(&self) -> &TlsConnector {
        &self.connector
    }
}

// TlsConnector carries no Debug impl; the material itself is opaque.
impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext").finish_non_exhaustive()
    }
}

fn load_certs(pem: &[u8]) -> Result<Vec<pki_types::CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, std::io::Error>>()
        .map_err(|e| Error::Certificate(format!("failed to parse certificate: {}", e)))
}

fn load_private_key(pem: &[u8]) -> Result<pki_types::PrivateKeyDer<'static>> {
    // PKCS8 first, then the legacy RSA container.
    let mut reader = BufReader::new(pem);
    let keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .collect::<std::result::Result<Vec<_>, std::io::Error>>()
        .map_err(|e| Error::Certificate(format!("failed to parse PKCS8 key: {}", e)))?;
    if let Some(key) = keys.into_iter().next() {
        return Ok(pki_types::PrivateKeyDer::Pkcs8(key));
    }

    let mut reader = BufReader::new(pem);
    let keys = rustls_pemfile::rsa_private_keys(&mut reader)
        .collect::<std::result::Result<Vec<_>, std::io::Error>>()
        .map_err(|e| Error::Certificate(format!("failed to parse RSA key: {}", e)))?;
    match keys.into_iter().next() {
        Some(key) => Ok(pki_types::PrivateKeyDer::Pkcs1(key)),
        None => Err(Error::Certificate("no valid private key found".to_string())),
    }
}
