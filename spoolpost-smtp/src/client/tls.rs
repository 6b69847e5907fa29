//! Implicit TLS connection setup.

use std::{sync::Arc, time::Duration};

use spoolpost_common::{internal, tracing};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::error::{ClientError, Result};

/// The stream an [`super::SmtpClient`] runs over in production.
pub type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Accepts every certificate the relay presents.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

fn client_config(accept_invalid_certs: bool) -> Result<ClientConfig> {
    let mut root_store = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        root_store
            .add(cert)
            .map_err(|e| ClientError::Tls(format!("Failed to add certificate: {e}")))?;
    }

    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "Some certificates could not be loaded");
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    Ok(config)
}

/// Open a TCP connection to `server:port` and complete a TLS handshake on it
/// before any SMTP traffic.
///
/// `timeout` bounds the TCP connect and the handshake together.
///
/// # Errors
///
/// - [`ClientError::Timeout`] if the connection is not up within `timeout`
/// - [`ClientError::Io`] if the TCP connection cannot be established
/// - [`ClientError::Tls`] if `server` is not a valid name or the handshake fails
pub async fn connect_tls(
    server: &str,
    port: u16,
    accept_invalid_certs: bool,
    timeout: Duration,
) -> Result<TlsStream> {
    let connector = TlsConnector::from(Arc::new(client_config(accept_invalid_certs)?));
    let server_name = ServerName::try_from(server.to_string())
        .map_err(|e| ClientError::Tls(format!("Invalid server name {server}: {e}")))?;

    let handshake = async {
        internal!(level = DEBUG, "Connecting to {server}:{port}");
        let stream = TcpStream::connect((server, port)).await?;

        let tls = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::Tls(e.to_string()))?;

        Ok::<_, ClientError>(tls)
    };

    tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| ClientError::Timeout {
            operation: "TLS connect",
            after: timeout,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_server_name() {
        let err = connect_tls("not a host", 465, true, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Tls(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect_tls("127.0.0.1", port, true, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.is_network());
    }
}
