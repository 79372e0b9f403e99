//! TLS utilities for the proxy: a no-op client verifier for the Executor's
//! `verify_tls = false` path, and building a per-connection `ServerConfig`
//! from a freshly minted leaf certificate (component C6, fed by C5's
//! `CaMint`). `NoVerifier` is kept directly from the teacher's
//! `proxy/tls.rs`; the teacher's static cert/key-file loader had no
//! counterpart here (Currier's proxy listener is always plain HTTP, TLS only
//! ever appears on intercepted tunnels) and was dropped in the trim pass.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::DigitallySignedStruct;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// No-op certificate verifier, used only when a request explicitly opts out
/// of TLS verification (`RequestDefinition`/CLI `--insecure`).
#[derive(Debug)]
pub struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
        ]
    }
}

/// A `rustls::ClientConfig` that accepts any server certificate, used by the
/// Request Executor when a `RequestDefinition` sets `verify_tls = false`.
pub fn dangerous_client_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth()
}

/// Build a one-shot `TlsAcceptor` for a single intercepted `CONNECT` tunnel
/// from a freshly minted leaf certificate, its chain up to the Currier root
/// CA, and the leaf's private key.
pub fn acceptor_for_leaf(
    leaf_chain: Vec<CertificateDer<'static>>,
    leaf_key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor, rustls::Error> {
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(leaf_chain, leaf_key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
