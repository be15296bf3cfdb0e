//! Per-call TLS client configuration.
//!
//! Every fetch builds its own rustls `ClientConfig` from the transport
//! defaults plus the request's TLS fields (custom CA bundle, client identity,
//! insecure mode). Native root certificates are loaded once per process.

use crate::config::TlsRootConfig;
use crate::error::HttpError;
use hyper_rustls::ConfigBuilderExt;
use rustls::client::WantsClientCert;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{ClientConfig, ConfigBuilder, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::sync::{Arc, OnceLock};

/// Cached native root certificates.
/// Always stores Ok; empty vec means no certs found (warned, not errored).
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

/// Counter for test verification that the loader only runs once.
#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }

    result.certs
}

/// Native root certificates, loaded lazily on first use.
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// The globally installed crypto provider, or aws-lc-rs without installing it.
pub fn get_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// TLS fields of one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsOptions<'a> {
    pub insecure: bool,
    pub ca_cert_pem: Option<&'a str>,
    pub client_identity: Option<(&'a str, &'a str)>,
}

fn tls_error(msg: impl Into<String>) -> HttpError {
    let msg: String = msg.into();
    HttpError::Tls(msg.into())
}

/// Parse a PEM bundle into a root store.
///
/// Non-certificate sections are skipped. Fails when not a single
/// certificate could be added.
///
/// # Errors
/// Returns `HttpError::Tls` when the bundle yields no usable certificate.
pub fn parse_ca_bundle(pem: &str) -> Result<RootCertStore, HttpError> {
    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(pem.as_bytes())
        .filter_map(Result::ok)
        .collect();

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs);
    if ignored > 0 {
        tracing::warn!(added, ignored, "some CA certificates could not be parsed");
    }
    if added == 0 {
        return Err(tls_error(
            "can't add the CA certificate to certificate pool; only PEM encoded certificates are supported",
        ));
    }
    Ok(store)
}

/// Parse a PEM certificate chain and private key.
///
/// # Errors
/// Returns `HttpError::Tls` when either half is missing or malformed.
pub fn parse_client_identity(
    cert_pem: &str,
    key_pem: &str,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), HttpError> {
    let chain = CertificateDer::pem_slice_iter(cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("invalid client certificate PEM: {e}")))?;
    if chain.is_empty() {
        return Err(tls_error("no certificate found in client_cert_pem"));
    }

    let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes())
        .map_err(|e| tls_error(format!("invalid client key PEM: {e}")))?;

    Ok((chain, key))
}

/// Build the rustls client configuration for one fetch.
///
/// Precedence for server verification: `insecure`, then the request's CA
/// bundle, then the default root store. The CA bundle is parsed even in
/// insecure mode so malformed input is always reported.
///
/// # Errors
/// Returns `HttpError::Tls` for malformed CA or identity material, or when
/// native roots are requested and none are available.
pub fn build_client_config(
    roots: TlsRootConfig,
    opts: &TlsOptions<'_>,
) -> Result<ClientConfig, HttpError> {
    let provider = get_crypto_provider();

    let custom_roots = opts.ca_cert_pem.map(parse_ca_bundle).transpose()?;
    let identity = opts
        .client_identity
        .map(|(cert, key)| parse_client_identity(cert, key))
        .transpose()?;

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?;

    let builder: ConfigBuilder<ClientConfig, WantsClientCert> = if opts.insecure {
        tracing::debug!("server certificate verification disabled for this request");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification::new(provider)))
    } else if let Some(store) = custom_roots {
        builder.with_root_certificates(store)
    } else {
        match roots {
            TlsRootConfig::WebPki => builder.with_webpki_roots(),
            TlsRootConfig::Native => builder.with_root_certificates(native_root_store()?),
        }
    };

    match identity {
        Some((chain, key)) => builder
            .with_client_auth_cert(chain, key)
            .map_err(|e| HttpError::Tls(Box::new(e))),
        None => Ok(builder.with_no_client_auth()),
    }
}

fn native_root_store() -> Result<RootCertStore, HttpError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(tls_error(
            "no native root CA certificates found in OS certificate store",
        ));
    }

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(tls_error(format!(
            "no valid native root CA certificates parsed (found {}, all {ignored} failed to parse)",
            certs.len()
        )));
    }
    Ok(store)
}

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl NoVerification {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for NoVerification {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use rustls::client::ResolvesClientCert;
    use std::sync::atomic::Ordering;

    const CA_PEM: &str = include_str!("../tests/fixtures/ca.pem");
    const CLIENT_CERT_PEM: &str = include_str!("../tests/fixtures/client.pem");
    const CLIENT_KEY_PEM: &str = include_str!("../tests/fixtures/client.key");
    const OTHER_KEY_PEM: &str = include_str!("../tests/fixtures/other.key");

    /// The loader may already have run in another test, so only "at most once
    /// more" can be asserted.
    #[test]
    fn test_native_roots_cached() {
        let initial_count = LOAD_COUNT.load(Ordering::SeqCst);

        let result1 = native_root_certs();
        let result2 = native_root_certs();

        let final_count = LOAD_COUNT.load(Ordering::SeqCst);
        assert!(final_count <= initial_count + 1);
        assert!(std::ptr::eq(result1, result2), "should return same slice");
    }

    #[test]
    fn test_parse_ca_bundle_accepts_pem() {
        let store = parse_ca_bundle(CA_PEM).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_parse_ca_bundle_skips_other_sections() {
        let bundle = format!("{CLIENT_KEY_PEM}\n{CA_PEM}");
        let store = parse_ca_bundle(&bundle).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_parse_ca_bundle_rejects_garbage() {
        let err = parse_ca_bundle("definitely not a certificate").unwrap_err();
        assert!(matches!(err, HttpError::Tls(_)));
        assert!(err.to_string().contains("CA certificate"));
    }

    #[test]
    fn test_parse_client_identity() {
        let (chain, _key) = parse_client_identity(CLIENT_CERT_PEM, CLIENT_KEY_PEM).unwrap();
        assert_eq!(chain.len(), 1);

        assert!(parse_client_identity(CLIENT_CERT_PEM, "garbage").is_err());
        assert!(parse_client_identity("garbage", CLIENT_KEY_PEM).is_err());
    }

    #[test]
    fn test_build_client_config_variants() {
        let webpki = build_client_config(TlsRootConfig::WebPki, &TlsOptions::default());
        assert!(webpki.is_ok());

        let with_ca = build_client_config(
            TlsRootConfig::WebPki,
            &TlsOptions {
                ca_cert_pem: Some(CA_PEM),
                ..TlsOptions::default()
            },
        );
        assert!(with_ca.is_ok());

        let with_identity = build_client_config(
            TlsRootConfig::WebPki,
            &TlsOptions {
                client_identity: Some((CLIENT_CERT_PEM, CLIENT_KEY_PEM)),
                ..TlsOptions::default()
            },
        )
        .unwrap();
        assert!(with_identity.client_auth_cert_resolver.has_certs());

        let insecure = build_client_config(
            TlsRootConfig::WebPki,
            &TlsOptions {
                insecure: true,
                ..TlsOptions::default()
            },
        );
        assert!(insecure.is_ok());
    }

    #[test]
    fn test_mismatched_identity_rejected() {
        let result = build_client_config(
            TlsRootConfig::WebPki,
            &TlsOptions {
                client_identity: Some((CLIENT_CERT_PEM, OTHER_KEY_PEM)),
                ..TlsOptions::default()
            },
        );
        assert!(matches!(result, Err(HttpError::Tls(_))));
    }

    #[test]
    fn test_insecure_still_rejects_garbage_ca() {
        let result = build_client_config(
            TlsRootConfig::WebPki,
            &TlsOptions {
                insecure: true,
                ca_cert_pem: Some("garbage"),
                client_identity: None,
            },
        );
        assert!(matches!(result, Err(HttpError::Tls(_))));
    }
}
