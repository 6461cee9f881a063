// rustls client configuration shared by WSS and TCP+TLS links.
//
// The ring provider is passed explicitly rather than installed as the
// process default, so embedding hosts keep control of the global.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::error::Error;
use crate::transport::TlsMode;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a client config for the given verification mode.
pub fn client_config(mode: &TlsMode) -> Result<Arc<ClientConfig>, Error> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::TlsConfig(format!("unsupported protocol versions: {e}")))?;

    let config = match mode {
        TlsMode::System => {
            let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsMode::CustomCa(path) => {
            let mut roots = RootCertStore::empty();
            let certs = CertificateDer::pem_file_iter(path)
                .map_err(|e| {
                    Error::TlsConfig(format!("failed to read CA cert {}: {e}", path.display()))
                })?;
            for cert in certs {
                let cert = cert.map_err(|e| Error::TlsConfig(format!("invalid CA cert: {e}")))?;
                roots
                    .add(cert)
                    .map_err(|e| Error::TlsConfig(format!("rejected CA cert: {e}")))?;
            }
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsMode::DangerAcceptInvalid => {
            tracing::debug!("TLS: certificate verification disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider())))
                .with_no_client_auth()
        }
    };

    Ok(Arc::new(config))
}

/// SNI / verification name for a host string.
pub fn server_name(host: &str) -> Result<ServerName<'static>, Error> {
    ServerName::try_from(host.to_owned())
        .map_err(|e| Error::TlsConfig(format!("invalid server name {host:?}: {e}")))
}

#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn system_and_insecure_configs_build() {
        assert!(client_config(&TlsMode::System).is_ok());
        assert!(client_config(&TlsMode::DangerAcceptInvalid).is_ok());
    }

    #[test]
    fn missing_ca_file_is_a_permanent_tls_error() {
        let mode = TlsMode::CustomCa("/nonexistent/localpush-ca.pem".into());
        let err = client_config(&mode).unwrap_err();
        assert!(matches!(err, Error::TlsConfig(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn server_names() {
        assert!(server_name("relay.example.com").is_ok());
        assert!(server_name("192.168.1.10").is_ok());
        assert!(server_name("bad host name").is_err());
    }
}
