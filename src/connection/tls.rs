use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::config::TlsConfig;
use crate::error::{Error, Result};

/// Builds the rustls client configuration for `tls`.
pub fn client_config(tls: &TlsConfig) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider)).with_safe_default_protocol_versions()?;

    let builder = if tls.verify {
        builder.with_root_certificates(root_store(tls)?)
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
    };

    let config = match (&tls.client_cert_file, &tls.client_key_file) {
        (Some(cert), Some(key)) => builder.with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)?,
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(Error::Config(
                "client certificate and key must be configured together".to_string(),
            ));
        }
    };
    Ok(Arc::new(config))
}

/// Name sent for SNI and checked against the certificate. rustls omits SNI for IP addresses.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_string()).map_err(|e| Error::Tls(format!("invalid server name {host:?}: {e}")))
}

fn root_store(tls: &TlsConfig) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let custom = if let Some(pem) = &tls.ca_pem {
        Some(parse_certs(&mut pem.as_slice(), "inline CA")?)
    } else if let Some(path) = &tls.ca_file {
        Some(load_certs(path)?)
    } else {
        None
    };

    match custom {
        Some(certs) => {
            let (added, ignored) = roots.add_parsable_certificates(certs);
            if added == 0 {
                return Err(Error::Tls(format!("no usable CA certificates ({ignored} rejected)")));
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("failed to open certificate file {}: {e}", path.display())))?;
    parse_certs(&mut BufReader::new(file), &path.display().to_string())
}

fn parse_certs(reader: &mut dyn BufRead, origin: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("failed to parse certificates from {origin}: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!("no certificates found in {origin}")));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file =
        File::open(path).map_err(|e| Error::Tls(format!("failed to open key file {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| Error::Tls(format!("failed to parse key file {}: {e}", path.display())))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}

/// Accepts any server certificate. Handshake signatures are still checked.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_names() {
        assert!(matches!(server_name("db.example.com").unwrap(), ServerName::DnsName(_)));
        assert!(matches!(server_name("10.0.0.1").unwrap(), ServerName::IpAddress(_)));
        assert!(matches!(server_name("[::1]").unwrap(), ServerName::IpAddress(_)));
    }

    #[test]
    fn default_config_uses_web_roots() {
        client_config(&TlsConfig::default()).unwrap();
    }

    #[test]
    fn unverified_config_builds() {
        let tls = TlsConfig {
            verify: false,
            ..TlsConfig::default()
        };
        client_config(&tls).unwrap();
    }

    #[test]
    fn half_configured_client_auth_is_rejected() {
        let tls = TlsConfig {
            client_cert_file: Some("cert.pem".into()),
            ..TlsConfig::default()
        };
        assert!(matches!(client_config(&tls), Err(Error::Config(_))));
    }

    #[test]
    fn garbage_ca_pem_is_rejected() {
        let tls = TlsConfig {
            ca_pem: Some(b"not a certificate".to_vec()),
            ..TlsConfig::default()
        };
        assert!(matches!(client_config(&tls), Err(Error::Tls(_))));
    }
}
