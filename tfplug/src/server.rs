//! Server module for running Terraform providers
//!
//! Terraform starts the plugin binary, checks the handshake line printed on
//! stdout and then talks gRPC to the advertised address.

use crate::error::{Result, TfplugError};
use crate::grpc::ProviderService;
use crate::proto::ProviderServer;
use crate::provider::Provider;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use std::path::PathBuf;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tracing::{info, warn};

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";
pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_VERSION: u32 = 6;

/// Server configuration for running a Terraform provider
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PEM certificate served to Terraform, plaintext when unset
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    /// PEM certificate Terraform presents (go-plugin AutoMTLS)
    pub client_cert: Option<String>,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Refuse to start without the magic cookie
    pub require_magic_cookie: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            client_cert: None,
            max_message_size: 256 << 20,
            require_magic_cookie: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads TF_PLUGIN_TLS_CERT, TF_PLUGIN_TLS_KEY and PLUGIN_CLIENT_CERT
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            cert_path: non_empty("TF_PLUGIN_TLS_CERT").map(PathBuf::from),
            key_path: non_empty("TF_PLUGIN_TLS_KEY").map(PathBuf::from),
            client_cert: non_empty("PLUGIN_CLIENT_CERT"),
            ..Self::default()
        }
    }

    pub fn with_tls(mut self, cert_path: PathBuf, key_path: PathBuf) -> Self {
        self.cert_path = Some(cert_path);
        self.key_path = Some(key_path);
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn without_magic_cookie(mut self) -> Self {
        self.require_magic_cookie = false;
        self
    }
}

/// Fails unless Terraform launched the binary
pub fn check_magic_cookie() -> Result<()> {
    match std::env::var(MAGIC_COOKIE_KEY) {
        Ok(value) if value == MAGIC_COOKIE_VALUE => Ok(()),
        _ => Err(TfplugError::HandshakeError(
            "This binary is a plugin. These are not meant to be executed directly. \
             Please execute the program that consumes these plugins, which will \
             load any plugins automatically"
                .to_string(),
        )),
    }
}

/// The line Terraform parses from stdout: core version, protocol version,
/// network, address, protocol and optionally the server certificate.
pub fn handshake_line(addr: &std::net::SocketAddr, cert_der: Option<&[u8]>) -> String {
    let mut line = format!(
        "{}|{}|tcp|{}|grpc",
        CORE_PROTOCOL_VERSION, PROTOCOL_VERSION, addr
    );
    if let Some(der) = cert_der {
        line.push('|');
        line.push_str(&STANDARD_NO_PAD.encode(der));
    }
    line
}

/// Extracts the DER bytes of the first certificate in a PEM document
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let body: String = pem
        .lines()
        .skip_while(|line| !line.starts_with("-----BEGIN"))
        .skip(1)
        .take_while(|line| !line.starts_with("-----END"))
        .map(str::trim)
        .collect();
    if body.is_empty() {
        return Err(TfplugError::TlsError("no PEM block found".to_string()));
    }
    STANDARD
        .decode(body)
        .map_err(|e| TfplugError::TlsError(format!("invalid PEM body: {}", e)))
}

struct Tls {
    config: ServerTlsConfig,
    cert_der: Vec<u8>,
}

async fn load_tls(config: &ServerConfig) -> Result<Option<Tls>> {
    let (cert_path, key_path) = match (&config.cert_path, &config.key_path) {
        (Some(cert), Some(key)) => (cert, key),
        (None, None) => return Ok(None),
        _ => {
            return Err(TfplugError::TlsError(
                "both a certificate and a key are required for TLS".to_string(),
            ))
        }
    };

    let cert = tokio::fs::read_to_string(cert_path)
        .await
        .map_err(|e| TfplugError::TlsError(format!("Failed to read certificate: {}", e)))?;
    let key = tokio::fs::read(key_path)
        .await
        .map_err(|e| TfplugError::TlsError(format!("Failed to read key: {}", e)))?;

    let cert_der = pem_to_der(&cert)?;
    let mut tls = ServerTlsConfig::new().identity(Identity::from_pem(cert.into_bytes(), key));
    if let Some(client_cert) = &config.client_cert {
        tls = tls.client_ca_root(Certificate::from_pem(client_cert.as_bytes()));
    }

    Ok(Some(Tls {
        config: tls,
        cert_der,
    }))
}

/// Main entry point for running a provider
pub async fn serve<P: Provider + 'static>(provider: P, config: ServerConfig) -> Result<()> {
    if config.require_magic_cookie {
        check_magic_cookie()?;
    }

    // another component may already have installed a provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let service = ProviderServer::new(ProviderService::new(provider))
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    let tls = load_tls(&config).await?;
    let mut builder = Server::builder();
    let cert_der = match tls {
        Some(tls) => {
            builder = builder
                .tls_config(tls.config)
                .map_err(|e| TfplugError::TlsError(e.to_string()))?;
            Some(tls.cert_der)
        }
        None => {
            warn!("serving without TLS");
            None
        }
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    info!(%addr, "provider listening");

    println!("{}", handshake_line(&addr, cert_der.as_deref()));

    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    builder
        .add_service(service)
        .serve_with_incoming(incoming)
        .await?;

    Ok(())
}

/// Runs a provider configured from the environment
pub async fn serve_default<P: Provider + 'static>(provider: P) -> Result<()> {
    serve(provider, ServerConfig::from_env()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn handshake_without_certificate() {
        let addr: std::net::SocketAddr = "127.0.0.1:4321".parse().unwrap();
        assert_eq!(handshake_line(&addr, None), "1|6|tcp|127.0.0.1:4321|grpc");
    }

    #[test]
    fn handshake_appends_unpadded_certificate() {
        let addr: std::net::SocketAddr = "127.0.0.1:4321".parse().unwrap();
        let line = handshake_line(&addr, Some(&[1, 2, 3, 4]));
        assert_eq!(line, "1|6|tcp|127.0.0.1:4321|grpc|AQIDBA");
    }

    #[test]
    fn pem_body_is_decoded() {
        let pem = "-----BEGIN CERTIFICATE-----\nAQID\nBA==\n-----END CERTIFICATE-----\n";
        assert_eq!(pem_to_der(pem).unwrap(), vec![1, 2, 3, 4]);
        assert!(pem_to_der("garbage").is_err());
    }

    #[test]
    #[serial]
    fn magic_cookie_is_required() {
        std::env::remove_var(MAGIC_COOKIE_KEY);
        assert!(check_magic_cookie().is_err());

        std::env::set_var(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE);
        assert!(check_magic_cookie().is_ok());
        std::env::remove_var(MAGIC_COOKIE_KEY);
    }

    #[test]
    #[serial]
    fn tls_paths_come_from_env() {
        std::env::set_var("TF_PLUGIN_TLS_CERT", "/tmp/cert.pem");
        std::env::set_var("TF_PLUGIN_TLS_KEY", "");
        let config = ServerConfig::from_env();
        assert_eq!(config.cert_path, Some(PathBuf::from("/tmp/cert.pem")));
        assert_eq!(config.key_path, None);
        std::env::remove_var("TF_PLUGIN_TLS_CERT");
        std::env::remove_var("TF_PLUGIN_TLS_KEY");
    }

    #[tokio::test]
    async fn partial_tls_config_is_rejected() {
        let config = ServerConfig {
            cert_path: Some(PathBuf::from("/tmp/cert.pem")),
            ..ServerConfig::default()
        };
        assert!(load_tls(&config).await.is_err());
    }
}
