//! TLS connector contract and rustls implementation.
//!
//! Trimmed to the stylesheet-fetch use case: WebPKI roots only, HTTP/1.1
//! ALPN, server certificates always verified.

use crate::transport::BoxedIoStream;
use pw_core::WeaveError;
use pw_core::WeaveResult;
use std::net::TcpStream;

/// Contract for upgrading a TCP connection to TLS.
pub trait TlsConnector {
    fn connect_tls(&self, stream: TcpStream, server_name: &str) -> WeaveResult<BoxedIoStream>;
}

/// rustls-backed connector using the embedded Mozilla/WebPKI roots.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustlsConnector;

#[cfg(feature = "tls-rustls")]
impl TlsConnector for RustlsConnector {
    fn connect_tls(&self, mut stream: TcpStream, server_name: &str) -> WeaveResult<BoxedIoStream> {
        use rustls::ClientConfig;
        use rustls::ClientConnection;
        use rustls::RootCertStore;
        use rustls::StreamOwned;
        use rustls::pki_types::ServerName;
        use std::sync::Arc;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        let name = ServerName::try_from(server_name.to_owned()).map_err(|error| {
            WeaveError::new(
                "net.tls.server_name_invalid",
                format!("invalid TLS server name `{server_name}`: {error}"),
            )
        })?;

        let mut connection = ClientConnection::new(Arc::new(config), name).map_err(|error| {
            WeaveError::new(
                "net.tls.connection_init_failed",
                format!("failed to initialize TLS connection for `{server_name}`: {error}"),
            )
        })?;

        connection.complete_io(&mut stream).map_err(|error| {
            WeaveError::new(
                "net.tls.handshake_failed",
                format!("TLS handshake failed for `{server_name}`: {error}"),
            )
        })?;

        Ok(Box::new(StreamOwned::new(connection, stream)))
    }
}

#[cfg(not(feature = "tls-rustls"))]
impl TlsConnector for RustlsConnector {
    fn connect_tls(&self, _stream: TcpStream, _server_name: &str) -> WeaveResult<BoxedIoStream> {
        Err(WeaveError::new(
            "net.tls.backend_unavailable",
            "rustls backend is disabled for this build; enable `pw-net/tls-rustls`",
        ))
    }
}
