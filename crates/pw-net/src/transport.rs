//! Transport contracts and default TCP implementation.

use pw_core::WeaveError;
use pw_core::WeaveResult;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::time::Duration;

/// Trait-object-safe stream returned by the TLS connector.
pub trait IoStream: Read + Write {}
impl<T> IoStream for T where T: Read + Write {}

pub type BoxedIoStream = Box<dyn IoStream>;

/// Low-level transport abstraction for opening TCP connections.
pub trait Transport {
    fn connect(&self, address: SocketAddr, timeout: Duration) -> WeaveResult<TcpStream>;
}

/// Standard library TCP transport with read/write timeouts applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn connect(&self, address: SocketAddr, timeout: Duration) -> WeaveResult<TcpStream> {
        let stream = TcpStream::connect_timeout(&address, timeout).map_err(|error| {
            WeaveError::new(
                "net.transport.connect_failed",
                format!("failed to connect to `{address}`: {error}"),
            )
        })?;

        stream.set_nodelay(true).map_err(|error| {
            WeaveError::new(
                "net.transport.nodelay_failed",
                format!("failed to enable TCP_NODELAY for `{address}`: {error}"),
            )
        })?;

        stream.set_read_timeout(Some(timeout)).map_err(|error| {
            WeaveError::new(
                "net.transport.read_timeout_failed",
                format!("failed to set read timeout for `{address}`: {error}"),
            )
        })?;

        stream.set_write_timeout(Some(timeout)).map_err(|error| {
            WeaveError::new(
                "net.transport.write_timeout_failed",
                format!("failed to set write timeout for `{address}`: {error}"),
            )
        })?;

        Ok(stream)
    }
}

/// Tries each resolved address in order, returning the first connection
/// that succeeds.
pub fn connect_first_available<T: Transport>(
    transport: &T,
    addresses: &[SocketAddr],
    timeout: Duration,
) -> WeaveResult<TcpStream> {
    let mut last_error: Option<WeaveError> = None;

    for address in addresses {
        match transport.connect(*address, timeout) {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(error) => Err(error),
        None => Err(WeaveError::new(
            "net.transport.no_addresses",
            "no addresses available to open a connection",
        )),
    }
}
