//! Transport abstraction and address handling.

use crate::error::ClientError;
use futures::future::{BoxFuture, FutureExt};
use mongowire_protocol::DEFAULT_PORT;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A bidirectional byte stream a Connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// An owned, type-erased transport.
pub type BoxedStream = Box<dyn Transport>;

/// Opens transports to server addresses.
pub trait Dialer: Send + Sync {
    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>>;
}

/// Dials plain TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Dialer for TcpDialer {
    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
        async move {
            tracing::debug!("Dialing {}...", address);
            let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", address),
                    )
                })??;
            stream.set_nodelay(true).ok();
            Ok(Box::new(stream) as BoxedStream)
        }
        .boxed()
    }
}

/// Appends the default port to an address that has none.
///
/// IPv6 literals must be bracketed, so `[::1]` gets a port and `[::1]:27018`
/// keeps its own. An explicit port must fit in a `u16`.
pub fn normalize_address(address: &str) -> Result<String, ClientError> {
    let address = address.trim();
    let invalid = || ClientError::InvalidAddress(address.to_string());

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let close = rest.find(']').ok_or_else(invalid)?;
        let host = &address[..close + 2];
        match &rest[close + 1..] {
            "" => (host, None),
            tail => (host, Some(tail.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match address.split_once(':') {
            Some((_, port)) if port.contains(':') => return Err(invalid()),
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        }
    };

    if host.is_empty() || host == "[]" {
        return Err(invalid());
    }
    match port {
        None => Ok(format!("{}:{}", host, DEFAULT_PORT)),
        Some(port) => {
            port.parse::<u16>().map_err(|_| invalid())?;
            Ok(address.to_string())
        }
    }
}
