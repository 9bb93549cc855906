//! The pluggable transport underlying the wire protocol (§6).
//!
//! The distilled spec treats the reliable message-transport library (a
//! DEALER/ROUTER-style multiplexer) as an external collaborator out of
//! scope for this crate. This module provides one concrete, default
//! implementation — plain TCP with a 4-byte length prefix per frame — behind
//! a small trait, so a caller may substitute their own transport without
//! touching the server or client actors.

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    NotBound,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "transport error: {e}"),
            Error::NotBound => write!(f, "accept called before bind"),
        }
    }
}

impl std::error::Error for Error {}

/// A reliable, ordered, connection-oriented transport: something that can
/// both listen for peers and dial out to one.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn bind(&self, endpoint: &str) -> Result<std::net::SocketAddr, Error>;
    async fn accept(&self) -> Result<(TcpStream, String), Error>;
    async fn connect(&self, endpoint: &str) -> Result<TcpStream, Error>;
}

/// Default transport: one TCP stream per peer.
pub struct TcpTransport {
    listener: Mutex<Option<TcpListener>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self { listener: Mutex::new(None) }
    }

    pub async fn bind_and_report(&self, endpoint: &str) -> Result<std::net::SocketAddr, Error> {
        let listener = TcpListener::bind(endpoint).await?;
        let addr = listener.local_addr()?;
        *self.listener.lock().await = Some(listener);
        Ok(addr)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn bind(&self, endpoint: &str) -> Result<std::net::SocketAddr, Error> {
        self.bind_and_report(endpoint).await
    }

    async fn accept(&self) -> Result<(TcpStream, String), Error> {
        let guard = self.listener.lock().await;
        let listener = guard.as_ref().ok_or(Error::NotBound)?;
        let (stream, addr) = listener.accept().await?;
        Ok((stream, addr.to_string()))
    }

    async fn connect(&self, endpoint: &str) -> Result<TcpStream, Error> {
        Ok(TcpStream::connect(endpoint).await?)
    }
}
