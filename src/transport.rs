use std::io;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::utils::io::{read_frame_bytes, write_all};

/// Reliable ordered byte stream carrying one frame per direction per operation
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;

    async fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Block until one complete frame has arrived
    async fn receive(&mut self) -> io::Result<Vec<u8>>;

    async fn disconnect(&mut self);
}

#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport not connected"))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to {}:{}", host, port);
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        trace!("Sending {} bytes", bytes.len());
        write_all(self.stream()?, bytes).await
    }

    async fn receive(&mut self) -> io::Result<Vec<u8>> {
        let bytes = read_frame_bytes(self.stream()?).await?;
        trace!("Received {} bytes", bytes.len());
        Ok(bytes)
    }

    async fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("Disconnected");
        }
    }
}
