//! INSTREAM client for the external content-scanning daemon.
//!
//! Wire format: `zINSTREAM\0`, then per chunk a 4-byte big-endian length
//! followed by the bytes, then a zero-length frame. The daemon answers with a
//! single textual report; the literal token `FOUND` marks an infection.

#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::{debug, error, info, warn};

use gatescan_protocol::defaults;
use gatescan_state::provider::DataProvider;
use gatescan_state::StoreError;

const INSTREAM_COMMAND: &[u8] = b"zINSTREAM\0";
const RELOAD_COMMAND: &[u8] = b"zRELOAD\0";
const PING_COMMAND: &[u8] = b"zPING\0";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unsupported engine URL: {0}")]
    BadUrl(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Verdict of one scan call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanVerdict {
    pub is_virus: bool,
    /// Raw daemon report when infected, empty when clean.
    pub report: String,
    pub bytes_scanned: u64,
}

#[derive(Debug, Clone)]
enum EngineTarget {
    Tcp(String),
    #[cfg(unix)]
    Unix(PathBuf),
}

trait EngineStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> EngineStream for T {}

/// Client for one engine daemon endpoint.
#[derive(Debug, Clone)]
pub struct EngineClient {
    target: EngineTarget,
    io_deadline: Duration,
}

impl EngineClient {
    /// Parse `tcp://host:port` or `unix:///path/to/socket`.
    pub fn new(clamd_url: &str) -> Result<Self, EngineError> {
        let target = if let Some(rest) = clamd_url.strip_prefix("tcp://") {
            let addr = rest.trim_end_matches('/');
            if addr.is_empty() {
                return Err(EngineError::BadUrl(clamd_url.to_string()));
            }
            let addr = if addr.contains(':') {
                addr.to_string()
            } else {
                format!("{addr}:3310")
            };
            EngineTarget::Tcp(addr)
        } else if let Some(path) = clamd_url.strip_prefix("unix://") {
            #[cfg(unix)]
            {
                if path.is_empty() {
                    return Err(EngineError::BadUrl(clamd_url.to_string()));
                }
                EngineTarget::Unix(PathBuf::from(path))
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                return Err(EngineError::BadUrl(clamd_url.to_string()));
            }
        } else {
            return Err(EngineError::BadUrl(clamd_url.to_string()));
        };
        Ok(Self {
            target,
            io_deadline: Duration::from_secs(defaults::ENGINE_DEADLINE_SECS),
        })
    }

    async fn connect(&self) -> Result<Box<dyn EngineStream>, EngineError> {
        match &self.target {
            EngineTarget::Tcp(addr) => {
                let stream = self.io(TcpStream::connect(addr)).await??;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            EngineTarget::Unix(path) => {
                let stream = self.io(UnixStream::connect(path)).await??;
                Ok(Box::new(stream))
            }
        }
    }

    /// Bound one socket operation by the per-call deadline.
    async fn io<F: std::future::Future>(&self, fut: F) -> Result<F::Output, EngineError> {
        tokio::time::timeout(self.io_deadline, fut)
            .await
            .map_err(|_| EngineError::Timeout(self.io_deadline))
    }

    /// Stream every chunk of the provider through the daemon.
    ///
    /// The provider is always finalized, on success and on failure alike, so
    /// the verified replay is settled no matter how the socket behaves.
    pub async fn scan(
        &self,
        provider: &mut dyn DataProvider,
    ) -> Result<ScanVerdict, EngineError> {
        let mut sock = self.connect().await?;
        let mut bytes_scanned = 0u64;

        let streamed: Result<String, EngineError> = async {
            self.io(sock.write_all(INSTREAM_COMMAND)).await??;
            while let Some(chunk) = provider.next_chunk().await? {
                let mut frame = Vec::with_capacity(4 + chunk.len());
                WriteBytesExt::write_u32::<BigEndian>(&mut frame, chunk.len() as u32)?;
                frame.extend_from_slice(&chunk);
                self.io(sock.write_all(&frame)).await??;
                bytes_scanned += chunk.len() as u64;
            }
            self.io(sock.write_all(&[0u8; 4])).await??;

            let mut buf = vec![0u8; 4096];
            let n = self.io(sock.read(&mut buf)).await??;
            Ok(String::from_utf8_lossy(&buf[..n])
                .trim_matches('\0')
                .trim()
                .to_string())
        }
        .await;

        let scan_success = streamed.is_ok();
        let is_virus = match &streamed {
            Ok(reply) => reply.contains("FOUND"),
            Err(_) => false,
        };
        if let Err(err) = provider.finalize(scan_success, is_virus).await {
            warn!("provider finalize failed: {err}");
        }
        let _ = self.io(sock.shutdown()).await;

        let reply = streamed?;
        debug!("engine reply: {reply:?} ({bytes_scanned} bytes)");
        Ok(ScanVerdict {
            is_virus,
            report: if is_virus { reply } else { String::new() },
            bytes_scanned,
        })
    }

    /// Ask the daemon to re-read its signature definitions.
    pub async fn reload(&self) -> Result<(), EngineError> {
        let mut sock = self.connect().await?;
        self.io(sock.write_all(RELOAD_COMMAND)).await??;
        let mut buf = vec![0u8; 256];
        let n = self.io(sock.read(&mut buf)).await??;
        info!(
            "engine reload acknowledged: {}",
            String::from_utf8_lossy(&buf[..n]).trim()
        );
        Ok(())
    }

    pub async fn ping(&self) -> Result<bool, EngineError> {
        let mut sock = self.connect().await?;
        self.io(sock.write_all(PING_COMMAND)).await??;
        let mut buf = vec![0u8; 64];
        let n = self.io(sock.read(&mut buf)).await??;
        Ok(String::from_utf8_lossy(&buf[..n]).trim_matches('\0').trim() == "PONG")
    }

    /// Poll readiness after a reload, up to the given budget.
    pub async fn wait_ready(&self, budget: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            match self.ping().await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => debug!("engine not ready yet: {err}"),
            }
            if tokio::time::Instant::now() >= deadline {
                error!("engine did not become ready within {budget:?}");
                return false;
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_urls() {
        let client = EngineClient::new("tcp://127.0.0.1:3310").unwrap();
        assert!(matches!(client.target, EngineTarget::Tcp(ref addr) if addr == "127.0.0.1:3310"));
    }

    #[test]
    fn tcp_urls_default_the_port() {
        let client = EngineClient::new("tcp://scanner.internal").unwrap();
        assert!(
            matches!(client.target, EngineTarget::Tcp(ref addr) if addr == "scanner.internal:3310")
        );
    }

    #[cfg(unix)]
    #[test]
    fn parses_unix_urls() {
        let client = EngineClient::new("unix:///run/clamd.sock").unwrap();
        assert!(
            matches!(client.target, EngineTarget::Unix(ref path) if path == &PathBuf::from("/run/clamd.sock"))
        );
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert!(matches!(
            EngineClient::new("http://nope"),
            Err(EngineError::BadUrl(_))
        ));
    }
}
