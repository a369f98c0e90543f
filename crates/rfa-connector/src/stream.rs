//! TCP stream acquisition
//!
//! Connects to the analyzer's TCP endpoint and feeds fixed-size read chunks
//! through the pipeline. The loop owns its socket per iteration; a
//! disconnect drops the connection and re-enters the connect state, a failed
//! connect backs off for a fixed delay. Only cancellation ends the loop.
//!
//! One read chunk is one payload. There is no reassembly buffer, so a
//! payload split across two reads parses as two incomplete fragments and is
//! dropped. Known limitation; the analyzer sends one report per write.

use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::Pipeline;

/// Fixed read chunk size, matching the analyzer's small report payloads.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Delay between reconnect attempts after a failed connect.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// TCP acquisition loop: Disconnected → Connecting → Streaming →
/// Disconnected, with cancellation reachable from every state.
pub struct StreamAcquisition {
    host: String,
    port: u16,
    pipeline: Pipeline,
}

impl StreamAcquisition {
    pub fn new(host: String, port: u16, pipeline: Pipeline) -> Self {
        Self {
            host,
            port,
            pipeline,
        }
    }

    /// Run until cancelled. Reconnects forever; connect failures back off
    /// for [`RECONNECT_DELAY`], stream ends reconnect immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let addr = format!("{}:{}", self.host, self.port);

        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = TcpStream::connect(&addr) => result,
            };

            match connected {
                Ok(stream) => {
                    info!(addr = %addr, "Connected to analyzer");
                    self.stream_until_disconnect(stream, &addr, &cancel).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                },
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Connection failed, retrying in 5 seconds");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(RECONNECT_DELAY) => {},
                    }
                },
            }
        }

        info!("TCP acquisition shut down");
    }

    /// Read chunks until the peer closes, an IO error occurs, or the token
    /// fires. Dropping the stream forcibly closes the socket, which is what
    /// unblocks a pending read on cancellation.
    async fn stream_until_disconnect(
        &self,
        mut stream: TcpStream,
        addr: &str,
        cancel: &CancellationToken,
    ) {
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return,
                result = stream.read(&mut buffer) => result,
            };

            match read {
                Ok(0) => {
                    info!(addr = %addr, "Analyzer closed the connection");
                    return;
                },
                Ok(n) => {
                    let payload = String::from_utf8_lossy(&buffer[..n]);
                    self.pipeline.process(&payload, addr).await;
                },
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Read failed, reconnecting");
                    return;
                },
            }
        }
    }
}
