//! Multipart MJPEG delivery to an unbounded set of HTTP clients
//!
//! One task per accepted connection. Sessions are fully independent:
//! each blocks only on its own socket writes and on the frame slot, so a
//! stalled client never delays the producer or any other session. The
//! listener outlives preview mode; while no stream is active it answers
//! the stream path with a plain "stream not active" response.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::stream::slot::{FrameSlot, StreamEnded};

/// Path serving the MJPEG stream
pub const STREAM_PATH: &str = "/stream.mjpg";

const STREAM_HEADERS: &[u8] = b"HTTP/1.1 200 OK\r\n\
Age: 0\r\n\
Cache-Control: no-cache, private\r\n\
Pragma: no-cache\r\n\
Content-Type: multipart/x-mixed-replace; boundary=FRAME\r\n\r\n";

const NOT_ACTIVE_RESPONSE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
Content-Type: text/plain\r\n\
Content-Length: 17\r\n\r\n\
stream not active";

const NOT_FOUND_RESPONSE: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";

const MAX_HEADER_LINES: usize = 100;

/// Budget for a client to deliver its request line and headers
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP listener owning the accept loop
pub struct StreamServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl StreamServer {
    /// Bind with address reuse so a restarted service can rebind the
    /// port immediately.
    pub async fn bind(addr: SocketAddr, slot: FrameSlot) -> io::Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(64)?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(listener, slot, shutdown_rx));

        info!(%local_addr, "stream listener bound");
        Ok(Self {
            local_addr,
            shutdown,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Sessions already streaming end
    /// through the slot's stream-ended signal, not here.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, slot: FrameSlot, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let slot = slot.clone();
                    tokio::spawn(async move {
                        match serve_client(stream, slot).await {
                            Ok(()) => debug!(%peer, "streaming client closed"),
                            Err(e) => info!(%peer, error = %e, "removed streaming client"),
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }
    debug!("stream listener stopped");
}

async fn serve_client(stream: TcpStream, slot: FrameSlot) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();

    // A peer that never finishes its request must not park the session;
    // only the frame wait itself is allowed to block indefinitely.
    let path = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_path(read_half))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request read timed out"))??;

    match path.as_deref() {
        Some(STREAM_PATH) if slot.is_open() => stream_frames(&mut write_half, &slot).await,
        Some(STREAM_PATH) => write_half.write_all(NOT_ACTIVE_RESPONSE).await,
        _ => write_half.write_all(NOT_FOUND_RESPONSE).await,
    }
}

async fn read_request_path(read_half: OwnedReadHalf) -> io::Result<Option<String>> {
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let path = request_line.split_whitespace().nth(1).map(str::to_owned);

    // Drain request headers up to the blank line
    let mut line = String::new();
    for _ in 0..MAX_HEADER_LINES {
        line.clear();
        if reader.read_line(&mut line).await? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    Ok(path)
}

async fn stream_frames(writer: &mut OwnedWriteHalf, slot: &FrameSlot) -> io::Result<()> {
    writer.write_all(STREAM_HEADERS).await?;

    let mut rx = slot.subscribe();
    let mut last_seen = None;
    loop {
        let frame = match rx.next_frame(last_seen).await {
            Ok(frame) => frame,
            Err(StreamEnded) => break,
        };
        let part_header = format!(
            "--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.data.len()
        );
        writer.write_all(part_header.as_bytes()).await?;
        writer.write_all(&frame.data).await?;
        writer.write_all(b"\r\n").await?;
        last_seen = Some(frame.sequence);
    }
    Ok(())
}
