//! Socket tasks
//!
//! A connection is split into a reader task that decodes frames into a
//! bounded channel and a writer task that drains an unbounded queue of
//! encoded frames onto the socket. Sends never wait on the socket.

use crate::comms::frame::{Frame, LENGTH_PREFIX};
use crate::core::config::NetworkConfig;
use crate::core::error::{Error, FramingError, NetworkError, Result};
use crate::system::metrics;
use bytes::Bytes;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// How long `close` waits for queued frames to reach the socket
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Read one frame body from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream between frames. A stream that
/// ends inside a frame is a framing error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX];
    let mut filled = 0;
    while filled < LENGTH_PREFIX {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FramingError::Truncated {
                declared: LENGTH_PREFIX,
                available: filled,
            }
            .into());
        }
        filled += n;
    }

    let declared = u16::from_le_bytes(prefix) as usize;
    let mut body = vec![0u8; declared];
    let mut filled = 0;
    while filled < declared {
        let n = reader.read(&mut body[filled..]).await?;
        if n == 0 {
            return Err(FramingError::Truncated {
                declared,
                available: filled,
            }
            .into());
        }
        filled += n;
    }
    Ok(Some(Bytes::from(body)))
}

/// Queues encoded frames for the writer task
pub struct FrameSender<F> {
    tx: mpsc::UnboundedSender<Bytes>,
    _frame: PhantomData<fn(F)>,
}

impl<F> Clone for FrameSender<F> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _frame: PhantomData,
        }
    }
}

impl<F: Frame> FrameSender<F> {
    /// Encode and queue a message. Does not wait for the write.
    pub fn send(&self, message: &F) -> Result<()> {
        let frame = message.to_frame()?;
        trace!(msg_type = message.msg_type(), len = frame.len(), "queue frame");
        self.tx
            .send(frame)
            .map_err(|_| Error::Network(NetworkError::Closed))?;
        metrics::record(|m| m.frames_sent.inc());
        Ok(())
    }

    /// Whether the writer task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A running connection: decoded inbound frames plus an outbound queue
pub struct Connection<F: Frame> {
    /// Inbound frames in arrival order; closes after end of stream or the
    /// first fatal error, which is delivered as the last item
    pub frames: mpsc::Receiver<Result<F>>,
    /// Outbound queue
    pub sender: FrameSender<F>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl<F: Frame> Connection<F> {
    /// Stop reading, flush what is queued, and shut the socket down
    pub async fn close(self) {
        let Connection {
            frames,
            sender,
            reader,
            writer,
        } = self;
        reader.abort();
        drop(frames);
        drop(sender);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
            debug!("writer did not drain before close");
        }
    }
}

/// Start the reader and writer tasks over `stream`
pub fn spawn<S, F>(stream: S, capacity: usize) -> Connection<F>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    F: Frame,
{
    let (mut rd, mut wr) = tokio::io::split(stream);
    let (frame_tx, frames) = mpsc::channel(capacity.max(1));
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();

    let reader = tokio::spawn(async move {
        loop {
            let item = match read_frame(&mut rd).await {
                Ok(Some(body)) => F::decode_body(body).map_err(Error::from),
                Ok(None) => {
                    debug!("connection closed by peer");
                    break;
                }
                Err(e) => Err(e),
            };
            let fatal = match &item {
                Ok(_) => {
                    metrics::record(|m| m.frames_received.inc());
                    false
                }
                Err(e) => {
                    if matches!(e, Error::Framing(_)) {
                        metrics::record(|m| m.framing_errors.inc());
                    }
                    true
                }
            };
            if frame_tx.send(item).await.is_err() || fatal {
                break;
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = wr.write_all(&frame).await {
                warn!("Failed to write frame: {}", e);
                metrics::record(|m| m.send_failures.inc());
            }
        }
        let _ = wr.flush().await;
        let _ = wr.shutdown().await;
    });

    Connection {
        frames,
        sender: FrameSender {
            tx: out_tx,
            _frame: PhantomData,
        },
        reader,
        writer,
    }
}

/// Open a TCP connection to `addr` using the network settings
pub async fn connect(addr: &str, config: &NetworkConfig) -> Result<TcpStream> {
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::timeout(format!("connection to {}", addr)))?
        .map_err(|e| Error::connection(format!("{}: {}", addr, e)))?;
    stream.set_nodelay(config.tcp_nodelay)?;
    debug!(%addr, "connected");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::frame::ClientMessage;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_frame_in_pieces() {
        let mut mock = Builder::new()
            .read(&[3])
            .read(&[0, 1])
            .read(&[2, 3])
            .build();
        let body = read_frame(&mut mock).await.unwrap().unwrap();
        assert_eq!(&body[..], &[1, 2, 3]);
        assert!(read_frame(&mut mock).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body() {
        let mut mock = Builder::new().read(&[4, 0, 1]).build();
        let err = read_frame(&mut mock).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Framing(FramingError::Truncated {
                declared: 4,
                available: 1
            })
        ));
        assert!(err.is_connection_fatal());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_prefix() {
        let mut mock = Builder::new().read(&[4]).build();
        assert!(matches!(
            read_frame(&mut mock).await,
            Err(Error::Framing(FramingError::Truncated { .. }))
        ));
    }

    #[tokio::test]
    async fn test_connection_round_trip() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let mut conn: Connection<ClientMessage> = spawn(local, 8);

        conn.sender
            .send(&ClientMessage::new(5, Bytes::new()))
            .unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [2, 0, 5, 0]);

        remote.write_all(&[3, 0, 2, 0, 9]).await.unwrap();
        let msg = conn.frames.recv().await.unwrap().unwrap();
        assert_eq!(msg.msg_type, 2);
        assert_eq!(&msg.payload[..], &[9]);

        drop(remote);
        assert!(conn.frames.recv().await.is_none());
        conn.close().await;
    }

    #[tokio::test]
    async fn test_short_body_ends_stream() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut conn: Connection<ClientMessage> = spawn(local, 8);
        remote.write_all(&[1, 0, 7]).await.unwrap();
        let err = conn.frames.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Framing(FramingError::TooShort { .. })));
        assert!(conn.frames.recv().await.is_none());
    }
}
