//! One connection: a read task feeding a handler, and a write/close handle.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use pubwire_protocol::{decode, Frame, TERMINATOR};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{watch, Mutex};

use crate::{ConnectionId, FrameHandler, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared by every [`TransportHandle`] of one connection.
struct Shared {
    id: ConnectionId,
    writer: Mutex<BoxedWriter>,
    closed: AtomicBool,
    /// Flipped to `true` exactly once, by `close()`. The read loop and every
    /// in-flight `write` watch it.
    stop: watch::Sender<bool>,
}

/// Owns one byte stream until [`spawn`](Self::spawn) hands it to a read task.
///
/// Lifecycle is `Open → Closed`, nothing in between. The transition happens
/// on an explicit [`TransportHandle::close`] or when the read loop ends,
/// since `spawn` always closes on its way out.
pub struct Transport {
    handle: TransportHandle,
    reader: BufReader<BoxedReader>,
    stop: watch::Receiver<bool>,
}

impl Transport {
    /// Wraps a duplex byte stream.
    ///
    /// Any `AsyncRead + AsyncWrite` works: a `TcpStream` in production,
    /// a `tokio::io::duplex` half in tests.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (stop_tx, stop_rx) = watch::channel(false);
        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );

        let shared = Arc::new(Shared {
            id,
            writer: Mutex::new(Box::new(write_half)),
            closed: AtomicBool::new(false),
            stop: stop_tx,
        });

        Self {
            handle: TransportHandle { shared },
            reader: BufReader::new(Box::new(read_half)),
            stop: stop_rx,
        }
    }

    /// Returns this connection's identifier.
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Returns a write/close handle for this connection.
    ///
    /// Handles can be taken before `spawn`, which is how the broker builds a
    /// subscriber record before it starts reading.
    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// Reads frames until the connection ends, passing each to `handler`.
    ///
    /// The loop runs on its own Tokio task; this future resolves when that
    /// task finishes and returns the reason: [`TransportError::Eof`],
    /// [`TransportError::Closed`], [`TransportError::ReceiveFailed`] or
    /// [`TransportError::Framing`]. The transport is always closed before
    /// returning, whatever the reason.
    pub async fn spawn<H: FrameHandler>(self, handler: H) -> TransportError {
        let handle = self.handle.clone();
        let conn_id = handle.id();

        let task = tokio::spawn(read_loop(
            self.reader,
            self.handle,
            handler,
            self.stop,
        ));

        let reason = task.await.unwrap_or_else(TransportError::ReadTask);
        tracing::debug!(%conn_id, reason = %reason, "read loop ended");

        handle.close().await;
        reason
    }
}

/// Blocks on "read until terminator", decodes, dispatches, repeats.
async fn read_loop<H: FrameHandler>(
    mut reader: BufReader<BoxedReader>,
    conn: TransportHandle,
    handler: H,
    mut stop: watch::Receiver<bool>,
) -> TransportError {
    let mut line = Vec::new();

    loop {
        line.clear();

        let read = tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => {
                return TransportError::Closed;
            }
            read = reader.read_until(TERMINATOR, &mut line) => read,
        };

        match read {
            Ok(0) => return TransportError::Eof,
            Ok(_) if line.last() != Some(&TERMINATOR) => {
                tracing::debug!(
                    conn_id = %conn.id(),
                    len = line.len(),
                    "discarding partial frame at end of stream"
                );
                return TransportError::Eof;
            }
            Ok(_) => {}
            Err(e) => return TransportError::ReceiveFailed(e),
        }

        let frame = match decode(&line) {
            Ok(frame) => frame,
            Err(e) => return TransportError::Framing(e),
        };

        tracing::trace!(
            conn_id = %conn.id(),
            kind = %frame.kind,
            len = frame.body.len(),
            "frame received"
        );
        handler.handle(conn.clone(), frame).await;
    }
}

/// Write/close capability for one connection. Cheap to clone.
#[derive(Clone)]
pub struct TransportHandle {
    shared: Arc<Shared>,
}

impl TransportHandle {
    /// Returns the connection's identifier.
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Writes one frame to the peer.
    ///
    /// Concurrent writers are serialized, so frames never interleave on the
    /// wire. The call waits until the whole frame has been handed to the
    /// stream, or until the transport is closed, whichever comes first.
    ///
    /// # Errors
    /// - [`TransportError::WriteToClosed`] if the transport is closed before
    ///   or while the frame is being written
    /// - [`TransportError::Encode`] if the frame body contains the terminator
    /// - [`TransportError::SendFailed`] on I/O failure
    pub async fn write(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::WriteToClosed);
        }

        let bytes = frame.encode().map_err(TransportError::Encode)?;
        let mut stop = self.shared.stop.subscribe();

        let mut writer = tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => {
                return Err(TransportError::WriteToClosed);
            }
            writer = self.shared.writer.lock() => writer,
        };

        let send = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };

        tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => {
                tracing::debug!(
                    conn_id = %self.shared.id,
                    "write abandoned, transport closed"
                );
                Err(TransportError::WriteToClosed)
            }
            sent = send => sent.map_err(TransportError::SendFailed),
        }
    }

    /// Closes the connection.
    ///
    /// Marks the transport closed, stops the read loop and shuts down the
    /// write side of the stream. Only the first call does this work; later
    /// or concurrent calls return immediately.
    ///
    /// ## Closing a busy connection
    ///
    /// A peer that stops reading leaves `write` parked inside `write_all`
    /// while it holds the writer lock. `close` must still finish, because it
    /// is how the broker tears down a stalled subscriber and how a fan-out
    /// stuck on that subscriber gets going again. So the stop signal is sent
    /// *before* the lock is taken: every pending or queued `write` is also
    /// watching it, gives up with [`TransportError::WriteToClosed`] and
    /// releases the lock, and only then does `close` shut the stream down.
    /// A frame cut off this way is never completed; the peer sees a truncated
    /// frame followed by end of stream.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.stop.send_replace(true);

        let mut writer = self.shared.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(
                conn_id = %self.shared.id,
                error = %e,
                "shutdown after close failed"
            );
        }
        tracing::debug!(conn_id = %self.shared.id, "transport closed");
    }

    /// Returns `true` once `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pubwire_protocol::MessageType;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    use super::*;

    /// A transport on one end of an in-memory pipe, and the other end.
    fn pipe() -> (Transport, DuplexStream) {
        let (local, remote) = duplex(4096);
        (Transport::new(local), remote)
    }

    /// A handler that forwards every frame into a channel.
    fn recording_handler() -> (
        impl FrameHandler,
        mpsc::UnboundedReceiver<Frame>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |_conn: TransportHandle, frame: Frame| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(frame);
            }
        };
        (handler, rx)
    }

    // =====================================================================
    // write()
    // =====================================================================

    #[tokio::test]
    async fn test_write_sends_encoded_frame() {
        let (transport, mut remote) = pipe();
        let handle = transport.handle();

        handle
            .write(&Frame::publish(b"hi".to_vec()))
            .await
            .expect("write should succeed");

        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x03, b'h', b'i', 0x0A]);
    }

    #[tokio::test]
    async fn test_write_after_close_returns_write_to_closed() {
        let (transport, _remote) = pipe();
        let handle = transport.handle();
        handle.close().await;

        let result = handle.write(&Frame::ok()).await;
        assert!(matches!(result, Err(TransportError::WriteToClosed)));
    }

    #[tokio::test]
    async fn test_write_body_with_terminator_is_rejected() {
        let (transport, _remote) = pipe();
        let result = transport
            .handle()
            .write(&Frame::publish(b"a\nb".to_vec()))
            .await;
        assert!(matches!(result, Err(TransportError::Encode(_))));
    }

    // =====================================================================
    // close() / is_closed()
    // =====================================================================

    #[tokio::test]
    async fn test_close_is_idempotent_and_signals_eof_to_peer() {
        let (transport, mut remote) = pipe();
        let handle = transport.handle();
        assert!(!handle.is_closed());

        handle.close().await;
        handle.close().await;
        assert!(handle.is_closed());

        let mut buf = Vec::new();
        let n = remote.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0, "peer should observe end of stream");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_close_concurrent_callers_all_return() {
        let (transport, _remote) = pipe();
        let handle = transport.handle();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move { h.close().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_close_with_pending_write_completes_and_write_fails() {
        // The peer never reads, so a frame larger than the pipe parks the
        // writer inside write_all while it holds the writer lock.
        let (local, _remote) = duplex(64);
        let transport = Transport::new(local);
        let handle = transport.handle();

        let writer = handle.clone();
        let pending = tokio::spawn(async move {
            writer.write(&Frame::publish(vec![b'x'; 4096])).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished(), "write should be stalled");

        tokio::time::timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("close must not wait behind a stalled write");
        assert!(handle.is_closed());

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("stalled write should be released by close")
            .unwrap();
        assert!(matches!(result, Err(TransportError::WriteToClosed)));
    }

    #[tokio::test]
    async fn test_close_releases_writers_queued_behind_stalled_write() {
        let (local, _remote) = duplex(64);
        let transport = Transport::new(local);
        let handle = transport.handle();

        let writers: Vec<_> = (0..3)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move {
                    h.write(&Frame::publish(vec![b'y'; 1024])).await
                })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("close should finish");

        for writer in writers {
            let result = tokio::time::timeout(Duration::from_secs(1), writer)
                .await
                .expect("queued write should be released")
                .unwrap();
            assert!(matches!(result, Err(TransportError::WriteToClosed)));
        }
    }

    #[tokio::test]
    async fn test_close_while_handler_stuck_writing_ends_spawn() {
        let (local, mut remote) = duplex(64);
        let transport = Transport::new(local);
        let handle = transport.handle();

        // Replies with a frame the peer will never drain.
        let handler = |conn: TransportHandle, _frame: Frame| async move {
            let _ = conn.write(&Frame::publish(vec![b'z'; 4096])).await;
        };
        let running = tokio::spawn(transport.spawn(handler));

        remote.write_all(&[0x02, b't', 0x0A]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!running.is_finished(), "handler should be stuck writing");

        tokio::time::timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("close should finish");
        let reason = tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("read loop should end once closed")
            .unwrap();
        assert!(matches!(reason, TransportError::Closed));
    }

    // =====================================================================
    // spawn()
    // =====================================================================

    #[tokio::test]
    async fn test_spawn_dispatches_frames_in_order_then_reports_eof() {
        let (transport, mut remote) = pipe();
        let handle = transport.handle();
        let (handler, mut frames) = recording_handler();

        remote.write_all(&[0x02, b'a', 0x0A]).await.unwrap();
        remote.write_all(&[0x03, b'b', 0x0A, 0x06, 0x0A]).await.unwrap();
        drop(remote);

        let reason = transport.spawn(handler).await;
        assert!(matches!(reason, TransportError::Eof));
        assert!(handle.is_closed(), "spawn must close on the way out");

        assert_eq!(frames.recv().await.unwrap(), Frame::subscribe(b"a".to_vec()));
        assert_eq!(frames.recv().await.unwrap(), Frame::publish(b"b".to_vec()));
        assert_eq!(frames.recv().await.unwrap(), Frame::ok());
    }

    #[tokio::test]
    async fn test_spawn_unknown_type_ends_with_framing_error() {
        let (transport, mut remote) = pipe();
        let handle = transport.handle();
        let (handler, mut frames) = recording_handler();

        remote.write_all(&[0x09, b'x', 0x0A]).await.unwrap();

        let reason = transport.spawn(handler).await;
        assert!(matches!(
            reason,
            TransportError::Framing(pubwire_protocol::ProtocolError::UnknownMessageType(0x09))
        ));
        assert!(handle.is_closed());
        assert!(frames.try_recv().is_err(), "handler must not see bad frame");
    }

    #[tokio::test]
    async fn test_spawn_partial_frame_at_eof_is_discarded() {
        let (transport, mut remote) = pipe();
        let (handler, mut frames) = recording_handler();

        remote.write_all(&[0x03, b'n', b'o']).await.unwrap();
        drop(remote);

        let reason = transport.spawn(handler).await;
        assert!(matches!(reason, TransportError::Eof));
        assert!(frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_handler_close_ends_loop_with_closed() {
        let (transport, mut remote) = pipe();

        let handler = |conn: TransportHandle, frame: Frame| async move {
            if frame.kind == MessageType::Close {
                conn.close().await;
            }
        };

        remote.write_all(&[0x05, 0x0A]).await.unwrap();

        let reason = tokio::time::timeout(
            Duration::from_secs(5),
            transport.spawn(handler),
        )
        .await
        .expect("spawn should return after handler closes");
        assert!(matches!(reason, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_spawn_external_close_unblocks_pending_read() {
        let (transport, _remote) = pipe();
        let handle = transport.handle();
        let (handler, _frames) = recording_handler();

        let running = tokio::spawn(transport.spawn(handler));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close().await;

        let reason = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("spawn should return once closed")
            .unwrap();
        assert!(matches!(reason, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_spawn_handler_can_reply_through_handle() {
        let (transport, mut remote) = pipe();

        let handler = |conn: TransportHandle, _frame: Frame| async move {
            let _ = conn.write(&Frame::ok()).await;
        };
        let running = tokio::spawn(transport.spawn(handler));

        remote.write_all(&[0x02, b't', 0x0A]).await.unwrap();
        let mut ack = [0u8; 2];
        remote.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, [0x06, 0x0A]);

        drop(remote);
        let reason = running.await.unwrap();
        assert!(matches!(reason, TransportError::Eof));
    }
}
