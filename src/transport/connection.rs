//! WebSocket connection and its read/write pumps.
//!
//! A [`Connection`] owns one upgraded transport and runs two loops over it:
//!
//! - **Read loop**: runs on the task that called
//!   [`Server::handle_request`](super::Server::handle_request) and hands each
//!   payload to the message handler.
//! - **Write loop**: a spawned task draining the bounded outgoing queue into
//!   the transport, one frame per payload.
//!
//! # Lifecycle
//!
//! ```text
//! OPEN ──close()──► CLOSING ──► CLOSED
//!        (stopped = true)   (close handler run, close frame sent,
//!                            transport closed)
//! ```
//!
//! [`Connection::close`] may be called from any number of places at once;
//! the teardown sequence runs exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::serializer;
use crate::values::Values;

use super::Server;
use super::closure::{
    is_expected_close, is_expected_close_write_error, is_expected_read_error,
};

// ============================================================================
// Types
// ============================================================================

/// Write half of the upgraded transport.
type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Read half of the upgraded transport.
pub(crate) type FrameStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// Lifecycle state guarded by the connection lock.
struct State {
    stopped: bool,
    /// Producer side of the outgoing queue. Taken (and so closed) by `close`.
    outgoing: Option<mpsc::Sender<Vec<u8>>>,
}

/// Halves handed to the two loops when a connection is created.
pub(crate) struct Pumps {
    pub(crate) incoming: FrameStream,
    pub(crate) outgoing: mpsc::Receiver<Vec<u8>>,
}

// ============================================================================
// Connection
// ============================================================================

/// An upgraded WebSocket connection.
///
/// Handed to every handler as `&Arc<Connection>`; clone the `Arc` to keep
/// sending from elsewhere.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`. [`send`](Self::send) and
/// [`send_bytes`](Self::send_bytes) never block.
pub struct Connection {
    /// Unique ID within the owning server.
    id: ConnectionId,
    /// Application state.
    values: Values,
    /// Owning server: options, serializer, handlers.
    server: Arc<Server>,
    /// Stopped flag and queue producer.
    state: Mutex<State>,
    /// One-shot stop broadcast to both loops.
    stop: watch::Sender<bool>,
    /// Shared by the write loop and `close`. Taken (and so released) by `close`.
    sink: AsyncMutex<Option<FrameSink>>,
}

impl Connection {
    /// Wraps an upgraded stream. The caller drives the returned pumps.
    pub(crate) fn new<S>(
        server: Arc<Server>,
        id: ConnectionId,
        ws_stream: WebSocketStream<S>,
    ) -> (Arc<Self>, Pumps)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws_stream.split::<Message>();
        let (outgoing_tx, outgoing_rx) =
            mpsc::channel(server.options().effective_outgoing_capacity());
        let (stop, _) = watch::channel(false);

        let connection = Arc::new(Self {
            id,
            values: Values::new(),
            server,
            state: Mutex::new(State {
                stopped: false,
                outgoing: Some(outgoing_tx),
            }),
            stop,
            sink: AsyncMutex::new(Some(Box::pin(sink))),
        });

        let pumps = Pumps {
            incoming: Box::pin(stream),
            outgoing: outgoing_rx,
        };

        (connection, pumps)
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the per-connection value store.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Returns the server that accepted this connection.
    #[inline]
    #[must_use]
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Returns `true` once [`close`](Self::close) has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().stopped
    }
}

// ============================================================================
// Connection - Sending
// ============================================================================

impl Connection {
    /// Serializes `value` with the server's serializer and queues it.
    ///
    /// Delivery is best effort, as with [`send_bytes`](Self::send_bytes).
    ///
    /// # Errors
    ///
    /// [`Error::Encoding`] if the value cannot be serialized; nothing is queued.
    pub fn send<T>(&self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let data = serializer::encode(self.server.serializer(), value)?;
        self.send_bytes(data);
        Ok(())
    }

    /// Queues a raw payload for the write loop.
    ///
    /// Never blocks and never fails: on a closed connection this is a no-op,
    /// and when the queue is full the payload is dropped with a warning.
    pub fn send_bytes(&self, data: impl Into<Vec<u8>>) {
        match self.enqueue(data.into()) {
            Ok(()) => {}
            Err(Error::QueueFull { capacity, .. }) => {
                warn!(conn_id = %self.id, capacity, "Outgoing queue full, message dropped");
            }
            Err(_) => {
                trace!(conn_id = %self.id, "Send on closed connection ignored");
            }
        }
    }

    /// Like [`send_bytes`](Self::send_bytes), but reports why a payload was
    /// not queued.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] if the outgoing queue is at capacity
    /// - [`Error::ConnectionClosed`] if the connection is closing or its
    ///   write loop has ended
    pub fn try_send_bytes(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.enqueue(data.into())
    }

    /// Decodes an inbound payload with the server's serializer.
    ///
    /// # Errors
    ///
    /// [`Error::Decoding`] on malformed input or a shape mismatch.
    pub fn unmarshal<T>(&self, data: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serializer::decode(self.server.serializer(), data)
    }

    /// Checks `stopped` and enqueues under one lock, so no payload can slip
    /// into a queue that `close` is tearing down.
    fn enqueue(&self, data: Vec<u8>) -> Result<()> {
        let state = self.state.lock();
        if state.stopped {
            return Err(Error::ConnectionClosed);
        }

        let Some(outgoing) = state.outgoing.as_ref() else {
            return Err(Error::ConnectionClosed);
        };

        match outgoing.try_send(data) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::queue_full(
                self.id,
                self.server.options().effective_outgoing_capacity(),
            )),
            Err(TrySendError::Closed(_)) => Err(Error::ConnectionClosed),
        }
    }
}

// ============================================================================
// Connection - Close
// ============================================================================

impl Connection {
    /// Closes the connection.
    ///
    /// The first call stops both loops, closes the outgoing queue, runs the
    /// close handler, sends a close frame within the write deadline and
    /// releases the transport. Later and concurrent calls return immediately.
    pub async fn close(self: &Arc<Self>) {
        if self.begin_close() {
            self.finish_close().await;
        }
    }

    /// Synchronous half of `close`: flips `stopped`, signals the loops and
    /// runs the close handler. Returns `false` if already stopped.
    fn begin_close(self: &Arc<Self>) -> bool {
        let outgoing = {
            let mut state = self.state.lock();
            if state.stopped {
                return false;
            }
            state.stopped = true;
            state.outgoing.take()
        };

        self.stop.send_replace(true);
        drop(outgoing);

        (self.server.handlers.close)(self);
        true
    }

    /// Transport half of `close`: close frame, close handshake, then drops
    /// the write half so the socket goes away once the read loop has ended,
    /// even while other holders keep the connection alive.
    async fn finish_close(&self) {
        let deadline = self.server.options().write_deadline();
        let shutdown = async {
            let Some(mut sink) = self.sink.lock().await.take() else {
                return Ok(());
            };

            if let Err(e) = sink.send(Message::Close(None)).await {
                if is_expected_close_write_error(&e) {
                    trace!(conn_id = %self.id, "Close frame skipped, handshake already under way");
                } else {
                    warn!(conn_id = %self.id, error = %e, "Could not send close frame, closing prematurely");
                }
            }
            sink.close().await
        };

        match timeout(deadline, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(conn_id = %self.id, error = %e, "Transport close failed"),
            Err(_) => {
                warn!(
                    conn_id = %self.id,
                    timeout_ms = self.server.options().write_deadline_ms,
                    "Transport close timed out"
                );
                // Timed out before the sink was taken: release it anyway
                drop(self.sink.lock().await.take());
            }
        }

        debug!(conn_id = %self.id, "Connection closed");
    }
}

// ============================================================================
// Connection - Read Loop
// ============================================================================

impl Connection {
    /// Reads until the transport ends, the message handler fails, or the
    /// connection is closed. Always closes the connection on the way out,
    /// including on panic or cancellation.
    pub(crate) async fn run_read_loop(self: &Arc<Self>, incoming: FrameStream) {
        let guard = CloseOnExit::arm(Arc::clone(self));
        self.read_frames(incoming).await;
        guard.close().await;
    }

    async fn read_frames(self: &Arc<Self>, mut incoming: FrameStream) {
        let stop = stopped(self.stop.subscribe());
        tokio::pin!(stop);

        loop {
            let frame = tokio::select! {
                biased;

                () = &mut stop => {
                    trace!(conn_id = %self.id, "Read loop stopped by close");
                    return;
                }

                frame = incoming.next() => frame,
            };

            match frame {
                Some(Ok(Message::Binary(data))) => {
                    if !self.dispatch(&data) {
                        return;
                    }
                }

                Some(Ok(Message::Text(text))) => {
                    if !self.dispatch(text.as_str().as_bytes()) {
                        return;
                    }
                }

                Some(Ok(Message::Pong(_))) => {
                    (self.server.handlers.pong)(self);
                }

                Some(Ok(Message::Close(frame))) => {
                    self.peer_closed(frame);
                    return;
                }

                Some(Err(e)) => {
                    self.read_failed(e);
                    return;
                }

                None => {
                    debug!(conn_id = %self.id, "WebSocket stream ended");
                    return;
                }

                // Pings are answered by the transport
                Some(Ok(Message::Ping(_) | Message::Frame(_))) => {}
            }
        }
    }

    /// Runs the message handler. Returns `false` if the loop must stop.
    fn dispatch(self: &Arc<Self>, data: &[u8]) -> bool {
        match (self.server.handlers.message)(self, data) {
            Ok(()) => true,
            Err(e) => {
                let err = Error::Handler(e);
                warn!(conn_id = %self.id, error = %err, "Message handler failed");
                (self.server.handlers.error)(self, &err);
                false
            }
        }
    }

    fn peer_closed(self: &Arc<Self>, frame: Option<CloseFrame>) {
        let (code, reason) = frame
            .map(|f| (f.code, f.reason.as_str().to_owned()))
            .unwrap_or((CloseCode::Status, String::new()));

        if is_expected_close(code) {
            debug!(conn_id = %self.id, code = u16::from(code), "Peer closed connection");
            return;
        }

        let err = Error::unexpected_close(self.id, u16::from(code), reason);
        warn!(conn_id = %self.id, error = %err, "Error reading message from client");
        (self.server.handlers.error)(self, &err);
    }

    fn read_failed(self: &Arc<Self>, e: WsError) {
        if is_expected_read_error(&e) {
            debug!(conn_id = %self.id, error = %e, "Read ended on closed connection");
            return;
        }

        let err = Error::WebSocket(e);
        warn!(conn_id = %self.id, error = %err, "Error reading message from client");
        (self.server.handlers.error)(self, &err);
    }
}

// ============================================================================
// Connection - Write Loop
// ============================================================================

impl Connection {
    /// Drains the outgoing queue into the transport until stopped or a write
    /// fails. Failed payloads are not retried.
    pub(crate) async fn run_write_loop(self: Arc<Self>, mut outgoing: mpsc::Receiver<Vec<u8>>) {
        let stop = stopped(self.stop.subscribe());
        tokio::pin!(stop);

        loop {
            let data = tokio::select! {
                biased;

                () = &mut stop => {
                    trace!(conn_id = %self.id, "Write loop stopped by close");
                    return;
                }

                data = outgoing.recv() => data,
            };

            let Some(data) = data else {
                return;
            };

            match self.write_frame(data).await {
                Ok(()) => {}
                Err(Error::ConnectionClosed) => {
                    trace!(conn_id = %self.id, "Write loop stopped by close");
                    return;
                }
                Err(e) if self.is_closed() => {
                    trace!(conn_id = %self.id, error = %e, "Write interrupted by close");
                    return;
                }
                Err(e) => {
                    warn!(conn_id = %self.id, error = %e, "Could not write message");
                    (self.server.handlers.error)(&self, &e);
                    return;
                }
            }
        }
    }

    /// Writes one binary frame within the write deadline.
    ///
    /// `stopped` is re-checked while holding the sink, so a frame is never
    /// written after `close` has begun. That case yields
    /// [`Error::ConnectionClosed`].
    async fn write_frame(&self, data: Vec<u8>) -> Result<()> {
        let deadline = self.server.options().write_deadline();
        let len = data.len();

        let write = async {
            let mut sink = self.sink.lock().await;
            // Close may have started while the payload sat in the queue
            if self.is_closed() {
                return Err(Error::ConnectionClosed);
            }
            let Some(sink) = sink.as_mut() else {
                return Err(Error::ConnectionClosed);
            };
            sink.send(Message::binary(data))
                .await
                .map_err(|e| Error::write(self.id, e.to_string()))
        };

        match timeout(deadline, write).await {
            Ok(Ok(())) => {
                trace!(conn_id = %self.id, len, "Message written");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::write_timeout(
                self.id,
                self.server.options().write_deadline_ms,
            )),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves once the stop signal is raised.
async fn stopped(mut stop: watch::Receiver<bool>) {
    // The sender lives as long as the connection, so an error here only
    // means the connection is gone, which also counts as stopped.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Closes the connection when the read loop exits by any path.
///
/// The normal path awaits [`Connection::close`] through
/// [`CloseOnExit::close`]. On panic or cancellation the guard is dropped
/// instead: the close handler runs right away on the dropping thread and
/// only the transport close is spawned.
struct CloseOnExit {
    connection: Option<Arc<Connection>>,
}

impl CloseOnExit {
    fn arm(connection: Arc<Connection>) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    async fn close(mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        if !connection.begin_close() {
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                debug!(conn_id = %connection.id, "Read loop aborted, closing connection");
                handle.spawn(PendingTransportClose(Some(connection)).run());
            }
            Err(_) => {
                warn!(conn_id = %connection.id, "Read loop aborted outside a runtime, transport left open");
            }
        }
    }
}

/// Transport close spawned by [`CloseOnExit`].
///
/// A runtime that is shutting down drops spawned tasks without polling
/// them; the drop is logged so the open transport does not go unnoticed.
struct PendingTransportClose(Option<Arc<Connection>>);

impl PendingTransportClose {
    async fn run(mut self) {
        if let Some(connection) = self.0.take() {
            connection.finish_close().await;
        }
    }
}

impl Drop for PendingTransportClose {
    fn drop(&mut self) {
        if let Some(connection) = self.0.take() {
            warn!(conn_id = %connection.id, "Runtime shutting down, transport close abandoned");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use proptest::prelude::*;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    use crate::options::Options;
    use crate::transport::testing::{init_tracing, raw_pair};

    fn drain(outgoing: &mut mpsc::Receiver<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut queued = Vec::new();
        while let Ok(data) = outgoing.try_recv() {
            queued.push(data);
        }
        queued
    }

    #[tokio::test]
    async fn test_sends_reach_transport_in_order() {
        init_tracing();
        let server = Arc::new(Server::new(Options::new().with_outgoing_capacity(8)));
        let (conn, pumps, mut client) = raw_pair(&server, 64 * 1024).await;
        let writer = tokio::spawn(Arc::clone(&conn).run_write_loop(pumps.outgoing));

        for i in 0..8_u8 {
            conn.send_bytes(vec![i]);
        }

        for i in 0..8_u8 {
            let msg = client.next().await.expect("frame").expect("valid frame");
            assert_eq!(msg, Message::binary(vec![i]));
        }

        conn.close().await;
        writer.await.expect("write loop");
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_error() {
        let server = Arc::new(Server::new(Options::new().with_outgoing_capacity(3)));
        let (conn, mut pumps, _client) = raw_pair(&server, 1024).await;

        for i in 0..5_u8 {
            conn.send_bytes(vec![i]);
        }

        let err = conn.try_send_bytes(vec![9]).unwrap_err();
        assert!(matches!(err, Error::QueueFull { capacity: 3, .. }));
        assert_eq!(drain(&mut pumps.outgoing), vec![vec![0], vec![1], vec![2]]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_paused_writer_keeps_exactly_capacity(capacity in 1_usize..16, extra in 0_usize..16) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");

            let queued = rt.block_on(async {
                let server = Arc::new(Server::new(Options::new().with_outgoing_capacity(capacity)));
                let (conn, mut pumps, _client) = raw_pair(&server, 1024).await;

                for i in 0..capacity + extra {
                    conn.send_bytes(i.to_be_bytes().to_vec());
                }
                drain(&mut pumps.outgoing)
            });

            let expected: Vec<Vec<u8>> = (0..capacity).map(|i| i.to_be_bytes().to_vec()).collect();
            prop_assert_eq!(queued, expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_runs_teardown_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut server = Server::new(Options::new());
        let counter = Arc::clone(&closes);
        server.on_close(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let server = Arc::new(server);

        let (conn, _pumps, _client) = raw_pair(&server, 1024).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.close().await })
            })
            .collect();
        for task in tasks {
            task.await.expect("close task");
        }
        tokio::join!(conn.close(), conn.close());

        assert!(conn.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_after_close_is_noop() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, mut pumps, _client) = raw_pair(&server, 1024).await;

        conn.close().await;
        conn.send_bytes(b"late".to_vec());
        assert!(conn.send(&json!({ "late": true })).is_ok());

        assert!(matches!(conn.try_send_bytes(b"late".to_vec()), Err(Error::ConnectionClosed)));
        assert!(matches!(pumps.outgoing.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn test_close_sends_close_frame() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, _pumps, mut client) = raw_pair(&server, 1024).await;

        conn.close().await;

        let msg = client.next().await.expect("frame").expect("valid frame");
        assert!(matches!(msg, Message::Close(None)));
    }

    #[tokio::test]
    async fn test_write_loop_stops_before_queued_payloads() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, pumps, mut client) = raw_pair(&server, 64 * 1024).await;

        conn.send_bytes(b"never written".to_vec());
        conn.close().await;
        Arc::clone(&conn).run_write_loop(pumps.outgoing).await;

        let msg = client.next().await.expect("frame").expect("valid frame");
        assert!(msg.is_close());
    }

    #[tokio::test]
    async fn test_send_encodes_with_server_serializer() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, mut pumps, _client) = raw_pair(&server, 1024).await;

        conn.send(&json!({ "op": "join", "room": 1 })).expect("encodable");
        assert_eq!(drain(&mut pumps.outgoing), vec![br#"{"op":"join","room":1}"#.to_vec()]);
    }

    #[tokio::test]
    async fn test_send_unencodable_value_queues_nothing() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, mut pumps, _client) = raw_pair(&server, 1024).await;

        let mut grid = HashMap::new();
        grid.insert((0, 0), 1);

        let err = conn.send(&grid).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));

        let err = conn.send(&f64::NAN).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));

        assert!(matches!(pumps.outgoing.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_unmarshal_uses_server_serializer() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, _pumps, _client) = raw_pair(&server, 1024).await;

        let value: HashMap<String, u32> = conn.unmarshal(br#"{"a":1}"#).expect("decodable");
        assert_eq!(value["a"], 1);
        assert!(conn.unmarshal::<u32>(b"\"x\"").unwrap_err().is_codec_error());
    }

    #[tokio::test]
    async fn test_write_deadline_ends_write_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut server = Server::new(
            Options::new().with_write_deadline(Duration::from_millis(50)),
        );
        server.on_error(move |_, err| {
            let _ = tx.send(err.is_timeout());
        });
        let server = Arc::new(server);

        // Tiny pipe and a client that never reads: the write cannot complete
        let (conn, pumps, _client) = raw_pair(&server, 64).await;
        conn.send_bytes(vec![0_u8; 16 * 1024]);

        Arc::clone(&conn).run_write_loop(pumps.outgoing).await;

        assert_eq!(rx.recv().await, Some(true));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_write_failure_reaches_error_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut server = Server::new(Options::new());
        server.on_error(move |_, err| {
            let _ = tx.send(matches!(err, Error::Write { .. }));
        });
        let server = Arc::new(server);

        let (conn, pumps, client) = raw_pair(&server, 1024).await;
        drop(client);
        conn.send_bytes(b"nobody listening".to_vec());

        tokio::time::timeout(
            Duration::from_secs(1),
            Arc::clone(&conn).run_write_loop(pumps.outgoing),
        )
        .await
        .expect("write loop exits after a failed write");

        assert_eq!(rx.recv().await, Some(true));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_write_frame_refused_once_close_began() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, _pumps, _client) = raw_pair(&server, 1024).await;

        // Only the synchronous half: the sink is still in place
        assert!(conn.begin_close());
        let err = conn.write_frame(b"late".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));

        conn.finish_close().await;
        let err = conn.write_frame(b"later".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_aborted_read_loop_runs_close_handler_without_runtime() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut server = Server::new(Options::new());
        let counter = Arc::clone(&closes);
        server.on_close(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let server = Arc::new(server);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let (conn, _pumps, _client) = rt.block_on(raw_pair(&server, 1024));

        // Outside `block_on`: no runtime to spawn the transport close on
        drop(CloseOnExit::arm(Arc::clone(&conn)));

        assert!(conn.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_external_close_unblocks_read_loop() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, pumps, _client) = raw_pair(&server, 1024).await;

        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.run_read_loop(pumps.incoming).await })
        };

        conn.close().await;
        tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("read loop exits after close")
            .expect("read loop task");
    }

    #[tokio::test]
    async fn test_debug_output() {
        let server = Arc::new(Server::new(Options::new()));
        let (conn, _pumps, _client) = raw_pair(&server, 1024).await;

        let debug = format!("{conn:?}");
        assert!(debug.contains("closed: false"));
    }
}
