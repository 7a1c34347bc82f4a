//! Connection factory and handler registry.
//!
//! A [`Server`] holds the options, serializer and callbacks shared by every
//! connection it produces. It owns no per-connection state.
//!
//! # Connection Flow
//!
//! 1. Configure handlers on a `Server`, then wrap it in an `Arc`
//! 2. Pass each inbound stream to [`Server::handle_request`]
//! 3. The stream is upgraded to a WebSocket (bounded by the read deadline)
//! 4. The connect handler runs, the write loop is spawned
//! 5. The read loop runs until the connection ends, then the connection
//!    is closed
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio::net::TcpListener;
//! use wsnet::{Options, Server};
//!
//! # async fn run() -> wsnet::Result<()> {
//! let mut server = Server::new(Options::default());
//! server.on_message(|conn, data| {
//!     conn.send_bytes(data.to_vec());
//!     Ok(())
//! });
//! let server = Arc::new(server);
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     let server = Arc::clone(&server);
//!     tokio::spawn(async move { server.handle_request(stream).await });
//! }
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, HandlerError, Result};
use crate::identifiers::{ConnectionId, IdSequence};
use crate::options::Options;
use crate::serializer::{JsonSerializer, Serializer};

use super::Connection;

// ============================================================================
// Handler Types
// ============================================================================

/// Called once a connection is established, and again when it closes.
pub type ConnectionHandler = Box<dyn Fn(&Arc<Connection>) + Send + Sync>;

/// Called for every inbound payload. An error ends the connection.
pub type MessageHandler =
    Box<dyn Fn(&Arc<Connection>, &[u8]) -> std::result::Result<(), HandlerError> + Send + Sync>;

/// Called when a connection hits an unexpected read, write or handler error.
pub type ErrorHandler = Box<dyn Fn(&Arc<Connection>, &Error) + Send + Sync>;

/// One callback per role. Registering replaces the previous callback.
pub(crate) struct Handlers {
    pub(crate) connect: ConnectionHandler,
    pub(crate) message: MessageHandler,
    pub(crate) close: ConnectionHandler,
    pub(crate) error: ErrorHandler,
    pub(crate) pong: ConnectionHandler,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            connect: Box::new(|_| {}),
            message: Box::new(|_, _| Ok(())),
            close: Box::new(|_| {}),
            error: Box::new(|_, _| {}),
            pong: Box::new(|_| {}),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// WebSocket server: builds and drives [`Connection`]s.
///
/// Handlers and the serializer are set through `&mut self`, so they can only
/// change before the server is shared behind an `Arc`.
pub struct Server {
    /// Tunables applied to every connection.
    options: Options,
    /// Payload encoding for `Connection::send` / `Connection::unmarshal`.
    serializer: Box<dyn Serializer>,
    /// Registered callbacks.
    pub(crate) handlers: Handlers,
    /// Source of connection IDs.
    ids: IdSequence,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

// ============================================================================
// Server - Configuration
// ============================================================================

impl Server {
    /// Creates a server with no-op handlers and the JSON serializer.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            options,
            serializer: Box::new(JsonSerializer),
            handlers: Handlers::default(),
            ids: IdSequence::new(),
        }
    }

    /// Returns the server options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the active serializer.
    #[inline]
    #[must_use]
    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    /// Replaces the serializer.
    pub fn set_serializer(&mut self, serializer: impl Serializer) {
        self.serializer = Box::new(serializer);
    }

    /// Sets the handler run after a connection is established.
    pub fn on_connect<F>(&mut self, handler: F)
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.handlers.connect = Box::new(handler);
    }

    /// Sets the handler run for every inbound payload.
    ///
    /// Returning an error stops reading and closes the connection.
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: Fn(&Arc<Connection>, &[u8]) -> std::result::Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.message = Box::new(handler);
    }

    /// Sets the handler run once when a connection closes.
    pub fn on_close<F>(&mut self, handler: F)
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.handlers.close = Box::new(handler);
    }

    /// Sets the handler run on unexpected read, write and handler errors.
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: Fn(&Arc<Connection>, &Error) + Send + Sync + 'static,
    {
        self.handlers.error = Box::new(handler);
    }

    /// Sets the handler run for every pong frame.
    pub fn on_pong<F>(&mut self, handler: F)
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.handlers.pong = Box::new(handler);
    }

    /// Allocates the next connection ID.
    pub(crate) fn next_connection_id(&self) -> ConnectionId {
        self.ids.next()
    }
}

// ============================================================================
// Server - Serving
// ============================================================================

impl Server {
    /// Upgrades `stream` and serves the resulting connection until it ends.
    ///
    /// Resolves when the connection has closed and its write loop has
    /// exited. Everything after a successful upgrade is reported through
    /// handlers, not the return value.
    ///
    /// # Errors
    ///
    /// - [`Error::Upgrade`] if the stream is not a valid WebSocket handshake
    /// - [`Error::UpgradeTimeout`] if the handshake exceeds the read deadline
    pub async fn handle_request<S>(self: &Arc<Self>, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let upgrade = tokio_tungstenite::accept_async_with_config(
            stream,
            Some(self.options.websocket_config()),
        );

        let ws_stream = timeout(self.options.read_deadline(), upgrade)
            .await
            .map_err(|_| Error::upgrade_timeout(self.options.read_deadline_ms))?
            .map_err(|e| Error::upgrade(e.to_string()))?;

        let id = self.next_connection_id();
        let (connection, pumps) = Connection::new(Arc::clone(self), id, ws_stream);

        info!(conn_id = %id, "WebSocket connection established");

        (self.handlers.connect)(&connection);

        let writer = tokio::spawn(Arc::clone(&connection).run_write_loop(pumps.outgoing));

        connection.run_read_loop(pumps.incoming).await;
        connection.close().await;

        if let Err(e) = writer.await {
            warn!(conn_id = %id, error = %e, "Write loop task failed");
        }

        debug!(conn_id = %id, "Connection finished");
        Ok(())
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
