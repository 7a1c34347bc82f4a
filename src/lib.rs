//! wsnet - WebSocket connection management.
//!
//! This library upgrades byte streams to WebSocket connections, runs a
//! reader and a writer per connection, and dispatches events to
//! application handlers.
//!
//! # Architecture
//!
//! Key design principles:
//!
//! - One [`Server`] holds [`Options`], the [`Serializer`] and the handlers
//! - Each [`Connection`] owns a bounded outgoing queue and a [`Values`] bag
//! - Sends never block: a full queue drops the payload
//! - Teardown is idempotent and runs the close handler exactly once
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wsnet::{Listener, Options, Result, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut server = Server::new(Options::default());
//!
//!     // Echo every message back to its sender
//!     server.on_message(|conn, data| {
//!         conn.send_bytes(data.to_vec());
//!         Ok(())
//!     });
//!
//!     let listener = Listener::bind(Arc::new(server), "127.0.0.1:8080").await?;
//!     println!("listening on {}", listener.ws_url());
//!
//!     tokio::signal::ctrl_c().await?;
//!     listener.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Connection identifiers |
//! | [`options`] | Tunables for buffers, deadlines and queues |
//! | [`serializer`] | Pluggable payload encoding |
//! | [`transport`] | Server, connections and listener |
//! | [`values`] | Per-connection typed storage |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for connections.
pub mod identifiers;

/// Server-wide tunables.
pub mod options;

/// Payload encoding used by `send` and `unmarshal`.
pub mod serializer;

/// WebSocket transport layer.
///
/// Upgrade handling, connection loops and the TCP listener.
pub mod transport;

/// Concurrent per-connection key/value storage.
pub mod values;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, HandlerError, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Configuration
pub use options::Options;

// Serialization
pub use serializer::{DeserializeFn, JsonSerializer, Serializer, decode, encode};

// Transport types
pub use transport::{
    Connection, ConnectionHandler, ErrorHandler, Listener, MessageHandler, Server,
};

// Storage
pub use values::Values;
