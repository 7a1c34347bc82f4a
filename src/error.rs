//! Error types for wsnet.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wsnet::{Connection, Result};
//!
//! fn greet(conn: &Connection) -> Result<()> {
//!     conn.send(&serde_json::json!({ "hello": conn.id().as_u64() }))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Upgrade | [`Error::Upgrade`], [`Error::UpgradeTimeout`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::UnexpectedClose`], [`Error::QueueFull`] |
//! | Write | [`Error::Write`], [`Error::WriteTimeout`] |
//! | Codec | [`Error::Encoding`], [`Error::Decoding`] |
//! | Application | [`Error::Handler`] |
//! | External | [`Error::Io`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

/// Boxed error returned by application message handlers.
pub type HandlerError = Box<dyn StdError + Send + Sync + 'static>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Upgrade Errors
    // ========================================================================
    /// The inbound stream could not be upgraded to a WebSocket.
    ///
    /// Returned by `Server::handle_request`; no connection is created.
    #[error("Upgrade failed: {message}")]
    Upgrade {
        /// Description of the handshake failure.
        message: String,
    },

    /// The upgrade handshake did not finish within the read deadline.
    #[error("Upgrade timed out after {timeout_ms}ms")]
    UpgradeTimeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The connection is closing or closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The peer closed with a code that is not a graceful closure.
    #[error("Connection {conn_id} closed unexpectedly with code {code}: {reason}")]
    UnexpectedClose {
        /// Connection that received the close frame.
        conn_id: ConnectionId,
        /// Close code sent by the peer.
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },

    /// The outgoing queue is at capacity.
    #[error("Outgoing queue full on connection {conn_id} (capacity {capacity})")]
    QueueFull {
        /// Connection whose queue overflowed.
        conn_id: ConnectionId,
        /// Configured queue capacity.
        capacity: usize,
    },

    // ========================================================================
    // Write Errors
    // ========================================================================
    /// Writing a frame to the transport failed.
    #[error("Write failed on connection {conn_id}: {message}")]
    Write {
        /// Connection being written to.
        conn_id: ConnectionId,
        /// Description of the transport failure.
        message: String,
    },

    /// Writing a frame exceeded the write deadline.
    #[error("Write on connection {conn_id} timed out after {timeout_ms}ms")]
    WriteTimeout {
        /// Connection being written to.
        conn_id: ConnectionId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// A value could not be represented in the target encoding.
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of the encoding failure.
        message: String,
    },

    /// A payload was malformed or did not match the requested shape.
    #[error("Decoding error: {message}")]
    Decoding {
        /// Description of the decoding failure.
        message: String,
    },

    // ========================================================================
    // Application Errors
    // ========================================================================
    /// The message handler rejected a payload.
    #[error("Message handler failed: {0}")]
    Handler(#[source] HandlerError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an upgrade error.
    #[inline]
    pub fn upgrade(message: impl Into<String>) -> Self {
        Self::Upgrade {
            message: message.into(),
        }
    }

    /// Creates an upgrade timeout error.
    #[inline]
    pub fn upgrade_timeout(timeout_ms: u64) -> Self {
        Self::UpgradeTimeout { timeout_ms }
    }

    /// Creates an unexpected close error.
    #[inline]
    pub fn unexpected_close(conn_id: ConnectionId, code: u16, reason: impl Into<String>) -> Self {
        Self::UnexpectedClose {
            conn_id,
            code,
            reason: reason.into(),
        }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(conn_id: ConnectionId, capacity: usize) -> Self {
        Self::QueueFull { conn_id, capacity }
    }

    /// Creates a write error.
    #[inline]
    pub fn write(conn_id: ConnectionId, message: impl Into<String>) -> Self {
        Self::Write {
            conn_id,
            message: message.into(),
        }
    }

    /// Creates a write timeout error.
    #[inline]
    pub fn write_timeout(conn_id: ConnectionId, timeout_ms: u64) -> Self {
        Self::WriteTimeout {
            conn_id,
            timeout_ms,
        }
    }

    /// Creates an encoding error.
    #[inline]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a decoding error.
    #[inline]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    /// Wraps an application handler error.
    #[inline]
    pub fn handler(err: impl Into<HandlerError>) -> Self {
        Self::Handler(err.into())
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::UpgradeTimeout { .. } | Self::WriteTimeout { .. }
        )
    }

    /// Returns `true` if this error concerns the transport or connection state.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Upgrade { .. }
                | Self::UpgradeTimeout { .. }
                | Self::ConnectionClosed
                | Self::UnexpectedClose { .. }
                | Self::Write { .. }
                | Self::WriteTimeout { .. }
                | Self::Io(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a serializer error.
    #[inline]
    #[must_use]
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Self::Encoding { .. } | Self::Decoding { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
