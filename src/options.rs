//! Server tunables.
//!
//! Buffer sizes and deadlines for every connection a
//! [`Server`](crate::Server) produces.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wsnet::Options;
//!
//! let options = Options::new()
//!     .with_outgoing_capacity(64)
//!     .with_write_deadline(Duration::from_secs(2));
//!
//! assert_eq!(options.outgoing_capacity, 64);
//! assert_eq!(options.write_deadline(), Duration::from_secs(2));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_BUFFER_SIZE: usize = 1024;
const DEFAULT_DEADLINE_MS: u64 = 5000;
const DEFAULT_OUTGOING_CAPACITY: usize = 20;

// ============================================================================
// Options
// ============================================================================

/// Per-server connection settings.
///
/// No validation is applied; values are used as given, except that an
/// outgoing capacity of zero behaves as one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Read buffer size of the upgraded transport, in bytes.
    pub read_buffer_size: usize,

    /// Write buffer size of the upgraded transport, in bytes.
    pub write_buffer_size: usize,

    /// Read deadline in milliseconds. Bounds the upgrade handshake.
    pub read_deadline_ms: u64,

    /// Write deadline in milliseconds, applied to every outgoing frame.
    pub write_deadline_ms: u64,

    /// Capacity of the outgoing queue, in messages.
    pub outgoing_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Options {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            read_deadline_ms: DEFAULT_DEADLINE_MS,
            write_deadline_ms: DEFAULT_DEADLINE_MS,
            outgoing_capacity: DEFAULT_OUTGOING_CAPACITY,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl Options {
    /// Sets the transport read buffer size.
    #[inline]
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the transport write buffer size.
    #[inline]
    #[must_use]
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Sets the read deadline.
    #[inline]
    #[must_use]
    pub fn with_read_deadline(mut self, deadline: Duration) -> Self {
        self.read_deadline_ms = duration_ms(deadline);
        self
    }

    /// Sets the per-frame write deadline.
    #[inline]
    #[must_use]
    pub fn with_write_deadline(mut self, deadline: Duration) -> Self {
        self.write_deadline_ms = duration_ms(deadline);
        self
    }

    /// Sets the outgoing queue capacity.
    #[inline]
    #[must_use]
    pub fn with_outgoing_capacity(mut self, capacity: usize) -> Self {
        self.outgoing_capacity = capacity;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Options {
    /// Returns the read deadline as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }

    /// Returns the write deadline as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn write_deadline(&self) -> Duration {
        Duration::from_millis(self.write_deadline_ms)
    }

    /// Queue capacity actually allocated; tokio channels cannot be zero-sized.
    #[inline]
    #[must_use]
    pub(crate) fn effective_outgoing_capacity(&self) -> usize {
        self.outgoing_capacity.max(1)
    }

    /// Builds the transport configuration used for the upgrade.
    #[must_use]
    pub(crate) fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .read_buffer_size(self.read_buffer_size)
            .write_buffer_size(self.write_buffer_size)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
