//! WebSocket transport layer.
//!
//! A [`Server`] upgrades incoming streams and owns the handler set. Every
//! upgraded stream becomes a [`Connection`] driven by two tasks.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐                      ┌──────────────────────────────┐
//! │  Peer         │      WebSocket       │  Connection                  │
//! │               │─────────────────────►│  read loop  → on_message     │
//! │               │◄─────────────────────│  write loop ← outgoing queue │
//! └───────────────┘                      └──────────────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Server::handle_request` - Upgrade the stream (bounded by the read deadline)
//! 2. `on_connect` - Runs before any message is read
//! 3. Read and write loops run until either side stops
//! 4. `Connection::close` - Idempotent teardown, `on_close` runs exactly once
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `closure` | Graceful versus faulty endings |
//! | `connection` | Per-connection queue, loops and teardown |
//! | `listener` | TCP accept loop |
//! | `server` | Upgrade and handler registry |

// ============================================================================
// Submodules
// ============================================================================

/// Graceful versus faulty connection endings.
pub mod closure;

/// Per-connection queue, read/write loops and teardown.
pub mod connection;

/// TCP accept loop serving a [`Server`].
pub mod listener;

/// WebSocket upgrade and handler registry.
pub mod server;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use closure::{
    is_expected_close, is_expected_close_write_error, is_expected_read_error,
};
pub use connection::Connection;
pub use listener::Listener;
pub use server::{ConnectionHandler, ErrorHandler, MessageHandler, Server};
