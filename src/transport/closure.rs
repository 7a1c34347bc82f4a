//! Classification of how the read side of a connection ended.
//!
//! Graceful endings are logged at `debug` and stay out of the error handler;
//! everything else is treated as a fault.

// ============================================================================
// Imports
// ============================================================================

use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

// ============================================================================
// Classification
// ============================================================================

/// Returns `true` for close codes that mean a graceful disconnect.
///
/// | Code | Meaning |
/// |------|---------|
/// | 1000 | Normal closure |
/// | 1001 | Going away |
/// | 1005 | No status received |
#[inline]
#[must_use]
pub fn is_expected_close(code: CloseCode) -> bool {
    matches!(code, CloseCode::Normal | CloseCode::Away | CloseCode::Status)
}

/// Returns `true` for read errors caused by the connection already being
/// closed on our side.
#[inline]
#[must_use]
pub fn is_expected_read_error(err: &WsError) -> bool {
    matches!(err, WsError::ConnectionClosed | WsError::AlreadyClosed)
}

/// Returns `true` for errors from sending a close frame on a connection
/// whose closing handshake has already started.
#[inline]
#[must_use]
pub fn is_expected_close_write_error(err: &WsError) -> bool {
    is_expected_read_error(err)
        || matches!(err, WsError::Protocol(ProtocolError::SendAfterClosing))
}

// ============================================================================
// Tests
// ============================================================================
