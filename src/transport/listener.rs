//! TCP accept loop feeding a [`Server`].
//!
//! Optional convenience: [`Server::handle_request`] works with any stream,
//! this just binds a socket and serves each accepted connection on its own
//! task.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Listener (accept loop task)              │
//! │   accept() ──► spawn handle_request ─┐   │
//! │   accept() ──► spawn handle_request ─┤   │
//! │   shutdown ──► stop accepting        │   │
//! └──────────────────────────────────────┼───┘
//!                                        ▼
//!                          Server (shared via Arc)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::Result;

use super::Server;

// ============================================================================
// Listener
// ============================================================================

/// A bound TCP socket whose accepted streams are served by a [`Server`].
///
/// Dropping the listener stops accepting; connections already being served
/// run to completion either way.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wsnet::{Listener, Server};
///
/// # async fn run() -> wsnet::Result<()> {
/// let listener = Listener::bind(Arc::new(Server::default()), "127.0.0.1:0").await?;
/// println!("serving on {}", listener.ws_url());
/// listener.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Listener {
    /// Bound address.
    local_addr: SocketAddr,
    /// Raised to stop the accept loop.
    shutdown: watch::Sender<bool>,
    /// Accept loop task, taken by `shutdown`.
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Binds `addr` and starts accepting connections for `server`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if binding fails.
    pub async fn bind(server: Arc<Server>, addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(server, listener, shutdown_rx));

        info!(%local_addr, "Listener started");

        Ok(Self {
            local_addr,
            shutdown,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the WebSocket URL clients can connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Stops accepting and waits for the accept loop to exit.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let task = self.accept_task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Accept loop task failed");
        }

        info!(local_addr = %self.local_addr, "Listener shut down");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

async fn accept_loop(
    server: Arc<Server>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Accept loop started");

    loop {
        let accepted = tokio::select! {
            biased;

            _ = shutdown.wait_for(|stop| *stop) => break,

            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let server = Arc::clone(&server);
                let span = info_span!("connection", %peer);
                tokio::spawn(
                    async move {
                        debug!("TCP connection accepted");
                        if let Err(e) = server.handle_request(stream).await {
                            warn!(error = %e, "Connection handling failed");
                        }
                    }
                    .instrument(span),
                );
            }
            Err(e) => {
                error!(error = %e, "Accept failed");
            }
        }
    }

    debug!("Accept loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
