//! In-memory sockets for transport tests.

use std::sync::Arc;

use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing_subscriber::EnvFilter;

use crate::error::Result;

use super::Server;
use super::connection::{Connection, Pumps};

/// Client end of an in-memory WebSocket.
pub(crate) type Client = WebSocketStream<DuplexStream>;

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Performs a real client handshake against `server.handle_request`.
pub(crate) async fn connect(server: &Arc<Server>) -> (Client, JoinHandle<Result<()>>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let served = {
        let server = Arc::clone(server);
        tokio::spawn(async move { server.handle_request(server_io).await })
    };

    let (client, _) = tokio_tungstenite::client_async("ws://localhost/", client_io)
        .await
        .expect("client handshake");

    (client, served)
}

/// Builds a connection over an already-upgraded pipe without starting its loops.
pub(crate) async fn raw_pair(
    server: &Arc<Server>,
    pipe_capacity: usize,
) -> (Arc<Connection>, Pumps, Client) {
    let (client_io, server_io) = tokio::io::duplex(pipe_capacity);

    let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

    let (connection, pumps) =
        Connection::new(Arc::clone(server), server.next_connection_id(), server_ws);

    (connection, pumps, client)
}
