//! TCP game server
//!
//! [`GameServer`] owns the listener and the shared registries. Every accepted
//! connection gets a monotonically increasing id, an unbounded outbound
//! channel, and its own [`session::Session`] task; the registries are the only
//! state shared between tasks.

pub mod game;
pub mod registry;
pub mod session;

pub use game::{ConnId, Game};
pub use registry::{GameRegistry, NameRegistry};
pub use session::Session;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::Result;
use crate::ServerConfig;

/// Accepting end of the server; shared state lives behind `Arc`s handed to
/// each session task
pub struct GameServer {
    config: ServerConfig,
    listener: TcpListener,
    games: Arc<GameRegistry>,
    names: Arc<NameRegistry>,
    next_conn_id: AtomicU64,
    connected: Arc<AtomicUsize>,
}

impl GameServer {
    /// Bind the listener; the returned server is not accepting yet
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "server listening");
        Ok(Self {
            config,
            listener,
            games: Arc::new(GameRegistry::new()),
            names: Arc::new(NameRegistry::new()),
            next_conn_id: AtomicU64::new(1),
            connected: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address the listener actually bound to; useful with port 0
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one session task per connection
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;

            if self.connected.load(Ordering::SeqCst) >= self.config.max_connections {
                warn!(%addr, "refusing connection, server full");
                tokio::spawn(refuse(stream));
                continue;
            }

            let conn = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
            let total = self.connected.fetch_add(1, Ordering::SeqCst) + 1;
            info!(conn, %addr, total, "connection accepted");

            let games = Arc::clone(&self.games);
            let names = Arc::clone(&self.names);
            let connected = Arc::clone(&self.connected);
            let max_line_bytes = self.config.max_line_bytes;

            tokio::spawn(async move {
                let (tx, rx) = mpsc::unbounded_channel();
                let session = Session::new(conn, addr, games, names, tx);
                session.run(stream, rx, max_line_bytes).await;
                let total = connected.fetch_sub(1, Ordering::SeqCst) - 1;
                info!(conn, %addr, total, "connection closed");
            });
        }
    }
}

/// Tell an over-limit client why it is being dropped, then close
async fn refuse(mut stream: TcpStream) {
    let line = b"{\"type\":\"ERR\",\"msg\":\"Server is full. Try again later.\"}\n";
    let _ = stream.write_all(line).await;
    let _ = stream.shutdown().await;
}
