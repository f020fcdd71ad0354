//! TCP lobby-and-match server for generalized tic-tac-toe
//!
//! Clients speak newline-delimited JSON over a plain TCP socket: register a
//! name, browse or create games in the lobby, then play turn-by-turn until a
//! win, a draw, or a departure ends the match. A 2-player game runs on a 3x3
//! board, a 3-player game on 4x4; three in a row wins either way.

pub mod error;
pub mod protocol;
pub mod server;

pub use error::{GameError, Result};
pub use protocol::{ClientMessage, ServerMessage};
pub use server::GameServer;

/// Game server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Server listen address
    pub bind_addr: std::net::SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Maximum length of a single inbound line in bytes
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5001".parse().unwrap(),
            max_connections: 1000,
            max_line_bytes: protocol::MAX_LINE_BYTES,
        }
    }
}
