//! Protocol message types for the lobby-and-match wire protocol
//!
//! One JSON object per line, tagged by a `type` field. Inbound and outbound
//! message kinds are closed tagged unions so the session handler can match
//! them exhaustively instead of dispatching on strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GameError;

/// Unique identifier for a registered game (6 uppercase hex chars)
pub type GameId = String;

/// Wire representation of an empty board cell
pub const EMPTY_CELL: &str = " ";

/// A player's board symbol (X, O or Δ), encoded as a one-character string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark(pub char);

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Accepting joins until the player limit is reached
    Waiting,
    /// Full roster, moves being played
    Running,
    /// Terminal; no further board mutation or status transition
    Finished,
}

/// A player entry inside a state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub mark: Mark,
}

/// Immutable point-in-time view of one game, sent in replies and broadcasts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub id: GameId,
    pub creator: String,
    pub players: Vec<PlayerInfo>,
    pub max_players: usize,
    pub board_size: usize,
    /// Row-major grid; empty cells are `" "`
    pub board: Vec<Vec<String>>,
    /// Mark whose turn it is, or `null` when the game has no players
    pub turn: Option<Mark>,
    pub status: GameStatus,
}

/// One entry of a lobby listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: GameId,
    /// Current player count
    pub players: usize,
    /// Player limit
    pub max: usize,
    pub status: GameStatus,
    pub creator: String,
}

/// Outcome carried by an END message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndResult {
    #[serde(default)]
    pub winner: Option<Mark>,
    #[serde(default)]
    pub draw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl EndResult {
    /// A win by the given mark
    pub fn won(mark: Mark) -> Self {
        Self {
            winner: Some(mark),
            draw: false,
            msg: Some(format!("Winner: {}", mark)),
        }
    }

    /// A full board with no three-in-a-row
    pub fn drawn() -> Self {
        Self {
            winner: None,
            draw: true,
            msg: Some("Draw.".to_string()),
        }
    }

    /// Termination without a result (a player left or disconnected)
    pub fn terminated(msg: impl Into<String>) -> Self {
        Self {
            winner: None,
            draw: false,
            msg: Some(msg.into()),
        }
    }
}

fn default_players() -> u8 {
    2
}

/// Client → server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Reserve a display name for this connection
    #[serde(rename = "HELLO")]
    Hello { name: String },

    /// List joinable (WAITING) games; valid in every state
    #[serde(rename = "LIST")]
    List,

    /// Create a new game for 2 or 3 players
    #[serde(rename = "CREATE")]
    Create {
        #[serde(default = "default_players")]
        players: u8,
    },

    /// Join a waiting game by id
    #[serde(rename = "JOIN")]
    Join { game_id: GameId },

    /// Place this player's mark; signed so negative coordinates report
    /// out-of-bounds rather than a parse failure
    #[serde(rename = "MOVE")]
    Move { row: i64, col: i64 },

    /// Leave the current game and return to the lobby
    #[serde(rename = "LEAVE")]
    Leave,

    /// Close the connection gracefully
    #[serde(rename = "QUIT")]
    Quit,
}

/// Server → client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Greeting sent once per connection, immediately after accept
    #[serde(rename = "WELCOME")]
    Welcome { msg: String },

    /// Positive acknowledgement; carries the game id after CREATE
    #[serde(rename = "OK")]
    Ok {
        msg: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_id: Option<GameId>,
    },

    /// Rejected request with a human-readable reason and an optional
    /// suggested next command
    #[serde(rename = "ERR")]
    Err {
        msg: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },

    /// Lobby listing reply
    #[serde(rename = "GAMES")]
    Games { games: Vec<GameSummary> },

    /// Join confirmation for the joining player
    #[serde(rename = "JOINED")]
    Joined {
        msg: String,
        you: PlayerInfo,
        state: GameState,
    },

    /// Broadcast while the game still waits for players
    #[serde(rename = "WAIT")]
    Wait { msg: String, state: GameState },

    /// Broadcast when the roster fills and the game starts
    #[serde(rename = "START")]
    Start { msg: String, state: GameState },

    /// Broadcast after a non-terminal state change
    #[serde(rename = "GAME_UPDATE")]
    GameUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
        state: GameState,
    },

    /// Broadcast when the game reaches FINISHED
    #[serde(rename = "END")]
    End { result: EndResult, state: GameState },
}

impl ServerMessage {
    /// Create a plain OK reply
    pub fn ok(msg: impl Into<String>) -> Self {
        ServerMessage::Ok {
            msg: msg.into(),
            game_id: None,
        }
    }

    /// Create an OK reply carrying a game id
    pub fn ok_with_game(msg: impl Into<String>, game_id: GameId) -> Self {
        ServerMessage::Ok {
            msg: msg.into(),
            game_id: Some(game_id),
        }
    }

    /// Create an ERR reply from an error's message and hint texts
    pub fn err(error: &GameError) -> Self {
        ServerMessage::Err {
            msg: error.message(),
            hint: error.hint(),
        }
    }
}
