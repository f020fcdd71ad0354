//! Error handling for the game server

use std::fmt;

/// Result type alias for game server operations
pub type Result<T> = std::result::Result<T, GameError>;

/// Game server error types
///
/// Precondition variants carry no payload; their user-facing text lives in
/// [`GameError::message`] and [`GameError::hint`] so wire replies stay
/// consistent everywhere they are produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// HELLO with an empty (or whitespace-only) name
    NameEmpty,
    /// HELLO with a name held by another live connection
    NameTaken,
    /// Repeated HELLO on an already-named connection
    NameAlreadySet,
    /// CREATE/JOIN/MOVE/LEAVE before a successful HELLO
    NotRegistered,
    /// CREATE/JOIN while already a member of a game
    AlreadyInGame,
    /// MOVE/LEAVE without a current game
    NotInGame,
    /// JOIN with an unknown game id
    GameNotFound,
    /// JOIN on a game that already started or finished
    GameNotWaiting,
    /// JOIN on a game at its player limit
    GameFull,
    /// MOVE on a game that is not RUNNING
    GameNotRunning,
    /// MOVE out of turn order
    NotYourTurn,
    /// MOVE with coordinates outside the board
    OutOfBounds { board_size: usize },
    /// MOVE targeting an occupied cell
    CellTaken,
    /// CREATE with a player count other than 2 or 3
    UnsupportedPlayerCount,
    /// Malformed or unparseable inbound message
    Protocol(String),
    /// Network-related errors
    Network(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Server internal error
    Internal(String),
}

impl GameError {
    /// Get the human-readable message for this error
    pub fn message(&self) -> String {
        match self {
            GameError::NameEmpty => "Name cannot be empty.".to_string(),
            GameError::NameTaken => "Name already exists.".to_string(),
            GameError::NameAlreadySet => "Name already set.".to_string(),
            GameError::NotRegistered => "You must set a unique name first.".to_string(),
            GameError::AlreadyInGame => "Already in a game.".to_string(),
            GameError::NotInGame => "Not in a game.".to_string(),
            GameError::GameNotFound => "Game not found.".to_string(),
            GameError::GameNotWaiting => "Game already started/finished.".to_string(),
            GameError::GameFull => "Game is full.".to_string(),
            GameError::GameNotRunning => "Game not running.".to_string(),
            GameError::NotYourTurn => "Not your turn.".to_string(),
            GameError::OutOfBounds { .. } => "Out of bounds.".to_string(),
            GameError::CellTaken => "Cell is not empty.".to_string(),
            GameError::UnsupportedPlayerCount => "Only 2 or 3 players supported.".to_string(),
            GameError::Protocol(msg) => msg.clone(),
            GameError::Network(msg) => msg.clone(),
            GameError::Serialization(msg) => msg.clone(),
            GameError::Internal(msg) => msg.clone(),
        }
    }

    /// Get the actionable hint for this error, when one exists
    pub fn hint(&self) -> Option<String> {
        match self {
            GameError::NameEmpty => Some("Enter a non-empty name.".to_string()),
            GameError::NameTaken => Some("Please choose a different name.".to_string()),
            GameError::NameAlreadySet => {
                Some("Continue in lobby (LIST/CREATE/JOIN) or QUIT.".to_string())
            }
            GameError::NotRegistered => Some("Send HELLO with your chosen name.".to_string()),
            GameError::AlreadyInGame => Some("Use LEAVE to return to lobby first.".to_string()),
            GameError::NotInGame => Some("Use LIST/CREATE/JOIN first.".to_string()),
            GameError::GameNotFound => Some("Use LIST to get a valid id.".to_string()),
            GameError::GameNotWaiting => Some("Use LIST to find a WAITING game.".to_string()),
            GameError::GameFull => Some("Use LIST and join another game.".to_string()),
            GameError::GameNotRunning => Some("Wait for START or JOIN another game.".to_string()),
            GameError::NotYourTurn => {
                Some("Wait for your turn (LEAVE or QUIT are always allowed).".to_string())
            }
            GameError::OutOfBounds { board_size } => Some(format!(
                "Use row/col in range 0..{}.",
                board_size.saturating_sub(1)
            )),
            GameError::CellTaken => Some("Choose a different empty cell.".to_string()),
            GameError::UnsupportedPlayerCount => Some("Use: CREATE 2  or  CREATE 3".to_string()),
            GameError::Protocol(_) => Some("Try again.".to_string()),
            GameError::Network(_) | GameError::Serialization(_) | GameError::Internal(_) => None,
        }
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        GameError::Protocol(msg.into())
    }

    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        GameError::Network(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        GameError::Serialization(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        GameError::Internal(msg.into())
    }
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            GameError::Network(msg) => write!(f, "Network error: {}", msg),
            GameError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            GameError::Internal(msg) => write!(f, "Internal error: {}", msg),
            other => write!(f, "{}", other.message()),
        }
    }
}

impl std::error::Error for GameError {}

impl From<std::io::Error> for GameError {
    fn from(err: std::io::Error) -> Self {
        GameError::Network(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        GameError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_errors_carry_hints() {
        assert!(GameError::NameTaken.hint().is_some());
        assert!(GameError::GameFull.hint().is_some());
        assert!(GameError::NotYourTurn.hint().is_some());
        assert!(GameError::internal("boom").hint().is_none());
    }

    #[test]
    fn out_of_bounds_hint_names_the_range() {
        let err = GameError::OutOfBounds { board_size: 4 };
        assert_eq!(err.hint().unwrap(), "Use row/col in range 0..3.");
    }

    #[test]
    fn io_errors_convert_to_network() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        match GameError::from(io) {
            GameError::Network(msg) => assert!(msg.contains("gone")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
