//! A single game's authoritative state and the operations that mutate it
//!
//! Board, roster, turn pointer and status all live behind one mutex; every
//! mutating operation captures its reply snapshot and the recipient list
//! under the same lock acquisition, so a broadcast composed from an outcome
//! is always self-consistent with the state that produced it.

use tokio::sync::{mpsc, Mutex};

use crate::error::{GameError, Result};
use crate::protocol::{
    EndResult, GameState, GameStatus, GameSummary, Mark, PlayerInfo, ServerMessage, EMPTY_CELL,
};

/// Opaque per-connection identity, never reused within a process run
pub type ConnId = u64;

/// Outbound message channel of one connection
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Number of consecutive marks required to win, independent of board size
pub const WIN_TARGET: usize = 3;

/// Mark alphabet; a match for `n` players uses the first `n` entries,
/// assigned by join order
pub const MARKS: [char; 3] = ['X', 'O', 'Δ'];

/// Scan directions for the win check: right, down, down-right, down-left
const DIRECTIONS: [(i64, i64); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// A player registered in a game
#[derive(Debug, Clone)]
pub struct Player {
    pub conn: ConnId,
    pub name: String,
    pub mark: Mark,
    pub tx: Outbound,
}

/// Delivery target captured from a game's roster under its lock
#[derive(Debug, Clone)]
pub struct Recipient {
    pub conn: ConnId,
    pub tx: Outbound,
}

/// Result of a successful join
#[derive(Debug)]
pub struct JoinOutcome {
    /// Mark assigned to the joiner
    pub mark: Mark,
    /// Whether this join filled the roster and started the game
    pub started: bool,
    pub snapshot: GameState,
    /// All current players, including the joiner
    pub recipients: Vec<Recipient>,
}

/// Result of a successful move
#[derive(Debug)]
pub enum MoveOutcome {
    /// The game continues; turn has advanced
    Update {
        snapshot: GameState,
        recipients: Vec<Recipient>,
    },
    /// The move ended the game with a win or a draw
    Finished {
        result: EndResult,
        snapshot: GameState,
        recipients: Vec<Recipient>,
    },
}

/// Result of removing a player
#[derive(Debug)]
pub struct LeaveOutcome {
    pub left_name: String,
    /// True when the removal forced the game to FINISHED with players
    /// remaining; those players get exactly one termination notice
    pub notify: bool,
    pub snapshot: GameState,
    /// Players remaining after the removal
    pub recipients: Vec<Recipient>,
}

/// State guarded by the game's lock
#[derive(Debug)]
struct GameInner {
    players: Vec<Player>,
    board: Vec<Vec<Option<Mark>>>,
    turn_index: usize,
    status: GameStatus,
}

/// One game instance: fixed identity plus lock-guarded mutable state
#[derive(Debug)]
pub struct Game {
    pub id: String,
    pub max_players: usize,
    pub board_size: usize,
    pub creator: String,
    /// Process-wide creation sequence, used to order lobby listings
    pub seq: u64,
    inner: Mutex<GameInner>,
}

impl Game {
    /// Create an empty WAITING game; `board_size = max_players + 1`
    pub fn new(id: String, max_players: usize, creator: String, seq: u64) -> Self {
        let board_size = max_players + 1;
        Self {
            id,
            max_players,
            board_size,
            creator,
            seq,
            inner: Mutex::new(GameInner {
                players: Vec::with_capacity(max_players),
                board: vec![vec![None; board_size]; board_size],
                turn_index: 0,
                status: GameStatus::Waiting,
            }),
        }
    }

    /// Add a player, assigning the next mark by join order
    ///
    /// When the join fills the roster the status flips to RUNNING and the
    /// turn pointer resets BEFORE the snapshot is taken, so every recipient
    /// observes a consistent started game.
    pub async fn join(&self, conn: ConnId, name: &str, tx: Outbound) -> Result<JoinOutcome> {
        let mut g = self.inner.lock().await;

        if g.status != GameStatus::Waiting {
            return Err(GameError::GameNotWaiting);
        }
        if g.players.len() >= self.max_players {
            return Err(GameError::GameFull);
        }

        let mark = Mark(MARKS[g.players.len()]);
        g.players.push(Player {
            conn,
            name: name.to_string(),
            mark,
            tx,
        });

        let started = g.players.len() == self.max_players;
        if started {
            g.status = GameStatus::Running;
            g.turn_index = 0;
        }

        Ok(JoinOutcome {
            mark,
            started,
            snapshot: self.snapshot_locked(&g),
            recipients: recipients_locked(&g),
        })
    }

    /// Place the calling player's mark at `(row, col)`
    pub async fn apply_move(&self, conn: ConnId, row: i64, col: i64) -> Result<MoveOutcome> {
        let mut g = self.inner.lock().await;

        if g.status != GameStatus::Running {
            return Err(GameError::GameNotRunning);
        }
        let mark = match g.players.get(g.turn_index) {
            Some(current) if current.conn == conn => current.mark,
            _ => return Err(GameError::NotYourTurn),
        };

        let size = self.board_size as i64;
        if row < 0 || row >= size || col < 0 || col >= size {
            return Err(GameError::OutOfBounds {
                board_size: self.board_size,
            });
        }
        let (r, c) = (row as usize, col as usize);
        if g.board[r][c].is_some() {
            return Err(GameError::CellTaken);
        }

        g.board[r][c] = Some(mark);

        if let Some(winner) = find_winner(&g.board) {
            g.status = GameStatus::Finished;
            Ok(MoveOutcome::Finished {
                result: EndResult::won(winner),
                snapshot: self.snapshot_locked(&g),
                recipients: recipients_locked(&g),
            })
        } else if board_full(&g.board) {
            g.status = GameStatus::Finished;
            Ok(MoveOutcome::Finished {
                result: EndResult::drawn(),
                snapshot: self.snapshot_locked(&g),
                recipients: recipients_locked(&g),
            })
        } else {
            g.turn_index = (g.turn_index + 1) % g.players.len();
            Ok(MoveOutcome::Update {
                snapshot: self.snapshot_locked(&g),
                recipients: recipients_locked(&g),
            })
        }
    }

    /// Remove a player regardless of status; `None` when the connection is
    /// not a member, which makes every exit path idempotent
    ///
    /// A removal from a WAITING or RUNNING game forces FINISHED; a removal
    /// from an already-FINISHED game is silent.
    pub async fn leave(&self, conn: ConnId) -> Option<LeaveOutcome> {
        let mut g = self.inner.lock().await;

        let idx = g.players.iter().position(|p| p.conn == conn)?;
        let left = g.players.remove(idx);

        if g.players.is_empty() {
            g.turn_index = 0;
        } else {
            g.turn_index %= g.players.len();
        }

        let was_active = matches!(g.status, GameStatus::Waiting | GameStatus::Running);
        g.status = GameStatus::Finished;

        Some(LeaveOutcome {
            left_name: left.name,
            notify: was_active && !g.players.is_empty(),
            snapshot: self.snapshot_locked(&g),
            recipients: recipients_locked(&g),
        })
    }

    /// Immutable view of the current state
    pub async fn snapshot(&self) -> GameState {
        let g = self.inner.lock().await;
        self.snapshot_locked(&g)
    }

    /// Lobby listing entry
    pub async fn summary(&self) -> GameSummary {
        let g = self.inner.lock().await;
        GameSummary {
            id: self.id.clone(),
            players: g.players.len(),
            max: self.max_players,
            status: g.status,
            creator: self.creator.clone(),
        }
    }

    pub async fn status(&self) -> GameStatus {
        self.inner.lock().await.status
    }

    pub async fn player_count(&self) -> usize {
        self.inner.lock().await.players.len()
    }

    fn snapshot_locked(&self, g: &GameInner) -> GameState {
        GameState {
            id: self.id.clone(),
            creator: self.creator.clone(),
            players: g
                .players
                .iter()
                .map(|p| PlayerInfo {
                    name: p.name.clone(),
                    mark: p.mark,
                })
                .collect(),
            max_players: self.max_players,
            board_size: self.board_size,
            board: g
                .board
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| match cell {
                            Some(mark) => mark.to_string(),
                            None => EMPTY_CELL.to_string(),
                        })
                        .collect()
                })
                .collect(),
            turn: g.players.get(g.turn_index).map(|p| p.mark),
            status: g.status,
        }
    }
}

fn recipients_locked(g: &GameInner) -> Vec<Recipient> {
    g.players
        .iter()
        .map(|p| Recipient {
            conn: p.conn,
            tx: p.tx.clone(),
        })
        .collect()
}

/// Scan the whole board for three consecutive identical marks
///
/// Position-major over cells, direction order right/down/down-right/down-left;
/// the first complete line found wins. Re-scans the full board on every call
/// for determinism, since a single move adds at most one mark.
fn find_winner(board: &[Vec<Option<Mark>>]) -> Option<Mark> {
    let n = board.len() as i64;
    let in_bounds = |r: i64, c: i64| r >= 0 && r < n && c >= 0 && c < n;

    for r in 0..board.len() {
        for c in 0..board[r].len() {
            let mark = match board[r][c] {
                Some(mark) => mark,
                None => continue,
            };
            for (dr, dc) in DIRECTIONS {
                let complete = (1..WIN_TARGET as i64).all(|k| {
                    let (rr, cc) = (r as i64 + dr * k, c as i64 + dc * k);
                    in_bounds(rr, cc) && board[rr as usize][cc as usize] == Some(mark)
                });
                if complete {
                    return Some(mark);
                }
            }
        }
    }
    None
}

fn board_full(board: &[Vec<Option<Mark>>]) -> bool {
    board.iter().all(|row| row.iter().all(|c| c.is_some()))
}
