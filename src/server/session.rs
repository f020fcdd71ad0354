//! Per-connection session handler
//!
//! One session task per accepted socket. The read half feeds the line codec;
//! decoded messages are dispatched against the session's state (unregistered,
//! in the lobby, or in a game). A separate writer task drains the outbound
//! channel into the write half, so a slow peer only stalls its own writer.
//!
//! All three exit paths (LEAVE, QUIT, abrupt disconnect) converge on the same
//! depart routine, and teardown always releases the reserved name, so neither
//! a game membership nor a name can outlive its connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{GameError, Result};
use crate::protocol::{
    codec, ClientMessage, EndResult, LineCodec, PlayerInfo, ServerMessage,
};
use crate::server::game::{ConnId, Game, MoveOutcome, Outbound, Recipient};
use crate::server::registry::{GameRegistry, NameRegistry};

/// Read buffer size for the session loop
const READ_BUF_SIZE: usize = 4096;

/// Whether the control loop should keep reading after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Per-connection control loop state
pub struct Session {
    conn: ConnId,
    addr: SocketAddr,
    games: Arc<GameRegistry>,
    names: Arc<NameRegistry>,
    outbound: Outbound,
    /// Reserved display name; `None` while unregistered
    name: Option<String>,
    /// Current game membership; at most one at a time
    current: Option<Arc<Game>>,
}

impl Session {
    pub fn new(
        conn: ConnId,
        addr: SocketAddr,
        games: Arc<GameRegistry>,
        names: Arc<NameRegistry>,
        outbound: Outbound,
    ) -> Self {
        Self {
            conn,
            addr,
            games,
            names,
            outbound,
            name: None,
            current: None,
        }
    }

    /// Drive the connection to completion: greet, read until EOF/QUIT/error,
    /// then tear down
    pub async fn run(
        mut self,
        stream: TcpStream,
        outbound_rx: mpsc::UnboundedReceiver<ServerMessage>,
        max_line_bytes: usize,
    ) {
        let (read_half, write_half) = stream.into_split();
        let writer = tokio::spawn(write_loop(write_half, outbound_rx));

        let _ = self.send(ServerMessage::Welcome {
            msg: "Connected to server.".to_string(),
        });

        if let Err(err) = self.read_loop(read_half, max_line_bytes).await {
            debug!(conn = self.conn, addr = %self.addr, %err, "session loop ended with error");
        }

        self.teardown().await;

        // Dropping the session drops its outbound sender; once every clone
        // held by game rosters is gone too, the writer drains and exits.
        drop(self);
        let _ = writer.await;
    }

    async fn read_loop(&mut self, mut read_half: OwnedReadHalf, max_line_bytes: usize) -> Result<()> {
        let mut line_codec = LineCodec::with_limit(max_line_bytes);
        let mut buf = vec![0u8; READ_BUF_SIZE];

        loop {
            let n = read_half.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            line_codec.feed(&buf[..n]);

            while let Some(line) = line_codec.next_line()? {
                let flow = match codec::decode(&line) {
                    Ok(msg) => self.handle(msg).await?,
                    Err(err) => {
                        debug!(conn = self.conn, %err, "rejected inbound line");
                        self.send(ServerMessage::err(&err))?;
                        Flow::Continue
                    }
                };
                if flow == Flow::Quit {
                    return Ok(());
                }
            }
        }
    }

    /// Dispatch one inbound message
    ///
    /// Precondition violations are answered with ERR and never mutate shared
    /// state; only a dead outbound channel is a fatal error here.
    async fn handle(&mut self, msg: ClientMessage) -> Result<Flow> {
        let outcome = match msg {
            ClientMessage::Hello { name } => self.on_hello(&name).await,
            ClientMessage::List => self.on_list().await,
            ClientMessage::Create { players } => self.on_create(players as usize).await,
            ClientMessage::Join { game_id } => self.on_join(&game_id).await,
            ClientMessage::Move { row, col } => self.on_move(row, col).await,
            ClientMessage::Leave => self.on_leave().await,
            ClientMessage::Quit => {
                self.send(ServerMessage::ok("Bye"))?;
                return Ok(Flow::Quit);
            }
        };

        match outcome {
            Ok(()) => Ok(Flow::Continue),
            Err(err @ GameError::Network(_)) => Err(err),
            Err(err) => {
                self.send(ServerMessage::err(&err))?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_hello(&mut self, name: &str) -> Result<()> {
        if self.name.is_some() {
            return Err(GameError::NameAlreadySet);
        }

        let reserved = self.names.reserve(name).await?;
        info!(conn = self.conn, addr = %self.addr, name = %reserved, "name registered");
        let greeting = format!("Hello {}.", reserved);
        self.name = Some(reserved);
        self.send(ServerMessage::ok(greeting))
    }

    async fn on_list(&mut self) -> Result<()> {
        let games = self.games.list_waiting().await;
        self.send(ServerMessage::Games { games })
    }

    async fn on_create(&mut self, players: usize) -> Result<()> {
        let name = self.name.clone().ok_or(GameError::NotRegistered)?;
        self.sweep_finished().await;
        if self.current.is_some() {
            return Err(GameError::AlreadyInGame);
        }

        let game = self.games.create(players, &name).await?;
        info!(conn = self.conn, game = %game.id, max_players = game.max_players, "game created");
        self.send(ServerMessage::ok_with_game("Game created.", game.id.clone()))
    }

    async fn on_join(&mut self, game_id: &str) -> Result<()> {
        let name = self.name.clone().ok_or(GameError::NotRegistered)?;
        self.sweep_finished().await;
        if self.current.is_some() {
            return Err(GameError::AlreadyInGame);
        }

        let game = self
            .games
            .find(game_id)
            .await
            .ok_or(GameError::GameNotFound)?;
        let outcome = game.join(self.conn, &name, self.outbound.clone()).await?;
        self.current = Some(Arc::clone(&game));
        info!(
            conn = self.conn,
            game = %game.id,
            mark = %outcome.mark,
            started = outcome.started,
            "player joined"
        );

        self.send(ServerMessage::Joined {
            msg: format!("Joined game {} as {}.", game.id, outcome.mark),
            you: PlayerInfo {
                name: name.clone(),
                mark: outcome.mark,
            },
            state: outcome.snapshot.clone(),
        })?;

        let mut dead = deliver_except(
            &outcome.recipients,
            self.conn,
            ServerMessage::GameUpdate {
                msg: Some(format!("{} joined as {}.", name, outcome.mark)),
                state: outcome.snapshot.clone(),
            },
        );

        let everyone = if outcome.started {
            ServerMessage::Start {
                msg: "Game started! X plays first.".to_string(),
                state: outcome.snapshot,
            }
        } else {
            ServerMessage::Wait {
                msg: "Waiting for more players...".to_string(),
                state: outcome.snapshot,
            }
        };
        dead.extend(deliver(&outcome.recipients, everyone));

        self.reap_dead(&game, dead).await;
        Ok(())
    }

    async fn on_move(&mut self, row: i64, col: i64) -> Result<()> {
        let game = self.current.clone().ok_or(GameError::NotInGame)?;

        match game.apply_move(self.conn, row, col).await? {
            MoveOutcome::Update {
                snapshot,
                recipients,
            } => {
                let dead = deliver(
                    &recipients,
                    ServerMessage::GameUpdate {
                        msg: None,
                        state: snapshot,
                    },
                );
                self.reap_dead(&game, dead).await;
            }
            MoveOutcome::Finished {
                result,
                snapshot,
                recipients,
            } => {
                info!(conn = self.conn, game = %game.id, winner = ?result.winner, draw = result.draw, "game finished");
                let dead = deliver(
                    &recipients,
                    ServerMessage::End {
                        result,
                        state: snapshot,
                    },
                );
                self.reap_dead(&game, dead).await;
            }
        }
        Ok(())
    }

    async fn on_leave(&mut self) -> Result<()> {
        let game = self.current.take().ok_or(GameError::NotInGame)?;
        self.depart(&game, "left").await;
        self.send(ServerMessage::ok("Left game. You can LIST/CREATE/JOIN again."))
    }

    /// Remove this connection from a game and, when the removal terminates a
    /// game others are still in, notify each of them exactly once
    ///
    /// Shared by LEAVE, QUIT and abrupt disconnect; a repeat call finds the
    /// player already absent and does nothing.
    async fn depart(&mut self, game: &Arc<Game>, verb: &str) {
        if let Some(outcome) = game.leave(self.conn).await {
            info!(conn = self.conn, game = %game.id, name = %outcome.left_name, verb, "player departed");
            if outcome.notify {
                let notice = ServerMessage::End {
                    result: EndResult::terminated(format!(
                        "Player {} {}. Game ended.",
                        outcome.left_name, verb
                    )),
                    state: outcome.snapshot,
                };
                let dead = deliver(&outcome.recipients, notice);
                self.reap_dead(game, dead).await;
            }
        }
        self.games.remove_if_empty(&game.id).await;
    }

    /// Quietly drop a finished game before CREATE/JOIN, returning the
    /// session to the lobby; a finished game never blocks a new one
    async fn sweep_finished(&mut self) {
        let finished = match &self.current {
            Some(game) => game.status().await == crate::protocol::GameStatus::Finished,
            None => false,
        };
        if finished {
            if let Some(game) = self.current.take() {
                game.leave(self.conn).await;
                self.games.remove_if_empty(&game.id).await;
            }
        }
    }

    /// Process connections whose delivery failed, exactly like disconnects
    ///
    /// Runs after a broadcast loop completes, never nested inside one. A
    /// termination notice sent here can itself reveal more dead connections;
    /// those removals are silent because the game is already finished, so
    /// the worklist always drains.
    async fn reap_dead(&self, game: &Arc<Game>, dead: Vec<ConnId>) {
        if dead.is_empty() {
            return;
        }

        let mut queue = dead;
        while let Some(conn) = queue.pop() {
            if let Some(outcome) = game.leave(conn).await {
                warn!(conn, game = %game.id, name = %outcome.left_name, "dropping dead connection");
                if outcome.notify {
                    let notice = ServerMessage::End {
                        result: EndResult::terminated("A player disconnected. Game ended."),
                        state: outcome.snapshot,
                    };
                    queue.extend(deliver(&outcome.recipients, notice));
                }
            }
        }
        self.games.remove_if_empty(&game.id).await;
    }

    /// Release everything this connection holds; runs on every exit path
    async fn teardown(&mut self) {
        if let Some(game) = self.current.take() {
            self.depart(&game, "disconnected").await;
        }
        if let Some(name) = self.name.take() {
            self.names.release(&name).await;
        }
    }

    fn send(&self, msg: ServerMessage) -> Result<()> {
        self.outbound
            .send(msg)
            .map_err(|_| GameError::network("outbound channel closed"))
    }
}

/// Attempt delivery to every recipient, returning the connections whose
/// channel was closed; never aborts early on a failure
fn deliver(recipients: &[Recipient], msg: ServerMessage) -> Vec<ConnId> {
    let mut dead = Vec::new();
    for recipient in recipients {
        if recipient.tx.send(msg.clone()).is_err() {
            dead.push(recipient.conn);
        }
    }
    dead
}

fn deliver_except(recipients: &[Recipient], skip: ConnId, msg: ServerMessage) -> Vec<ConnId> {
    let mut dead = Vec::new();
    for recipient in recipients {
        if recipient.conn == skip {
            continue;
        }
        if recipient.tx.send(msg.clone()).is_err() {
            dead.push(recipient.conn);
        }
    }
    dead
}

/// Drain one connection's outbound channel into its socket write half
///
/// A write failure ends the task and drops the receiver, so later sends
/// into this connection fail fast and mark it dead.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = rx.recv().await {
        let data = match codec::encode(&msg) {
            Ok(data) => data,
            Err(err) => {
                error!(%err, "failed to encode outbound message");
                continue;
            }
        };
        if write_half.write_all(&data).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GameState, GameStatus};

    fn recipient(conn: ConnId) -> (Recipient, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Recipient { conn, tx }, rx)
    }

    fn dead_recipient(conn: ConnId) -> Recipient {
        let (tx, _rx) = mpsc::unbounded_channel();
        Recipient { conn, tx }
    }

    fn state() -> GameState {
        GameState {
            id: "A1B2C3".to_string(),
            creator: "alice".to_string(),
            players: vec![],
            max_players: 2,
            board_size: 3,
            board: vec![vec![" ".to_string(); 3]; 3],
            turn: None,
            status: GameStatus::Waiting,
        }
    }

    #[tokio::test]
    async fn deliver_reaches_all_live_recipients() {
        let (a, mut rx_a) = recipient(1);
        let (b, mut rx_b) = recipient(2);
        let msg = ServerMessage::Wait {
            msg: "Waiting for more players...".to_string(),
            state: state(),
        };

        let dead = deliver(&[a, b], msg);
        assert!(dead.is_empty());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn deliver_collects_dead_without_aborting() {
        let (a, mut rx_a) = recipient(1);
        let dead_conn = dead_recipient(2);
        let (c, mut rx_c) = recipient(3);

        let dead = deliver(&[a, dead_conn, c], ServerMessage::ok("hi"));
        assert_eq!(dead, vec![2]);
        // The failure in the middle did not stop delivery to the rest.
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn deliver_except_skips_the_origin_connection() {
        let (a, mut rx_a) = recipient(1);
        let (b, mut rx_b) = recipient(2);

        let dead = deliver_except(&[a, b], 1, ServerMessage::ok("hi"));
        assert!(dead.is_empty());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }
}
