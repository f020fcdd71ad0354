//! Process-wide registries: games by id, display names in use
//!
//! Both registries guard their maps with their own lock, held only for the
//! duration of a lookup, insert or remove. Neither lock is ever held while a
//! game's lock is taken, and never across a network send.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{GameError, Result};
use crate::protocol::{GameStatus, GameSummary};
use crate::server::game::Game;

/// Supported player counts for a new game
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 3;

/// Registry of all currently-registered games
pub struct GameRegistry {
    games: RwLock<HashMap<String, Arc<Game>>>,
    /// Creation sequence, used to order lobby listings
    next_seq: AtomicU64,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self {
            games: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Create and register a new WAITING game
    ///
    /// Ids are six uppercase hex characters, re-rolled under the write lock
    /// until unused, so an id is unique among registered games and never
    /// reused while registered.
    pub async fn create(&self, max_players: usize, creator: &str) -> Result<Arc<Game>> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
            return Err(GameError::UnsupportedPlayerCount);
        }

        let mut games = self.games.write().await;
        let id = loop {
            let candidate = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
            if !games.contains_key(&candidate) {
                break candidate;
            }
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let game = Arc::new(Game::new(id.clone(), max_players, creator.to_string(), seq));
        games.insert(id, Arc::clone(&game));
        Ok(game)
    }

    /// Look up a game by id
    pub async fn find(&self, id: &str) -> Option<Arc<Game>> {
        self.games.read().await.get(id).cloned()
    }

    /// Summaries of joinable games, in creation order
    ///
    /// Only WAITING games appear; running and finished games are not
    /// joinable and never show up in lobby listings.
    pub async fn list_waiting(&self) -> Vec<GameSummary> {
        let games: Vec<Arc<Game>> = self.games.read().await.values().cloned().collect();

        let mut waiting = Vec::new();
        for game in games {
            let summary = game.summary().await;
            if summary.status == GameStatus::Waiting {
                waiting.push((game.seq, summary));
            }
        }
        waiting.sort_by_key(|(seq, _)| *seq);
        waiting.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Deregister a game once its player list is empty; redundant calls and
    /// unknown ids are no-ops
    pub async fn remove_if_empty(&self, id: &str) -> bool {
        let game = match self.find(id).await {
            Some(game) => game,
            None => return false,
        };
        if game.player_count().await > 0 {
            return false;
        }
        self.games.write().await.remove(id).is_some()
    }

    /// Number of registered games
    pub async fn len(&self) -> usize {
        self.games.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.games.read().await.is_empty()
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Set of display names held by live connections
pub struct NameRegistry {
    names: RwLock<HashSet<String>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self {
            names: RwLock::new(HashSet::new()),
        }
    }

    /// Reserve a trimmed display name for one connection
    pub async fn reserve(&self, name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(GameError::NameEmpty);
        }

        let mut names = self.names.write().await;
        if !names.insert(trimmed.to_string()) {
            return Err(GameError::NameTaken);
        }
        Ok(trimmed.to_string())
    }

    /// Release a reservation, making the name immediately reservable again
    pub async fn release(&self, name: &str) {
        self.names.write().await.remove(name);
    }

    /// Whether a name is currently reserved
    pub async fn is_reserved(&self, name: &str) -> bool {
        self.names.read().await.contains(name)
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::game::Outbound;
    use tokio::sync::mpsc;

    fn outbound() -> Outbound {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[tokio::test]
    async fn create_validates_player_count() {
        let registry = GameRegistry::new();
        for count in [0, 1, 4, 10] {
            let err = registry.create(count, "alice").await.unwrap_err();
            assert_eq!(err, GameError::UnsupportedPlayerCount);
        }
        assert!(registry.is_empty().await);

        let game = registry.create(2, "alice").await.unwrap();
        assert_eq!(game.board_size, 3);
        assert_eq!(game.creator, "alice");
        assert_eq!(game.id.len(), 6);
        assert!(game.id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn find_returns_registered_games() {
        let registry = GameRegistry::new();
        let game = registry.create(2, "alice").await.unwrap();
        assert!(registry.find(&game.id).await.is_some());
        assert!(registry.find("NOSUCH").await.is_none());
    }

    #[tokio::test]
    async fn listing_shows_only_waiting_games_in_creation_order() {
        let registry = GameRegistry::new();
        let first = registry.create(2, "alice").await.unwrap();
        let second = registry.create(3, "bob").await.unwrap();
        let third = registry.create(2, "carol").await.unwrap();

        // Fill the second game so it starts running.
        second.join(1, "bob", outbound()).await.unwrap();
        second.join(2, "dave", outbound()).await.unwrap();
        second.join(3, "erin", outbound()).await.unwrap();

        let listing = registry.list_waiting().await;
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].id, first.id);
        assert_eq!(listing[1].id, third.id);
        assert!(listing.iter().all(|s| s.status == GameStatus::Waiting));
    }

    #[tokio::test]
    async fn remove_if_empty_only_removes_empty_games() {
        let registry = GameRegistry::new();
        let game = registry.create(2, "alice").await.unwrap();
        game.join(1, "alice", outbound()).await.unwrap();

        assert!(!registry.remove_if_empty(&game.id).await);
        assert!(registry.find(&game.id).await.is_some());

        game.leave(1).await;
        assert!(registry.remove_if_empty(&game.id).await);
        assert!(registry.find(&game.id).await.is_none());

        // Redundant and unknown-id calls are safe no-ops.
        assert!(!registry.remove_if_empty(&game.id).await);
        assert!(!registry.remove_if_empty("NOSUCH").await);
    }

    #[tokio::test]
    async fn names_are_exclusive_until_released() {
        let names = NameRegistry::new();
        assert_eq!(names.reserve("alice").await.unwrap(), "alice");
        assert_eq!(names.reserve("alice").await.unwrap_err(), GameError::NameTaken);
        assert!(names.is_reserved("alice").await);

        names.release("alice").await;
        assert!(!names.is_reserved("alice").await);
        assert!(names.reserve("alice").await.is_ok());
    }

    #[tokio::test]
    async fn name_reservation_trims_whitespace() {
        let names = NameRegistry::new();
        assert_eq!(names.reserve("  alice  ").await.unwrap(), "alice");
        assert_eq!(names.reserve("alice").await.unwrap_err(), GameError::NameTaken);

        for blank in ["", "   ", "\t\n"] {
            assert_eq!(names.reserve(blank).await.unwrap_err(), GameError::NameEmpty);
        }
    }
}
