//! # Player Manager
//!
//! This module tracks every player currently connected through the proxy.

use crate::player::ProxiedPlayer;
use std::sync::Arc;
use tideway_core::PlayerId;

/// Player Manager
///
/// # Purpose
/// Tracks all connected players and provides lookup by id and by name.
///
/// # Thread Safety
/// All operations are thread-safe using DashMap for concurrent access.
#[derive(Default)]
pub struct PlayerManager {
    /// Key: PlayerId, Value: Player handle
    players: dashmap::DashMap<PlayerId, Arc<ProxiedPlayer>>,

    /// Key: lowercase name, Value: PlayerId
    names: dashmap::DashMap<String, PlayerId>,
}

impl PlayerManager {
    /// Create a new player manager
    #[inline]
    pub fn new() -> Self {
        tracing::debug!("Creating PlayerManager");
        Self::default()
    }

    /// Add a player to the manager
    ///
    /// # Returns
    /// `false` if another player with the same name is already online
    pub fn add_player(&self, player: Arc<ProxiedPlayer>) -> bool {
        let key = player.name().to_ascii_lowercase();
        match self.names.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                tracing::debug!("Adding player {} ({})", player.name(), player.id());
                entry.insert(player.id());
                self.players.insert(player.id(), player);
                true
            }
        }
    }

    /// Remove a player from the manager
    pub fn remove_player(&self, id: PlayerId) -> Option<Arc<ProxiedPlayer>> {
        let (_, player) = self.players.remove(&id)?;
        tracing::debug!("Removing player {} ({})", player.name(), id);
        self.names.remove_if(&player.name().to_ascii_lowercase(), |_, owner| *owner == id);
        Some(player)
    }

    /// Get a player by ID
    #[inline]
    pub fn get_player(&self, id: PlayerId) -> Option<Arc<ProxiedPlayer>> {
        self.players.get(&id).map(|entry| entry.clone())
    }

    /// Get a player by name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<Arc<ProxiedPlayer>> {
        let id = *self.names.get(&name.to_ascii_lowercase())?;
        self.get_player(id)
    }

    /// Snapshot of all players
    pub fn players(&self) -> Vec<Arc<ProxiedPlayer>> {
        self.players.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Get the number of players
    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}
