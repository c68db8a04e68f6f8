//! # Identifier Rewriting
//!
//! Every backend assigns the player its own entity id, item runtime ids and
//! dimension. The client only ever learns the values of the first backend it
//! joined, so packets crossing the proxy have those fields translated between
//! the client's view and the current backend's view.
//!
//! A [`RewriteData`] is an immutable snapshot of one backend's mapping. The
//! player holds exactly one active snapshot; a transfer builds a fresh one
//! for the new backend and swaps it in together with the server connection.

pub mod inject;

use std::collections::HashMap;
use std::sync::Arc;
use tideway_core::{Direction, Vector3f};
use tideway_protocol::{dimension, GameRule, ItemEntry, Packet, StartGame};

/// Chunk radius assumed until the client asks for one
pub const DEFAULT_CHUNK_RADIUS: i32 = 8;

const SHIELD_IDENTIFIER: &str = "minecraft:shield";

/// Swap an identifier between two id spaces
///
/// `from == origin` becomes `rewritten`, `from == rewritten` becomes `origin`,
/// anything else is left alone. The swap is symmetric, so the same call works
/// in both directions.
#[inline]
pub fn rewrite_id(from: i64, rewritten: i64, origin: i64) -> i64 {
    if from == origin {
        rewritten
    } else if from == rewritten {
        origin
    } else {
        from
    }
}

/// Dimension used for the intermediate dimension change of a transfer
///
/// The client only rebuilds its world on a change to a *different* dimension.
pub fn determine_dimension_id(from: i32) -> i32 {
    if from == dimension::OVERWORLD {
        dimension::NETHER
    } else {
        dimension::OVERWORLD
    }
}

fn rewrite_field(field: &mut i64, rewritten: i64, origin: i64) -> bool {
    let value = rewrite_id(*field, rewritten, origin);
    if value != *field {
        *field = value;
        true
    } else {
        false
    }
}

/// Item runtime id translation between the client's palette and a backend's
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemMap {
    to_client: HashMap<i32, i32>,
    to_backend: HashMap<i32, i32>,
}

impl ItemMap {
    /// Build the map for a backend palette
    ///
    /// Items are matched by identifier. Returns `None` when every shared item
    /// already has the same runtime id on both sides.
    pub fn between(client: &[ItemEntry], backend: &[ItemEntry]) -> Option<Self> {
        let client_ids: HashMap<&str, i32> = client
            .iter()
            .map(|entry| (entry.identifier.as_str(), i32::from(entry.runtime_id)))
            .collect();

        let mut map = Self::default();
        for entry in backend {
            let Some(&client_id) = client_ids.get(entry.identifier.as_str()) else {
                continue;
            };
            let backend_id = i32::from(entry.runtime_id);
            if client_id != backend_id {
                map.to_client.insert(backend_id, client_id);
                map.to_backend.insert(client_id, backend_id);
            }
        }

        if map.to_client.is_empty() {
            None
        } else {
            Some(map)
        }
    }

    /// Translate one item id for packets travelling in `direction`
    pub fn translate(&self, id: i32, direction: Direction) -> i32 {
        let table = match direction {
            Direction::Downstream => &self.to_client,
            Direction::Upstream => &self.to_backend,
        };
        table.get(&id).copied().unwrap_or(id)
    }

    fn rewrite(&self, item_id: &mut i32, direction: Direction) -> bool {
        let value = self.translate(*item_id, direction);
        if value != *item_id {
            *item_id = value;
            true
        } else {
            false
        }
    }
}

/// Mapping between the client's view and the current backend's view
#[derive(Debug, Clone, Default)]
pub struct RewriteData {
    /// Entity id the client was given by its first backend
    pub entity_id: i64,
    /// Entity id assigned by the current backend
    pub backend_entity_id: i64,
    /// Dimension the client believes it is in
    pub dimension: i32,
    pub spawn_position: Vector3f,
    pub rotation: Vector3f,
    pub game_mode: i32,
    pub difficulty: i32,
    pub game_rules: Vec<GameRule>,
    /// Radius last requested by the client
    pub chunk_radius: Option<i32>,
    /// Item palette the client received on join
    pub item_palette: Arc<Vec<ItemEntry>>,
    pub item_map: Option<Arc<ItemMap>>,
    /// Runtime id of the shield on the current backend
    pub shield_blocking_id: Option<i32>,
}

fn shield_id(palette: &[ItemEntry]) -> Option<i32> {
    palette
        .iter()
        .find(|entry| entry.identifier == SHIELD_IDENTIFIER)
        .map(|entry| i32::from(entry.runtime_id))
}

impl RewriteData {
    /// Mapping for the first backend: the client adopts its ids as-is
    pub fn from_start_game(start_game: &StartGame) -> Self {
        Self {
            entity_id: start_game.runtime_entity_id,
            backend_entity_id: start_game.runtime_entity_id,
            dimension: start_game.dimension,
            spawn_position: start_game.player_position,
            rotation: Vector3f::new(start_game.pitch, start_game.yaw, start_game.yaw),
            game_mode: start_game.game_mode,
            difficulty: start_game.difficulty,
            game_rules: start_game.game_rules.clone(),
            chunk_radius: None,
            item_palette: Arc::new(start_game.item_palette.clone()),
            item_map: None,
            shield_blocking_id: shield_id(&start_game.item_palette),
        }
    }

    /// Mapping for a backend joined through a transfer
    ///
    /// Keeps the client-side ids of `self` and records the new backend's. The
    /// dimension becomes the intermediate one the client is moved into.
    pub fn for_transfer(&self, start_game: &StartGame) -> Self {
        Self {
            entity_id: self.entity_id,
            backend_entity_id: start_game.runtime_entity_id,
            dimension: determine_dimension_id(self.dimension),
            spawn_position: start_game.player_position,
            rotation: Vector3f::new(start_game.pitch, start_game.yaw, start_game.yaw),
            game_mode: start_game.game_mode,
            difficulty: start_game.difficulty,
            game_rules: start_game.game_rules.clone(),
            chunk_radius: self.chunk_radius,
            item_palette: self.item_palette.clone(),
            item_map: ItemMap::between(&self.item_palette, &start_game.item_palette).map(Arc::new),
            shield_blocking_id: shield_id(&start_game.item_palette),
        }
    }

    /// Radius sent in chunk publisher updates, in blocks
    pub fn chunk_radius_size(&self) -> u32 {
        let chunks = self.chunk_radius.unwrap_or(DEFAULT_CHUNK_RADIUS).max(1);
        chunks.unsigned_abs() * 16
    }

    pub fn rewrite_entity_id(&self, id: i64) -> i64 {
        rewrite_id(id, self.entity_id, self.backend_entity_id)
    }

    /// Translate every id-carrying field of `packet`
    ///
    /// Returns whether anything changed.
    pub fn rewrite_packet(&self, packet: &mut Packet, direction: Direction) -> bool {
        let (to, from) = (self.entity_id, self.backend_entity_id);
        let items = self.item_map.as_deref();

        match packet {
            Packet::AddEntity {
                unique_entity_id,
                runtime_entity_id,
                ..
            } => rewrite_field(unique_entity_id, to, from) | rewrite_field(runtime_entity_id, to, from),
            Packet::RemoveEntity { unique_entity_id } => rewrite_field(unique_entity_id, to, from),
            Packet::MoveEntityAbsolute { runtime_entity_id, .. }
            | Packet::SetEntityData { runtime_entity_id, .. }
            | Packet::SetEntityMotion { runtime_entity_id, .. }
            | Packet::MobEffect { runtime_entity_id, .. }
            | Packet::SetLocalPlayerAsInitialized { runtime_entity_id } => {
                rewrite_field(runtime_entity_id, to, from)
            }
            Packet::MovePlayer {
                runtime_entity_id,
                riding_runtime_entity_id,
                ..
            } => {
                rewrite_field(runtime_entity_id, to, from) | rewrite_field(riding_runtime_entity_id, to, from)
            }
            Packet::MobEquipment {
                runtime_entity_id,
                item_id,
                ..
            } => {
                let moved = rewrite_field(runtime_entity_id, to, from);
                let item = items.is_some_and(|map| map.rewrite(item_id, direction));
                moved | item
            }
            Packet::InventorySlot { item_id, .. } => items.is_some_and(|map| map.rewrite(item_id, direction)),
            Packet::BossEvent {
                boss_unique_entity_id,
                ..
            } => rewrite_field(boss_unique_entity_id, to, from),
            Packet::PlayerList { entries, .. } => entries
                .iter_mut()
                .fold(false, |changed, entry| {
                    rewrite_field(&mut entry.unique_entity_id, to, from) | changed
                }),
            _ => false,
        }
    }
}
