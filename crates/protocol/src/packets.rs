//! # Packet Identifiers
//!
//! Numeric IDs of every packet the proxy decodes. Anything else is carried as
//! [`crate::Packet::Unknown`] and forwarded byte-for-byte.
//!
//! ## Categories
//!
//! - **Session**: login, play status, disconnect
//! - **World setup**: start game, dimension change, chunks, chunk radius
//! - **Entities**: add/remove/move, effects, metadata, equipment
//! - **Client UI state**: boss bars, scoreboards, player list, sounds, weather

/// Packet type enumeration for all decoded packets
///
/// IDs are shared by both directions; a few packets (chunk radius request,
/// local player initialized) only ever travel upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketId {
    //=== Session ===//

    /// First packet sent by the client, replayed to every backend
    Login = 0x01,

    /// Login/spawn progress (`PlayerSpawn` ends a join)
    PlayStatus = 0x02,

    /// Kick with a message
    Disconnect = 0x05,

    //=== World setup ===//

    /// Backend's description of the world and of the player entity
    StartGame = 0x0b,

    //=== Entities ===//

    AddEntity = 0x0d,
    RemoveEntity = 0x0e,
    MoveEntityAbsolute = 0x12,
    MovePlayer = 0x13,

    /// Weather, particles and other world effects
    LevelEvent = 0x19,

    MobEffect = 0x1c,
    MobEquipment = 0x1f,
    InventorySlot = 0x32,
    SetEntityData = 0x27,
    SetEntityMotion = 0x28,

    //=== World setup (continued) ===//

    LevelChunk = 0x3a,
    SetDifficulty = 0x3c,
    ChangeDimension = 0x3d,
    SetPlayerGameType = 0x3e,

    //=== Client UI state ===//

    PlayerList = 0x3f,

    /// Client asks for a view distance (upstream only)
    RequestChunkRadius = 0x45,

    /// Backend's answer to a chunk radius request
    ChunkRadiusUpdated = 0x46,

    GameRulesChanged = 0x48,
    BossEvent = 0x4a,
    StopSound = 0x57,
    RemoveObjective = 0x6a,
    SetDisplayObjective = 0x6b,

    /// Client finished loading the world (upstream only)
    SetLocalPlayerAsInitialized = 0x71,

    /// Tells the client which chunks around a point to keep loaded
    NetworkChunkPublisherUpdate = 0x79,
}

impl PacketId {
    /// Convert to the on-wire ID
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Look up a known packet ID
    pub fn from_u32(id: u32) -> Option<Self> {
        let id = match id {
            0x01 => Self::Login,
            0x02 => Self::PlayStatus,
            0x05 => Self::Disconnect,
            0x0b => Self::StartGame,
            0x0d => Self::AddEntity,
            0x0e => Self::RemoveEntity,
            0x12 => Self::MoveEntityAbsolute,
            0x13 => Self::MovePlayer,
            0x19 => Self::LevelEvent,
            0x1c => Self::MobEffect,
            0x1f => Self::MobEquipment,
            0x27 => Self::SetEntityData,
            0x28 => Self::SetEntityMotion,
            0x32 => Self::InventorySlot,
            0x3a => Self::LevelChunk,
            0x3c => Self::SetDifficulty,
            0x3d => Self::ChangeDimension,
            0x3e => Self::SetPlayerGameType,
            0x3f => Self::PlayerList,
            0x45 => Self::RequestChunkRadius,
            0x46 => Self::ChunkRadiusUpdated,
            0x48 => Self::GameRulesChanged,
            0x4a => Self::BossEvent,
            0x57 => Self::StopSound,
            0x6a => Self::RemoveObjective,
            0x6b => Self::SetDisplayObjective,
            0x71 => Self::SetLocalPlayerAsInitialized,
            0x79 => Self::NetworkChunkPublisherUpdate,
            _ => return None,
        };
        Some(id)
    }
}

/// `PlayStatus` values
pub mod play_status {
    pub const LOGIN_SUCCESS: i32 = 0;
    pub const FAILED_CLIENT: i32 = 1;
    pub const FAILED_SERVER: i32 = 2;
    pub const PLAYER_SPAWN: i32 = 3;
}

/// `LevelEvent` types used by the proxy
pub mod level_event {
    pub const START_RAINING: i32 = 3001;
    pub const START_THUNDERSTORM: i32 = 3002;
    pub const STOP_RAINING: i32 = 3003;
    pub const STOP_THUNDERSTORM: i32 = 3004;
}

/// `MobEffect` events
pub mod mob_effect_event {
    pub const ADD: u8 = 1;
    pub const MODIFY: u8 = 2;
    pub const REMOVE: u8 = 3;
}

/// `MovePlayer` modes
pub mod move_mode {
    pub const NORMAL: u8 = 0;
    pub const RESPAWN: u8 = 1;
    pub const TELEPORT: u8 = 2;
    pub const HEAD_ROTATION: u8 = 3;
}

/// `BossEvent` actions
pub mod boss_event_action {
    pub const CREATE: u32 = 0;
    pub const REGISTER_PLAYER: u32 = 1;
    pub const REMOVE: u32 = 2;
    pub const UNREGISTER_PLAYER: u32 = 3;
}

/// `PlayerList` actions
pub mod player_list_action {
    pub const ADD: u8 = 0;
    pub const REMOVE: u8 = 1;
}

/// Entity metadata keys touched by the effect reset
pub mod entity_data {
    pub const EFFECT_COLOR: u32 = 8;
    pub const EFFECT_AMBIENT: u32 = 9;
    pub const POTION_AUX_VALUE: u32 = 36;
}

/// Dimension IDs
pub mod dimension {
    pub const OVERWORLD: i32 = 0;
    pub const NETHER: i32 = 1;
    pub const THE_END: i32 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ids_resolve() {
        for id in [PacketId::Login, PacketId::StartGame, PacketId::ChangeDimension, PacketId::NetworkChunkPublisherUpdate] {
            assert_eq!(PacketId::from_u32(id.as_u32()), Some(id));
        }
    }

    #[test]
    fn test_unknown_id() {
        assert_eq!(PacketId::from_u32(0xFFFF), None);
    }
}
