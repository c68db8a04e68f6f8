//! # Packet Builder
//!
//! Builders for the packets the proxy injects on its own, mostly to wipe
//! client-side state left behind by the previous backend during a transfer.
//!
//! Builders only construct packets. Sending them (and skipping closed
//! sessions) is the caller's job.

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::OnceLock;
use tideway_core::{Vector3f, Vector3i};
use uuid::Uuid;

use super::{codecs::*, packet_types::*, packets::*};

/// Number of mob effect IDs cleared when a player changes server
pub const MOB_EFFECT_COUNT: i32 = 28;

/// Radius (in chunks) of the fake world sent during a dimension change
pub const DIMENSION_CHANGE_RADIUS: i32 = 4;

/// Sound stopped once a transfer completes
pub const PORTAL_TRAVEL_SOUND: &str = "portal.travel";

/// Serialized body of a single empty sub-chunk the client accepts as "loaded"
///
/// # Format
/// ```text
/// {u8 version=8}{u8 storages=1}{u8 (palette<<1)|runtime}
/// {512 zero bytes block words}{VARINT palette_size=1}{VARINT air=0}
/// {512 zero bytes heightmap}{256 zero bytes biomes}{u8 borders=0}
/// ```
///
/// The layout is tied to the client version and may need updating with it.
pub fn empty_chunk_data() -> Bytes {
    static DATA: OnceLock<Bytes> = OnceLock::new();
    DATA.get_or_init(|| {
        let mut buf = BytesMut::with_capacity(1 + 1 + 1 + 512 + 2 + 512 + 256 + 1);
        buf.put_u8(8);
        buf.put_u8(1);
        buf.put_u8((1 << 1) | 1);
        buf.put_bytes(0, 512);
        write_var_i32(&mut buf, 1);
        write_var_i32(&mut buf, 0);
        buf.put_bytes(0, 512);
        buf.put_bytes(0, 256);
        buf.put_u8(0);
        buf.freeze()
    })
    .clone()
}

/// Build an empty chunk at the given chunk column
pub fn build_empty_chunk(chunk_x: i32, chunk_z: i32) -> Packet {
    Packet::LevelChunk {
        chunk_x,
        chunk_z,
        sub_chunk_count: 1,
        cache_enabled: false,
        data: empty_chunk_data(),
    }
}

/// Build `(2r+1)^2` empty chunks centred on the chunk containing `spawn`
pub fn build_empty_chunks(spawn: Vector3f, radius: i32) -> Vec<Packet> {
    let (center_x, center_z) = spawn.chunk_coords();
    let side = (2 * radius + 1).max(0) as usize;
    let mut chunks = Vec::with_capacity(side * side);
    for x in -radius..=radius {
        for z in -radius..=radius {
            chunks.push(build_empty_chunk(center_x + x, center_z + z));
        }
    }
    chunks
}

/// Build a chunk publisher update (which chunks the client keeps loaded)
pub fn build_chunk_publisher_update(position: Vector3i, radius: u32) -> Packet {
    Packet::NetworkChunkPublisherUpdate { position, radius }
}

/// Build a dimension change followed by the fake world around `position`
///
/// # Packet Order
/// 1. `ChangeDimension` with respawn set
/// 2. `NetworkChunkPublisherUpdate` at the block position, radius 4
/// 3. 81 empty `LevelChunk` packets
pub fn build_dimension_change(dimension: i32, position: Vector3f) -> Vec<Packet> {
    let mut packets = Vec::with_capacity(2 + 81);
    packets.push(Packet::ChangeDimension {
        dimension,
        position,
        respawn: true,
    });
    packets.push(build_chunk_publisher_update(
        position.to_int(),
        DIMENSION_CHANGE_RADIUS as u32,
    ));
    packets.extend(build_empty_chunks(position, DIMENSION_CHANGE_RADIUS));
    packets
}

/// Build a respawn-mode position update for the player entity
pub fn build_respawn_position(runtime_entity_id: i64, position: Vector3f, rotation: Vector3f) -> Packet {
    Packet::MovePlayer {
        runtime_entity_id,
        position,
        rotation,
        mode: move_mode::RESPAWN,
        on_ground: false,
        riding_runtime_entity_id: 0,
        tick: 0,
    }
}

pub fn build_game_mode(game_mode: i32) -> Packet {
    Packet::SetPlayerGameType { game_mode }
}

pub fn build_game_rules(game_rules: Vec<GameRule>) -> Packet {
    Packet::GameRulesChanged { game_rules }
}

pub fn build_set_difficulty(difficulty: u32) -> Packet {
    Packet::SetDifficulty { difficulty }
}

/// Build the two packets that stop rain and thunder
pub fn build_clear_weather() -> [Packet; 2] {
    [
        Packet::LevelEvent {
            event: level_event::STOP_RAINING,
            position: Vector3f::ZERO,
            data: 10_000,
        },
        Packet::LevelEvent {
            event: level_event::STOP_THUNDERSTORM,
            position: Vector3f::ZERO,
            data: 0,
        },
    ]
}

/// Build removal of every mob effect plus a reset of the effect metadata
pub fn build_remove_all_effects(runtime_entity_id: i64) -> Vec<Packet> {
    let mut packets: Vec<Packet> = (0..MOB_EFFECT_COUNT)
        .map(|effect_id| Packet::MobEffect {
            runtime_entity_id,
            event: mob_effect_event::REMOVE,
            effect_id,
            amplifier: 0,
            particles: false,
            duration: 0,
        })
        .collect();

    packets.push(Packet::SetEntityData {
        runtime_entity_id,
        metadata: vec![
            EntityDataEntry::new(entity_data::POTION_AUX_VALUE, EntityDataValue::Short(0)),
            EntityDataEntry::new(entity_data::EFFECT_COLOR, EntityDataValue::Int(0)),
            EntityDataEntry::new(entity_data::EFFECT_AMBIENT, EntityDataValue::Byte(0)),
        ],
        tick: 0,
    });
    packets
}

pub fn build_remove_entity(unique_entity_id: i64) -> Packet {
    Packet::RemoveEntity { unique_entity_id }
}

/// Build one player list removal covering every UUID
pub fn build_remove_players<I>(uuids: I) -> Packet
where
    I: IntoIterator<Item = Uuid>,
{
    Packet::PlayerList {
        action: player_list_action::REMOVE,
        entries: uuids.into_iter().map(PlayerListEntry::removal).collect(),
    }
}

pub fn build_remove_objective(objective_id: impl Into<String>) -> Packet {
    Packet::RemoveObjective {
        objective_id: objective_id.into(),
    }
}

pub fn build_remove_bossbar(boss_unique_entity_id: i64) -> Packet {
    Packet::BossEvent {
        boss_unique_entity_id,
        action: boss_event_action::REMOVE,
        extra: Bytes::new(),
    }
}

/// Build the stop-sound sent once a transfer completes
pub fn build_stop_portal_sound() -> Packet {
    Packet::StopSound {
        sound_name: PORTAL_TRAVEL_SOUND.to_string(),
        stop_all: true,
    }
}

pub fn build_local_player_initialized(runtime_entity_id: i64) -> Packet {
    Packet::SetLocalPlayerAsInitialized { runtime_entity_id }
}

pub fn build_request_chunk_radius(radius: i32) -> Packet {
    Packet::RequestChunkRadius { radius }
}

pub fn build_disconnect(message: impl Into<String>) -> Packet {
    Packet::Disconnect {
        hide_screen: false,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunk_layout() {
        let data = empty_chunk_data();
        assert_eq!(data.len(), 3 + 512 + 2 + 512 + 256 + 1);
        assert_eq!(&data[..3], &[8, 1, 3]);
        // palette size 1 (zigzag), air
        assert_eq!(&data[515..517], &[0x02, 0x00]);
    }

    #[test]
    fn test_dimension_change_sends_81_chunks_around_spawn() {
        let packets = build_dimension_change(dimension::NETHER, Vector3f::new(40.0, 70.0, -3.0));
        assert_eq!(packets.len(), 2 + 81);
        assert!(matches!(packets[0], Packet::ChangeDimension { dimension: 1, respawn: true, .. }));
        assert_eq!(
            packets[1],
            Packet::NetworkChunkPublisherUpdate { position: Vector3i::new(40, 70, -3), radius: 4 }
        );
        // spawn chunk is (2, -1); first chunk is the -4/-4 corner
        assert!(matches!(packets[2], Packet::LevelChunk { chunk_x: -2, chunk_z: -5, .. }));
        assert!(matches!(packets[82], Packet::LevelChunk { chunk_x: 6, chunk_z: 3, .. }));
    }

    #[test]
    fn test_remove_all_effects_resets_metadata_last() {
        let packets = build_remove_all_effects(7);
        assert_eq!(packets.len(), MOB_EFFECT_COUNT as usize + 1);
        assert!(matches!(packets[0], Packet::MobEffect { effect_id: 0, event: mob_effect_event::REMOVE, .. }));
        assert!(matches!(packets[27], Packet::MobEffect { effect_id: 27, .. }));
        assert!(matches!(packets[28], Packet::SetEntityData { runtime_entity_id: 7, .. }));
    }

    #[test]
    fn test_clear_weather_stops_rain_then_thunder() {
        let [rain, thunder] = build_clear_weather();
        assert!(matches!(rain, Packet::LevelEvent { event: level_event::STOP_RAINING, data: 10_000, .. }));
        assert!(matches!(thunder, Packet::LevelEvent { event: level_event::STOP_THUNDERSTORM, data: 0, .. }));
    }
}
