//! # Packet Structures
//!
//! Typed view of the packets the proxy needs to inspect or rewrite.
//!
//! Every packet is `{VARINT id}{fields...}`. Fields the proxy never looks at
//! are kept verbatim in an `extra` tail so a decoded packet re-encodes to the
//! exact bytes it was decoded from. Packets with an unrecognised ID decode to
//! [`Packet::Unknown`].

use bytes::{Bytes, BytesMut};
use tideway_core::{ProxyError, Result, Vector3f, Vector3i};
use uuid::Uuid;

use super::{codecs::*, packets::*};

/// Value of a single game rule
#[derive(Debug, Clone, PartialEq)]
pub enum GameRuleValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

/// A named game rule as sent in `StartGame` / `GameRulesChanged`
#[derive(Debug, Clone, PartialEq)]
pub struct GameRule {
    pub name: String,
    pub editable: bool,
    pub value: GameRuleValue,
}

impl GameRule {
    pub fn new(name: impl Into<String>, value: GameRuleValue) -> Self {
        Self {
            name: name.into(),
            editable: false,
            value,
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        write_string(buf, &self.name);
        write_bool(buf, self.editable);
        match self.value {
            GameRuleValue::Bool(v) => {
                write_var_u32(buf, 1);
                write_bool(buf, v);
            }
            GameRuleValue::Int(v) => {
                write_var_u32(buf, 2);
                write_var_i32(buf, v);
            }
            GameRuleValue::Float(v) => {
                write_var_u32(buf, 3);
                write_f32_le(buf, v);
            }
        }
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        let name = read_string(buf)?;
        let editable = read_bool(buf)?;
        let value = match read_var_u32(buf)? {
            1 => GameRuleValue::Bool(read_bool(buf)?),
            2 => GameRuleValue::Int(read_var_i32(buf)?),
            3 => GameRuleValue::Float(read_f32_le(buf)?),
            other => {
                return Err(ProxyError::InvalidData(format!("Unknown game rule type {}", other)))
            }
        };
        Ok(Self { name, editable, value })
    }
}

/// One entry of the item palette announced in `StartGame`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEntry {
    pub identifier: String,
    pub runtime_id: i16,
    pub component_based: bool,
}

impl ItemEntry {
    pub fn new(identifier: impl Into<String>, runtime_id: i16) -> Self {
        Self {
            identifier: identifier.into(),
            runtime_id,
            component_based: false,
        }
    }
}

/// Typed entity metadata value
#[derive(Debug, Clone, PartialEq)]
pub enum EntityDataValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    String(String),
    Long(i64),
}

/// One `key -> value` metadata entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDataEntry {
    pub key: u32,
    pub value: EntityDataValue,
}

impl EntityDataEntry {
    pub fn new(key: u32, value: EntityDataValue) -> Self {
        Self { key, value }
    }

    fn write(&self, buf: &mut BytesMut) {
        write_var_u32(buf, self.key);
        match &self.value {
            EntityDataValue::Byte(v) => {
                write_var_u32(buf, 0);
                write_u8(buf, *v as u8);
            }
            EntityDataValue::Short(v) => {
                write_var_u32(buf, 1);
                write_i16_le(buf, *v);
            }
            EntityDataValue::Int(v) => {
                write_var_u32(buf, 2);
                write_var_i32(buf, *v);
            }
            EntityDataValue::Float(v) => {
                write_var_u32(buf, 3);
                write_f32_le(buf, *v);
            }
            EntityDataValue::String(v) => {
                write_var_u32(buf, 4);
                write_string(buf, v);
            }
            EntityDataValue::Long(v) => {
                write_var_u32(buf, 7);
                write_var_i64(buf, *v);
            }
        }
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        let key = read_var_u32(buf)?;
        let value = match read_var_u32(buf)? {
            0 => EntityDataValue::Byte(read_u8(buf)? as i8),
            1 => EntityDataValue::Short(read_i16_le(buf)?),
            2 => EntityDataValue::Int(read_var_i32(buf)?),
            3 => EntityDataValue::Float(read_f32_le(buf)?),
            4 => EntityDataValue::String(read_string(buf)?),
            7 => EntityDataValue::Long(read_var_i64(buf)?),
            other => {
                return Err(ProxyError::InvalidData(format!("Unknown entity data type {}", other)))
            }
        };
        Ok(Self { key, value })
    }
}

/// Player list entry; only the UUID is present for removals
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerListEntry {
    pub uuid: Uuid,
    pub unique_entity_id: i64,
    pub name: String,
}

impl PlayerListEntry {
    pub fn removal(uuid: Uuid) -> Self {
        Self {
            uuid,
            unique_entity_id: 0,
            name: String::new(),
        }
    }
}

/// World description sent by a backend once login completes
#[derive(Debug, Clone, PartialEq)]
pub struct StartGame {
    pub unique_entity_id: i64,
    pub runtime_entity_id: i64,
    pub game_mode: i32,
    pub player_position: Vector3f,
    pub pitch: f32,
    pub yaw: f32,
    pub dimension: i32,
    pub default_spawn: Vector3i,
    pub difficulty: i32,
    pub game_rules: Vec<GameRule>,
    pub item_palette: Vec<ItemEntry>,
    pub extra: Bytes,
}

/// A decoded packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Login {
        protocol_version: u32,
        username: String,
        client_uuid: Uuid,
        extra: Bytes,
    },
    PlayStatus {
        status: i32,
    },
    Disconnect {
        hide_screen: bool,
        message: String,
    },
    StartGame(Box<StartGame>),
    AddEntity {
        unique_entity_id: i64,
        runtime_entity_id: i64,
        identifier: String,
        position: Vector3f,
        extra: Bytes,
    },
    RemoveEntity {
        unique_entity_id: i64,
    },
    MoveEntityAbsolute {
        runtime_entity_id: i64,
        flags: u8,
        position: Vector3f,
        rotation: Vector3f,
    },
    MovePlayer {
        runtime_entity_id: i64,
        position: Vector3f,
        rotation: Vector3f,
        mode: u8,
        on_ground: bool,
        riding_runtime_entity_id: i64,
        tick: u64,
    },
    LevelEvent {
        event: i32,
        position: Vector3f,
        data: i32,
    },
    MobEffect {
        runtime_entity_id: i64,
        event: u8,
        effect_id: i32,
        amplifier: i32,
        particles: bool,
        duration: i32,
    },
    MobEquipment {
        runtime_entity_id: i64,
        item_id: i32,
        inventory_slot: u8,
        hotbar_slot: u8,
        window_id: u8,
        extra: Bytes,
    },
    InventorySlot {
        window_id: u32,
        slot: u32,
        item_id: i32,
        extra: Bytes,
    },
    SetEntityData {
        runtime_entity_id: i64,
        metadata: Vec<EntityDataEntry>,
        tick: u64,
    },
    SetEntityMotion {
        runtime_entity_id: i64,
        motion: Vector3f,
    },
    LevelChunk {
        chunk_x: i32,
        chunk_z: i32,
        sub_chunk_count: u32,
        cache_enabled: bool,
        data: Bytes,
    },
    SetDifficulty {
        difficulty: u32,
    },
    ChangeDimension {
        dimension: i32,
        position: Vector3f,
        respawn: bool,
    },
    SetPlayerGameType {
        game_mode: i32,
    },
    PlayerList {
        action: u8,
        entries: Vec<PlayerListEntry>,
    },
    RequestChunkRadius {
        radius: i32,
    },
    ChunkRadiusUpdated {
        radius: i32,
    },
    GameRulesChanged {
        game_rules: Vec<GameRule>,
    },
    BossEvent {
        boss_unique_entity_id: i64,
        action: u32,
        extra: Bytes,
    },
    StopSound {
        sound_name: String,
        stop_all: bool,
    },
    RemoveObjective {
        objective_id: String,
    },
    SetDisplayObjective {
        display_slot: String,
        objective_id: String,
        extra: Bytes,
    },
    SetLocalPlayerAsInitialized {
        runtime_entity_id: i64,
    },
    NetworkChunkPublisherUpdate {
        position: Vector3i,
        radius: u32,
    },
    Unknown {
        id: u32,
        payload: Bytes,
    },
}

// Runtime entity IDs are unsigned on the wire but share the signed ID space
// used by the rewrite tables.
#[inline]
fn write_runtime_id(buf: &mut BytesMut, id: i64) {
    write_var_u64(buf, id as u64);
}

#[inline]
fn read_runtime_id(buf: &mut Bytes) -> Result<i64> {
    Ok(read_var_u64(buf)? as i64)
}

fn write_list<T>(buf: &mut BytesMut, items: &[T], write: impl Fn(&T, &mut BytesMut)) {
    write_var_u32(buf, items.len() as u32);
    for item in items {
        write(item, buf);
    }
}

fn read_list<T>(buf: &mut Bytes, read: impl Fn(&mut Bytes) -> Result<T>) -> Result<Vec<T>> {
    let len = read_var_u32(buf)? as usize;
    // Each element takes at least one byte
    if len > buf.len() {
        return Err(ProxyError::InvalidData(format!("List length {} exceeds packet", len)));
    }
    (0..len).map(|_| read(buf)).collect()
}

impl Packet {
    /// On-wire ID of this packet
    pub fn id(&self) -> u32 {
        let id = match self {
            Self::Login { .. } => PacketId::Login,
            Self::PlayStatus { .. } => PacketId::PlayStatus,
            Self::Disconnect { .. } => PacketId::Disconnect,
            Self::StartGame(_) => PacketId::StartGame,
            Self::AddEntity { .. } => PacketId::AddEntity,
            Self::RemoveEntity { .. } => PacketId::RemoveEntity,
            Self::MoveEntityAbsolute { .. } => PacketId::MoveEntityAbsolute,
            Self::MovePlayer { .. } => PacketId::MovePlayer,
            Self::LevelEvent { .. } => PacketId::LevelEvent,
            Self::MobEffect { .. } => PacketId::MobEffect,
            Self::MobEquipment { .. } => PacketId::MobEquipment,
            Self::InventorySlot { .. } => PacketId::InventorySlot,
            Self::SetEntityData { .. } => PacketId::SetEntityData,
            Self::SetEntityMotion { .. } => PacketId::SetEntityMotion,
            Self::LevelChunk { .. } => PacketId::LevelChunk,
            Self::SetDifficulty { .. } => PacketId::SetDifficulty,
            Self::ChangeDimension { .. } => PacketId::ChangeDimension,
            Self::SetPlayerGameType { .. } => PacketId::SetPlayerGameType,
            Self::PlayerList { .. } => PacketId::PlayerList,
            Self::RequestChunkRadius { .. } => PacketId::RequestChunkRadius,
            Self::ChunkRadiusUpdated { .. } => PacketId::ChunkRadiusUpdated,
            Self::GameRulesChanged { .. } => PacketId::GameRulesChanged,
            Self::BossEvent { .. } => PacketId::BossEvent,
            Self::StopSound { .. } => PacketId::StopSound,
            Self::RemoveObjective { .. } => PacketId::RemoveObjective,
            Self::SetDisplayObjective { .. } => PacketId::SetDisplayObjective,
            Self::SetLocalPlayerAsInitialized { .. } => PacketId::SetLocalPlayerAsInitialized,
            Self::NetworkChunkPublisherUpdate { .. } => PacketId::NetworkChunkPublisherUpdate,
            Self::Unknown { id, .. } => return *id,
        };
        id.as_u32()
    }

    /// Encode into a standalone frame (ID + fields)
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(32);
        write_var_u32(&mut buf, self.id());
        self.write_fields(&mut buf);
        buf.freeze()
    }

    fn write_fields(&self, buf: &mut BytesMut) {
        match self {
            Self::Login { protocol_version, username, client_uuid, extra } => {
                write_var_u32(buf, *protocol_version);
                write_string(buf, username);
                write_uuid(buf, client_uuid);
                buf.extend_from_slice(extra);
            }
            Self::PlayStatus { status } => write_var_i32(buf, *status),
            Self::Disconnect { hide_screen, message } => {
                write_bool(buf, *hide_screen);
                write_string(buf, message);
            }
            Self::StartGame(game) => {
                write_var_i64(buf, game.unique_entity_id);
                write_runtime_id(buf, game.runtime_entity_id);
                write_var_i32(buf, game.game_mode);
                write_vector3f(buf, game.player_position);
                write_f32_le(buf, game.pitch);
                write_f32_le(buf, game.yaw);
                write_var_i32(buf, game.dimension);
                write_block_position(buf, game.default_spawn);
                write_var_i32(buf, game.difficulty);
                write_list(buf, &game.game_rules, |rule, buf| rule.write(buf));
                write_list(buf, &game.item_palette, |item, buf| {
                    write_string(buf, &item.identifier);
                    write_i16_le(buf, item.runtime_id);
                    write_bool(buf, item.component_based);
                });
                buf.extend_from_slice(&game.extra);
            }
            Self::AddEntity { unique_entity_id, runtime_entity_id, identifier, position, extra } => {
                write_var_i64(buf, *unique_entity_id);
                write_runtime_id(buf, *runtime_entity_id);
                write_string(buf, identifier);
                write_vector3f(buf, *position);
                buf.extend_from_slice(extra);
            }
            Self::RemoveEntity { unique_entity_id } => write_var_i64(buf, *unique_entity_id),
            Self::MoveEntityAbsolute { runtime_entity_id, flags, position, rotation } => {
                write_runtime_id(buf, *runtime_entity_id);
                write_u8(buf, *flags);
                write_vector3f(buf, *position);
                write_vector3f(buf, *rotation);
            }
            Self::MovePlayer {
                runtime_entity_id,
                position,
                rotation,
                mode,
                on_ground,
                riding_runtime_entity_id,
                tick,
            } => {
                write_runtime_id(buf, *runtime_entity_id);
                write_vector3f(buf, *position);
                write_vector3f(buf, *rotation);
                write_u8(buf, *mode);
                write_bool(buf, *on_ground);
                write_runtime_id(buf, *riding_runtime_entity_id);
                write_var_u64(buf, *tick);
            }
            Self::LevelEvent { event, position, data } => {
                write_var_i32(buf, *event);
                write_vector3f(buf, *position);
                write_var_i32(buf, *data);
            }
            Self::MobEffect { runtime_entity_id, event, effect_id, amplifier, particles, duration } => {
                write_runtime_id(buf, *runtime_entity_id);
                write_u8(buf, *event);
                write_var_i32(buf, *effect_id);
                write_var_i32(buf, *amplifier);
                write_bool(buf, *particles);
                write_var_i32(buf, *duration);
            }
            Self::MobEquipment { runtime_entity_id, item_id, inventory_slot, hotbar_slot, window_id, extra } => {
                write_runtime_id(buf, *runtime_entity_id);
                write_var_i32(buf, *item_id);
                write_u8(buf, *inventory_slot);
                write_u8(buf, *hotbar_slot);
                write_u8(buf, *window_id);
                buf.extend_from_slice(extra);
            }
            Self::InventorySlot { window_id, slot, item_id, extra } => {
                write_var_u32(buf, *window_id);
                write_var_u32(buf, *slot);
                write_var_i32(buf, *item_id);
                buf.extend_from_slice(extra);
            }
            Self::SetEntityData { runtime_entity_id, metadata, tick } => {
                write_runtime_id(buf, *runtime_entity_id);
                write_list(buf, metadata, |entry, buf| entry.write(buf));
                write_var_u64(buf, *tick);
            }
            Self::SetEntityMotion { runtime_entity_id, motion } => {
                write_runtime_id(buf, *runtime_entity_id);
                write_vector3f(buf, *motion);
            }
            Self::LevelChunk { chunk_x, chunk_z, sub_chunk_count, cache_enabled, data } => {
                write_var_i32(buf, *chunk_x);
                write_var_i32(buf, *chunk_z);
                write_var_u32(buf, *sub_chunk_count);
                write_bool(buf, *cache_enabled);
                write_byte_array(buf, data);
            }
            Self::SetDifficulty { difficulty } => write_var_u32(buf, *difficulty),
            Self::ChangeDimension { dimension, position, respawn } => {
                write_var_i32(buf, *dimension);
                write_vector3f(buf, *position);
                write_bool(buf, *respawn);
            }
            Self::SetPlayerGameType { game_mode } => write_var_i32(buf, *game_mode),
            Self::PlayerList { action, entries } => {
                write_u8(buf, *action);
                let action = *action;
                write_list(buf, entries, |entry, buf| {
                    write_uuid(buf, &entry.uuid);
                    if action == player_list_action::ADD {
                        write_var_i64(buf, entry.unique_entity_id);
                        write_string(buf, &entry.name);
                    }
                });
            }
            Self::RequestChunkRadius { radius } => write_var_i32(buf, *radius),
            Self::ChunkRadiusUpdated { radius } => write_var_i32(buf, *radius),
            Self::GameRulesChanged { game_rules } => {
                write_list(buf, game_rules, |rule, buf| rule.write(buf));
            }
            Self::BossEvent { boss_unique_entity_id, action, extra } => {
                write_var_i64(buf, *boss_unique_entity_id);
                write_var_u32(buf, *action);
                buf.extend_from_slice(extra);
            }
            Self::StopSound { sound_name, stop_all } => {
                write_string(buf, sound_name);
                write_bool(buf, *stop_all);
            }
            Self::RemoveObjective { objective_id } => write_string(buf, objective_id),
            Self::SetDisplayObjective { display_slot, objective_id, extra } => {
                write_string(buf, display_slot);
                write_string(buf, objective_id);
                buf.extend_from_slice(extra);
            }
            Self::SetLocalPlayerAsInitialized { runtime_entity_id } => {
                write_runtime_id(buf, *runtime_entity_id);
            }
            Self::NetworkChunkPublisherUpdate { position, radius } => {
                write_vector3i(buf, *position);
                write_var_u32(buf, *radius);
            }
            Self::Unknown { payload, .. } => buf.extend_from_slice(payload),
        }
    }

    /// Decode a single frame
    ///
    /// # Errors
    /// Returns an error if a known packet is truncated, malformed, or has
    /// trailing bytes that no field accounts for.
    pub fn decode(frame: Bytes) -> Result<Self> {
        let mut buf = frame;
        let id = read_var_u32(&mut buf)?;
        let Some(packet_id) = PacketId::from_u32(id) else {
            return Ok(Self::Unknown { id, payload: buf });
        };

        let packet = Self::read_fields(packet_id, &mut buf)?;
        if !buf.is_empty() {
            return Err(ProxyError::Protocol(format!(
                "{} trailing bytes after {:?}",
                buf.len(),
                packet_id
            )));
        }
        Ok(packet)
    }

    fn read_fields(id: PacketId, buf: &mut Bytes) -> Result<Self> {
        let packet = match id {
            PacketId::Login => Self::Login {
                protocol_version: read_var_u32(buf)?,
                username: read_string(buf)?,
                client_uuid: read_uuid(buf)?,
                extra: read_remaining(buf),
            },
            PacketId::PlayStatus => Self::PlayStatus { status: read_var_i32(buf)? },
            PacketId::Disconnect => Self::Disconnect {
                hide_screen: read_bool(buf)?,
                message: read_string(buf)?,
            },
            PacketId::StartGame => Self::StartGame(Box::new(StartGame {
                unique_entity_id: read_var_i64(buf)?,
                runtime_entity_id: read_runtime_id(buf)?,
                game_mode: read_var_i32(buf)?,
                player_position: read_vector3f(buf)?,
                pitch: read_f32_le(buf)?,
                yaw: read_f32_le(buf)?,
                dimension: read_var_i32(buf)?,
                default_spawn: read_block_position(buf)?,
                difficulty: read_var_i32(buf)?,
                game_rules: read_list(buf, GameRule::read)?,
                item_palette: read_list(buf, |buf| {
                    Ok(ItemEntry {
                        identifier: read_string(buf)?,
                        runtime_id: read_i16_le(buf)?,
                        component_based: read_bool(buf)?,
                    })
                })?,
                extra: read_remaining(buf),
            })),
            PacketId::AddEntity => Self::AddEntity {
                unique_entity_id: read_var_i64(buf)?,
                runtime_entity_id: read_runtime_id(buf)?,
                identifier: read_string(buf)?,
                position: read_vector3f(buf)?,
                extra: read_remaining(buf),
            },
            PacketId::RemoveEntity => Self::RemoveEntity { unique_entity_id: read_var_i64(buf)? },
            PacketId::MoveEntityAbsolute => Self::MoveEntityAbsolute {
                runtime_entity_id: read_runtime_id(buf)?,
                flags: read_u8(buf)?,
                position: read_vector3f(buf)?,
                rotation: read_vector3f(buf)?,
            },
            PacketId::MovePlayer => Self::MovePlayer {
                runtime_entity_id: read_runtime_id(buf)?,
                position: read_vector3f(buf)?,
                rotation: read_vector3f(buf)?,
                mode: read_u8(buf)?,
                on_ground: read_bool(buf)?,
                riding_runtime_entity_id: read_runtime_id(buf)?,
                tick: read_var_u64(buf)?,
            },
            PacketId::LevelEvent => Self::LevelEvent {
                event: read_var_i32(buf)?,
                position: read_vector3f(buf)?,
                data: read_var_i32(buf)?,
            },
            PacketId::MobEffect => Self::MobEffect {
                runtime_entity_id: read_runtime_id(buf)?,
                event: read_u8(buf)?,
                effect_id: read_var_i32(buf)?,
                amplifier: read_var_i32(buf)?,
                particles: read_bool(buf)?,
                duration: read_var_i32(buf)?,
            },
            PacketId::MobEquipment => Self::MobEquipment {
                runtime_entity_id: read_runtime_id(buf)?,
                item_id: read_var_i32(buf)?,
                inventory_slot: read_u8(buf)?,
                hotbar_slot: read_u8(buf)?,
                window_id: read_u8(buf)?,
                extra: read_remaining(buf),
            },
            PacketId::InventorySlot => Self::InventorySlot {
                window_id: read_var_u32(buf)?,
                slot: read_var_u32(buf)?,
                item_id: read_var_i32(buf)?,
                extra: read_remaining(buf),
            },
            PacketId::SetEntityData => Self::SetEntityData {
                runtime_entity_id: read_runtime_id(buf)?,
                metadata: read_list(buf, EntityDataEntry::read)?,
                tick: read_var_u64(buf)?,
            },
            PacketId::SetEntityMotion => Self::SetEntityMotion {
                runtime_entity_id: read_runtime_id(buf)?,
                motion: read_vector3f(buf)?,
            },
            PacketId::LevelChunk => Self::LevelChunk {
                chunk_x: read_var_i32(buf)?,
                chunk_z: read_var_i32(buf)?,
                sub_chunk_count: read_var_u32(buf)?,
                cache_enabled: read_bool(buf)?,
                data: read_byte_array(buf)?,
            },
            PacketId::SetDifficulty => Self::SetDifficulty { difficulty: read_var_u32(buf)? },
            PacketId::ChangeDimension => Self::ChangeDimension {
                dimension: read_var_i32(buf)?,
                position: read_vector3f(buf)?,
                respawn: read_bool(buf)?,
            },
            PacketId::SetPlayerGameType => Self::SetPlayerGameType { game_mode: read_var_i32(buf)? },
            PacketId::PlayerList => {
                let action = read_u8(buf)?;
                let entries = read_list(buf, |buf| {
                    let uuid = read_uuid(buf)?;
                    if action == player_list_action::ADD {
                        Ok(PlayerListEntry {
                            uuid,
                            unique_entity_id: read_var_i64(buf)?,
                            name: read_string(buf)?,
                        })
                    } else {
                        Ok(PlayerListEntry::removal(uuid))
                    }
                })?;
                Self::PlayerList { action, entries }
            }
            PacketId::RequestChunkRadius => Self::RequestChunkRadius { radius: read_var_i32(buf)? },
            PacketId::ChunkRadiusUpdated => Self::ChunkRadiusUpdated { radius: read_var_i32(buf)? },
            PacketId::GameRulesChanged => Self::GameRulesChanged {
                game_rules: read_list(buf, GameRule::read)?,
            },
            PacketId::BossEvent => Self::BossEvent {
                boss_unique_entity_id: read_var_i64(buf)?,
                action: read_var_u32(buf)?,
                extra: read_remaining(buf),
            },
            PacketId::StopSound => Self::StopSound {
                sound_name: read_string(buf)?,
                stop_all: read_bool(buf)?,
            },
            PacketId::RemoveObjective => Self::RemoveObjective { objective_id: read_string(buf)? },
            PacketId::SetDisplayObjective => Self::SetDisplayObjective {
                display_slot: read_string(buf)?,
                objective_id: read_string(buf)?,
                extra: read_remaining(buf),
            },
            PacketId::SetLocalPlayerAsInitialized => Self::SetLocalPlayerAsInitialized {
                runtime_entity_id: read_runtime_id(buf)?,
            },
            PacketId::NetworkChunkPublisherUpdate => Self::NetworkChunkPublisherUpdate {
                position: read_vector3i(buf)?,
                radius: read_var_u32(buf)?,
            },
        };
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_start_game() -> StartGame {
        StartGame {
            unique_entity_id: -12,
            runtime_entity_id: 12,
            game_mode: 1,
            player_position: Vector3f::new(0.5, 70.0, 0.5),
            pitch: 0.0,
            yaw: 90.0,
            dimension: dimension::OVERWORLD,
            default_spawn: Vector3i::new(0, 70, 0),
            difficulty: 2,
            game_rules: vec![
                GameRule::new("dodaylightcycle", GameRuleValue::Bool(false)),
                GameRule::new("spawnradius", GameRuleValue::Int(5)),
            ],
            item_palette: vec![ItemEntry::new("minecraft:shield", 355)],
            extra: Bytes::from_static(b"\x01\x02"),
        }
    }

    #[test]
    fn test_start_game_keeps_unparsed_tail() {
        let packet = Packet::StartGame(Box::new(sample_start_game()));
        let decoded = Packet::decode(packet.encode()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_unknown_packet_passthrough() {
        let frame = Bytes::from_static(&[0x90, 0x01, 0xAA, 0xBB]);
        let decoded = Packet::decode(frame.clone()).unwrap();
        assert_eq!(decoded, Packet::Unknown { id: 0x90, payload: Bytes::from_static(&[0xAA, 0xBB]) });
        assert_eq!(decoded.encode(), frame);
    }

    #[test]
    fn test_truncated_packet_is_error() {
        let mut frame = BytesMut::new();
        write_var_u32(&mut frame, PacketId::MovePlayer.as_u32());
        write_var_u64(&mut frame, 1);
        assert!(Packet::decode(frame.freeze()).is_err());
    }

    #[test]
    fn test_trailing_bytes_is_error() {
        let mut frame = BytesMut::from(&Packet::PlayStatus { status: 3 }.encode()[..]);
        frame.extend_from_slice(&[0x00]);
        assert!(Packet::decode(frame.freeze()).is_err());
    }

    #[test]
    fn test_player_list_removal_omits_details() {
        let uuid = Uuid::from_u128(0x1234);
        let removal = Packet::PlayerList {
            action: player_list_action::REMOVE,
            entries: vec![PlayerListEntry::removal(uuid)],
        };
        let encoded = removal.encode();
        // id + action + count + uuid
        assert_eq!(encoded.len(), 1 + 1 + 1 + 16);
        assert_eq!(Packet::decode(encoded).unwrap(), removal);
    }

    #[test]
    fn test_negative_runtime_id_survives() {
        let packet = Packet::SetLocalPlayerAsInitialized { runtime_entity_id: -5 };
        assert_eq!(Packet::decode(packet.encode()).unwrap(), packet);
    }
}
