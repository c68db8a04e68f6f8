//! World-state invalidation helpers
//!
//! Fire-and-forget senders for the packets the proxy injects into a client
//! (or backend) on its own. Every helper is a silent no-op when the session
//! is missing or already closed.

use tideway_core::{Vector3f, Vector3i};
use tideway_protocol::{
    build_chunk_publisher_update, build_clear_weather, build_dimension_change,
    build_game_mode, build_game_rules, build_remove_all_effects, build_remove_bossbar,
    build_remove_entity, build_remove_objective, build_remove_players, build_respawn_position,
    build_set_difficulty, GameRule, Packet,
};
use uuid::Uuid;

use crate::transport::Session;

fn open(session: Option<&dyn Session>) -> Option<&dyn Session> {
    session.filter(|session| !session.is_closed())
}

/// Queue packets on the session, in order
pub fn inject_packets<I>(session: Option<&dyn Session>, packets: I)
where
    I: IntoIterator<Item = Packet>,
{
    if let Some(session) = open(session) {
        for packet in packets {
            session.send_packet(&packet);
        }
    }
}

/// Dimension change plus the empty chunk grid the client respawns into
pub fn inject_dimension_change(session: Option<&dyn Session>, dimension: i32, position: Vector3f) {
    if open(session).is_some() {
        inject_packets(session, build_dimension_change(dimension, position));
    }
}

pub fn inject_position(session: Option<&dyn Session>, runtime_entity_id: i64, position: Vector3f, rotation: Vector3f) {
    inject_packets(session, [build_respawn_position(runtime_entity_id, position, rotation)]);
}

pub fn inject_remove_all_effects(session: Option<&dyn Session>, runtime_entity_id: i64) {
    if open(session).is_some() {
        inject_packets(session, build_remove_all_effects(runtime_entity_id));
    }
}

pub fn inject_clear_weather(session: Option<&dyn Session>) {
    inject_packets(session, build_clear_weather());
}

pub fn inject_game_rules(session: Option<&dyn Session>, game_rules: &[GameRule]) {
    if game_rules.is_empty() {
        return;
    }
    inject_packets(session, [build_game_rules(game_rules.to_vec())]);
}

pub fn inject_game_mode(session: Option<&dyn Session>, game_mode: i32) {
    inject_packets(session, [build_game_mode(game_mode)]);
}

pub fn inject_difficulty(session: Option<&dyn Session>, difficulty: i32) {
    inject_packets(session, [build_set_difficulty(difficulty.max(0) as u32)]);
}

pub fn inject_chunk_publisher_update(session: Option<&dyn Session>, position: Vector3i, radius: u32) {
    inject_packets(session, [build_chunk_publisher_update(position, radius)]);
}

pub fn inject_remove_entities<I>(session: Option<&dyn Session>, unique_entity_ids: I)
where
    I: IntoIterator<Item = i64>,
{
    if open(session).is_some() {
        inject_packets(session, unique_entity_ids.into_iter().map(build_remove_entity));
    }
}

pub fn inject_remove_bossbars<I>(session: Option<&dyn Session>, boss_ids: I)
where
    I: IntoIterator<Item = i64>,
{
    if open(session).is_some() {
        inject_packets(session, boss_ids.into_iter().map(build_remove_bossbar));
    }
}

pub fn inject_remove_objectives<I>(session: Option<&dyn Session>, objective_ids: I)
where
    I: IntoIterator<Item = String>,
{
    if open(session).is_some() {
        inject_packets(session, objective_ids.into_iter().map(build_remove_objective));
    }
}

pub fn inject_remove_players<I>(session: Option<&dyn Session>, uuids: I)
where
    I: IntoIterator<Item = Uuid>,
{
    let uuids: Vec<Uuid> = uuids.into_iter().collect();
    if uuids.is_empty() {
        return;
    }
    inject_packets(session, [build_remove_players(uuids)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemorySession;
    use tideway_protocol::{level_event, PacketId};

    fn session() -> std::sync::Arc<MemorySession> {
        MemorySession::new("127.0.0.1:19132".parse().unwrap())
    }

    #[test]
    fn test_missing_session_is_noop() {
        inject_clear_weather(None);
        inject_remove_all_effects(None, 1);
        inject_remove_players(None, [Uuid::new_v4()]);
        inject_dimension_change(None, 1, Vector3f::ZERO);
    }

    #[test]
    fn test_closed_session_gets_no_writes() {
        let session = session();
        session.close_now();

        inject_clear_weather(Some(&*session));
        inject_dimension_change(Some(&*session), 1, Vector3f::ZERO);
        inject_remove_bossbars(Some(&*session), [5]);
        inject_game_mode(Some(&*session), 1);

        assert!(session.sent().is_empty());
    }

    #[test]
    fn test_dimension_change_brings_empty_terrain() {
        let session = session();
        inject_dimension_change(Some(&*session), 1, Vector3f::new(8.0, 64.0, 8.0));

        let packets = session.sent_packets();
        assert_eq!(packets[0].id(), PacketId::ChangeDimension.as_u32());
        let chunks = packets
            .iter()
            .filter(|packet| matches!(packet, Packet::LevelChunk { .. }))
            .count();
        assert_eq!(chunks, 81);
    }

    #[test]
    fn test_clear_weather_stops_rain_and_thunder() {
        let session = session();
        inject_clear_weather(Some(&*session));

        let events: Vec<i32> = session
            .sent_packets()
            .into_iter()
            .filter_map(|packet| match packet {
                Packet::LevelEvent { event, .. } => Some(event),
                _ => None,
            })
            .collect();
        assert_eq!(events, vec![level_event::STOP_RAINING, level_event::STOP_THUNDERSTORM]);
    }

    #[test]
    fn test_empty_lists_send_nothing() {
        let session = session();
        inject_remove_players(Some(&*session), Vec::new());
        inject_game_rules(Some(&*session), &[]);
        inject_remove_objectives(Some(&*session), Vec::<String>::new());
        assert!(session.sent().is_empty());

        inject_remove_objectives(Some(&*session), ["sidebar".to_string()]);
        assert_eq!(session.sent_packets()[0].id(), PacketId::RemoveObjective.as_u32());
    }
}
