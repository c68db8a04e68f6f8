//! # Downstream Packet Handlers
//!
//! Packet handlers installed on backend sessions. They run before the
//! bridge's rewrite step and see packets exactly as the backend sent them.
//!
//! | handler | installed | job |
//! |---|---|---|
//! | [`InitialHandler`] | first backend, until its `StartGame` | capture the initial rewrite map |
//! | [`SwitchDownstreamHandler`] | transfer target, until spawn | drive the transfer state machine |
//! | [`ConnectedDownstreamHandler`] | active backend | keep the rewrite map current |

use std::sync::{Arc, Weak};
use tideway_core::ProxyError;
use tideway_protocol::{play_status, GameRule, Packet};

use crate::bridge::{CancelSignal, PacketHandler};
use crate::connection::ServerConnection;
use crate::player::ProxiedPlayer;
use crate::rewrite::RewriteData;
use crate::transfer::TransferCallback;

/// Replace rules by name, append new ones
fn merge_game_rules(current: &mut Vec<GameRule>, changed: &[GameRule]) {
    for rule in changed {
        match current.iter_mut().find(|existing| existing.name == rule.name) {
            Some(existing) => *existing = rule.clone(),
            None => current.push(rule.clone()),
        }
    }
}

pub struct InitialHandler {
    player: Weak<ProxiedPlayer>,
}

impl InitialHandler {
    pub fn new(player: &Arc<ProxiedPlayer>) -> Self {
        Self {
            player: Arc::downgrade(player),
        }
    }
}

impl PacketHandler for InitialHandler {
    fn handle_packet(&self, packet: &mut Packet) -> Result<bool, CancelSignal> {
        let Packet::StartGame(start_game) = packet else {
            return Ok(false);
        };
        let Some(player) = self.player.upgrade() else {
            return Ok(false);
        };

        let mut rewrite = RewriteData::from_start_game(start_game);
        rewrite.chunk_radius = player.rewrite().chunk_radius;
        player.set_rewrite(Arc::new(rewrite));
        tracing::debug!(
            "[{}] Initial StartGame: entity {} in dimension {}",
            player.name(),
            start_game.runtime_entity_id,
            start_game.dimension
        );

        if let Some(server) = player.server() {
            server.downstream().on_downstream_initialize(&player, &server);
        }
        Ok(false)
    }
}

/// Watches the transfer target until the player has spawned there
///
/// The target's `StartGame` and spawn status never reach the client: the
/// proxy replays the world change itself.
pub struct SwitchDownstreamHandler {
    player: Weak<ProxiedPlayer>,
    callback: Arc<TransferCallback>,
}

impl SwitchDownstreamHandler {
    pub fn new(player: &Arc<ProxiedPlayer>, callback: Arc<TransferCallback>) -> Self {
        Self {
            player: Arc::downgrade(player),
            callback,
        }
    }
}

impl PacketHandler for SwitchDownstreamHandler {
    fn handle_packet(&self, packet: &mut Packet) -> Result<bool, CancelSignal> {
        match packet {
            Packet::StartGame(start_game) => {
                self.callback.on_transfer_accepted(start_game);
                Err(CancelSignal)
            }
            Packet::PlayStatus { status } if *status == play_status::PLAYER_SPAWN => {
                self.callback.on_transfer_complete();
                Err(CancelSignal)
            }
            Packet::Disconnect { message, .. } => {
                let reason = ProxyError::ConnectRefused {
                    addr: self.callback.target().address(),
                    reason: message.clone(),
                };
                self.callback.on_transfer_failed(reason);
                Err(CancelSignal)
            }
            _ => Ok(false),
        }
    }

    fn on_disconnect(&self, reason: &str) {
        if let Some(player) = self.player.upgrade() {
            tracing::debug!("[{}] Transfer target closed: {}", player.name(), reason);
        }
        self.callback.on_transfer_failed(ProxyError::ConnectRefused {
            addr: self.callback.target().address(),
            reason: reason.to_string(),
        });
    }
}

/// Keeps the active rewrite map in step with what the backend tells the client
pub struct ConnectedDownstreamHandler {
    player: Weak<ProxiedPlayer>,
    server: Weak<ServerConnection>,
}

impl ConnectedDownstreamHandler {
    pub fn new(player: &Arc<ProxiedPlayer>, server: &Arc<ServerConnection>) -> Self {
        Self {
            player: Arc::downgrade(player),
            server: Arc::downgrade(server),
        }
    }
}

impl PacketHandler for ConnectedDownstreamHandler {
    fn handle_packet(&self, packet: &mut Packet) -> Result<bool, CancelSignal> {
        let (Some(player), Some(server)) = (self.player.upgrade(), self.server.upgrade()) else {
            return Ok(false);
        };

        // The granted chunk radius is not tracked: transfers replay the client's request
        match packet {
            Packet::ChangeDimension { dimension, position, .. } => {
                let (dimension, position) = (*dimension, *position);
                player.update_rewrite_if_active(&server, |rewrite| {
                    rewrite.dimension = dimension;
                    rewrite.spawn_position = position;
                });
            }
            Packet::GameRulesChanged { game_rules } => {
                player.update_rewrite_if_active(&server, |rewrite| {
                    merge_game_rules(&mut rewrite.game_rules, game_rules)
                });
            }
            Packet::SetPlayerGameType { game_mode } => {
                let game_mode = *game_mode;
                player.update_rewrite_if_active(&server, |rewrite| rewrite.game_mode = game_mode);
            }
            Packet::SetDifficulty { difficulty } => {
                let difficulty = i32::try_from(*difficulty).unwrap_or(i32::MAX);
                player.update_rewrite_if_active(&server, |rewrite| rewrite.difficulty = difficulty);
            }
            _ => {}
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{start_game, Harness};
    use crate::transfer::TransferPhase;
    use tideway_core::Vector3f;
    use tideway_protocol::{dimension, GameRuleValue};

    #[test]
    fn test_merge_game_rules() {
        let mut rules = vec![
            GameRule::new("dodaylightcycle", GameRuleValue::Bool(true)),
            GameRule::new("randomtickspeed", GameRuleValue::Int(1)),
        ];
        merge_game_rules(
            &mut rules,
            &[
                GameRule::new("dodaylightcycle", GameRuleValue::Bool(false)),
                GameRule::new("showcoordinates", GameRuleValue::Bool(true)),
            ],
        );

        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].value, GameRuleValue::Bool(false));
        assert_eq!(rules[2].name, "showcoordinates");
    }

    #[tokio::test]
    async fn test_new_backend_keeps_map_current_after_transfer() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;
        let lobby = player.server().unwrap();
        let replaced = ConnectedDownstreamHandler::new(&player, &lobby);

        let callback = player.connect(harness.server("survival")).unwrap();
        let survival = harness.wait_for_backend("survival").await;
        survival.inject_batch(&[Packet::StartGame(Box::new(start_game(77, dimension::OVERWORLD)))]);
        survival.inject_batch(&[Packet::PlayStatus {
            status: play_status::PLAYER_SPAWN,
        }]);
        assert_eq!(callback.phase(), TransferPhase::Done);

        survival.inject_batch(&[
            Packet::ChangeDimension {
                dimension: dimension::THE_END,
                position: Vector3f::new(0.5, 80.0, 0.5),
                respawn: false,
            },
            Packet::SetPlayerGameType { game_mode: 1 },
            Packet::GameRulesChanged {
                game_rules: vec![GameRule::new("dodaylightcycle", GameRuleValue::Bool(false))],
            },
        ]);
        let rewrite = player.rewrite();
        assert_eq!(rewrite.dimension, dimension::THE_END);
        assert_eq!(rewrite.spawn_position, Vector3f::new(0.5, 80.0, 0.5));
        assert_eq!(rewrite.game_mode, 1);
        assert!(rewrite.game_rules.iter().any(|rule| rule.name == "dodaylightcycle"));

        // The old backend's handler no longer touches the map
        replaced
            .handle_packet(&mut Packet::SetPlayerGameType { game_mode: 3 })
            .unwrap();
        assert_eq!(player.rewrite().game_mode, 1);
        assert!(!player.update_rewrite_if_active(&lobby, |rewrite| rewrite.game_mode = 2));
    }
}
