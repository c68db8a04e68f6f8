//! Operator commands read from stdin

use std::sync::Arc;
use tideway_network::ProxyServer;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Transfer { player: String, server: String },
    Servers,
    Players,
    Stop,
    Help,
}

fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Err(String::new());
    };
    let args: Vec<&str> = words.collect();

    match (command.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("transfer", [player, server]) => Ok(Command::Transfer {
            player: player.to_string(),
            server: server.to_string(),
        }),
        ("transfer", _) => Err("usage: transfer <player> <server>".into()),
        ("servers", []) => Ok(Command::Servers),
        ("players", []) => Ok(Command::Players),
        ("stop" | "end", []) => Ok(Command::Stop),
        ("help" | "?", _) => Ok(Command::Help),
        (other, _) => Err(format!("unknown command '{}', try 'help'", other)),
    }
}

fn execute(server: &ProxyServer, command: Command) -> bool {
    let context = server.context();
    match command {
        Command::Transfer { player, server: target } => match server.transfer(&player, &target) {
            Ok(_) => tracing::info!("Transferring {} to {}", player, target),
            Err(e) => tracing::warn!("Transfer failed: {}", e),
        },
        Command::Servers => {
            for info in context.servers.values() {
                tracing::info!(
                    "{} ({}) at {} - {} players",
                    info.name(),
                    info.server_type(),
                    info.address(),
                    info.player_count()
                );
            }
        }
        Command::Players => {
            let players = context.players.players();
            tracing::info!("{} players online", players.len());
            for player in players {
                let server = player
                    .server()
                    .map(|server| server.info().name().to_string())
                    .unwrap_or_else(|| "-".into());
                tracing::info!("  {} {} on {}", player.id(), player.name(), server);
            }
        }
        Command::Stop => {
            server.shutdown();
            return false;
        }
        Command::Help => {
            tracing::info!("Commands: transfer <player> <server>, servers, players, stop");
        }
    }
    true
}

pub async fn run(server: Arc<ProxyServer>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Console read failed: {}", e);
                break;
            }
        };
        match parse(&line) {
            Ok(command) => {
                if !execute(&server, command) {
                    break;
                }
            }
            Err(message) if message.is_empty() => {}
            Err(message) => tracing::warn!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse("transfer Alex survival"),
            Ok(Command::Transfer {
                player: "Alex".into(),
                server: "survival".into()
            })
        );
        assert_eq!(parse("  PLAYERS "), Ok(Command::Players));
        assert_eq!(parse("stop"), Ok(Command::Stop));
        assert!(parse("transfer Alex").is_err());
        assert!(parse("reload").is_err());
        assert_eq!(parse(""), Err(String::new()));
    }
}
