//! Proxy events
//!
//! Notifications for plugins and the console. Listeners run synchronously on
//! the task that emitted the event, after the state change they describe.

use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tideway_core::PlayerId;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    PlayerLogin {
        player: PlayerId,
        name: String,
        address: SocketAddr,
    },
    PlayerDisconnect {
        player: PlayerId,
        name: String,
        reason: Option<String>,
    },
    /// The player now plays on `new`; `old` was disconnected
    TransferComplete {
        player: PlayerId,
        old: String,
        new: String,
    },
    /// A connection attempt (initial or transfer) to `target` failed
    ServerConnectFailed {
        player: PlayerId,
        target: String,
        reason: String,
    },
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ProxyEvent);

    /// A closed listener is dropped from the registry after the next emit
    fn is_closed(&self) -> bool {
        false
    }
}

struct ChannelListener(mpsc::UnboundedSender<ProxyEvent>);

impl EventListener for ChannelListener {
    fn on_event(&self, event: &ProxyEvent) {
        let _ = self.0.send(event.clone());
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Listener registry
#[derive(Default)]
pub struct EventManager {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    /// Receive every future event through a channel
    pub fn channel(&self) -> mpsc::UnboundedReceiver<ProxyEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(Arc::new(ChannelListener(tx)));
        rx
    }

    pub fn emit(&self, event: ProxyEvent) {
        tracing::debug!("Event: {:?}", event);
        // Snapshot so listeners may subscribe from inside a callback
        let listeners = self.listeners.read().clone();
        let mut closed = false;
        for listener in &listeners {
            listener.on_event(&event);
            closed |= listener.is_closed();
        }
        if closed {
            self.listeners.write().retain(|listener| !listener.is_closed());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_receives_events() {
        let events = EventManager::new();
        let mut rx = events.channel();

        events.emit(ProxyEvent::TransferComplete {
            player: PlayerId::new(1),
            old: "lobby".into(),
            new: "survival".into(),
        });

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, ProxyEvent::TransferComplete { ref new, .. } if new == "survival"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_channel_is_unsubscribed() {
        let events = EventManager::new();
        let mut kept = events.channel();
        drop(events.channel());
        assert_eq!(events.listener_count(), 2);

        events.emit(ProxyEvent::PlayerDisconnect {
            player: PlayerId::new(3),
            name: "Alex".into(),
            reason: None,
        });

        assert_eq!(events.listener_count(), 1);
        assert!(matches!(kept.try_recv(), Ok(ProxyEvent::PlayerDisconnect { .. })));
    }
}
