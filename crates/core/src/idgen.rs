//! Monotonic ID generation

use crate::PlayerId;
use std::sync::atomic::{AtomicU32, Ordering};

/// Thread-safe generator for proxy-local player IDs
///
/// IDs start at 1 and are never reused during the lifetime of the generator,
/// so a stale ID can never resolve to a newer player.
#[derive(Debug)]
pub struct IdGenerator {
    next_id: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
        }
    }

    /// Get the next available ID
    pub fn next_player_id(&self) -> PlayerId {
        PlayerId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let gen = IdGenerator::new();
        let id1 = gen.next_player_id();
        let id2 = gen.next_player_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.get(), 1);
        assert_eq!(id2.get(), 2);
    }
}
