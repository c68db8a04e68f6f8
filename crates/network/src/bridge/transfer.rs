use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use super::downstream::rewrite_downstream;
use super::translate_batch;
use crate::player::ProxiedPlayer;
use crate::rewrite::RewriteData;
use crate::transport::{BatchHandler, Session};

/// Which link of a transfer the bridge sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeRole {
    /// The backend being left; translated with the map active when the transfer began
    Old,
    /// The backend being joined; translated with the map pinned at accept
    New,
}

#[derive(Default)]
struct HoldState {
    held: bool,
    retired: bool,
    queue: VecDeque<Vec<Bytes>>,
}

/// Backend to client bridge with a hold ("dimension lock")
///
/// While held, every translated batch is queued instead of written. The
/// queue is drained exactly once, in arrival order, by [`release`] or
/// [`retire`]. Writes to the client happen under the hold lock, so a batch
/// can never overtake the queue it is racing with.
///
/// [`release`]: TransferBatchBridge::release
/// [`retire`]: TransferBatchBridge::retire
pub struct TransferBatchBridge {
    player: Weak<ProxiedPlayer>,
    role: BridgeRole,
    hold: Mutex<HoldState>,
    pinned: RwLock<Option<Arc<RewriteData>>>,
}

impl TransferBatchBridge {
    /// The new link starts held; the old one only once the transfer is accepted
    ///
    /// The old link pins the current map here. Its ids stay valid for that
    /// backend even after the player's link has moved on.
    pub fn new(player: &Arc<ProxiedPlayer>, role: BridgeRole) -> Self {
        let pinned = (role == BridgeRole::Old).then(|| player.rewrite());
        Self {
            player: Arc::downgrade(player),
            role,
            hold: Mutex::new(HoldState {
                held: role == BridgeRole::New,
                ..Default::default()
            }),
            pinned: RwLock::new(pinned),
        }
    }

    pub fn role(&self) -> BridgeRole {
        self.role
    }

    pub fn hold(&self) {
        self.hold.lock().held = true;
    }

    pub fn is_held(&self) -> bool {
        self.hold.lock().held
    }

    pub fn queued_batches(&self) -> usize {
        self.hold.lock().queue.len()
    }

    /// Rewrite map of the new backend
    pub fn pin(&self, rewrite: Arc<RewriteData>) {
        *self.pinned.write() = Some(rewrite);
    }

    /// Flush the queue and pass later batches straight through
    pub fn release(&self) {
        let mut state = self.hold.lock();
        state.held = false;
        self.drain(&mut state);
    }

    /// Flush the queue and drop every later batch
    pub fn retire(&self) {
        let mut state = self.hold.lock();
        state.held = false;
        state.retired = true;
        self.drain(&mut state);
    }

    fn drain(&self, state: &mut HoldState) {
        let Some(player) = self.player.upgrade() else {
            state.queue.clear();
            return;
        };
        if !state.queue.is_empty() {
            tracing::debug!("[{}] Flushing {} held batches ({:?})", player.name(), state.queue.len(), self.role);
        }
        while let Some(frames) = state.queue.pop_front() {
            player.upstream().send_batch(frames);
        }
    }

    fn forward(&self, player: &ProxiedPlayer, frames: Vec<Bytes>) {
        let mut state = self.hold.lock();
        if state.retired {
            tracing::trace!("[{}] Dropping batch from retired link", player.name());
        } else if state.held {
            state.queue.push_back(frames);
        } else {
            player.upstream().send_batch(frames);
        }
    }
}

impl BatchHandler for TransferBatchBridge {
    fn handle(&self, source: &dyn Session, batch: Vec<Bytes>) {
        let Some(player) = self.player.upgrade() else {
            return;
        };

        let rewrite = self.pinned.read().clone();
        let track = self.role == BridgeRole::New || !self.is_held();

        // Hooks may complete the transfer, which takes the hold lock
        let frames = translate_batch(
            source,
            batch,
            |packet| rewrite_downstream(&player, rewrite.as_deref(), packet, track),
            None,
        );
        if !frames.is_empty() {
            self.forward(&player, frames);
        }
    }

    fn on_disconnect(&self, source: &dyn Session, reason: &str) {
        if self.role != BridgeRole::Old {
            return;
        }
        let Some(player) = self.player.upgrade() else {
            return;
        };
        let active = player.server().is_some_and(|server| {
            std::ptr::addr_eq(Arc::as_ptr(server.downstream().session()), source as *const dyn Session)
        });
        if active {
            tracing::info!("[{}] Downstream closed during transfer: {}", player.name(), reason);
            player.disconnect(Some(reason));
        }
    }
}
