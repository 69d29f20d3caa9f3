//! Bounded interaction bus between input surfaces and the world loop.

use braitenbots_core::{Interaction, World};
use crossfire::mpmc;
use crossfire::{MRx, MTx, TryRecvError, TrySendError, detect_backoff_cfg};
use std::sync::Arc;
use tracing::{debug, warn};

pub type InteractionSender = MTx<Interaction>;
pub type InteractionReceiver = MRx<Interaction>;
pub type InteractionSubmit = Arc<dyn Fn(Interaction) -> bool + Send + Sync>;

/// Create the bounded MPMC bus carrying pointer and keyboard interactions.
pub fn create_interaction_bus(capacity: usize) -> (InteractionSender, InteractionReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_blocking(capacity)
}

/// Forward every queued interaction into the world without blocking.
pub fn drain_pending_interactions(receiver: &InteractionReceiver, world: &mut World) {
    loop {
        match receiver.try_recv() {
            Ok(command) => {
                debug!(?command, "queueing interaction");
                world.queue_interaction(command);
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
}

/// Build a submit closure that drops with a warning when the bus is full.
pub fn make_interaction_submit(sender: InteractionSender) -> InteractionSubmit {
    let sender = Arc::new(sender);
    Arc::new(
        move |command: Interaction| match sender.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                warn!(?cmd, "interaction queue full; dropping command");
                false
            }
            Err(TrySendError::Disconnected(cmd)) => {
                warn!(?cmd, "interaction queue disconnected");
                false
            }
        },
    )
}
