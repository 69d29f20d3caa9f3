//! Shared plumbing for the Braitenbots headless runner.

pub mod command;
pub mod scenario;

pub use command::{
    InteractionReceiver, InteractionSender, InteractionSubmit, create_interaction_bus,
    drain_pending_interactions, make_interaction_submit,
};
pub use scenario::Scenario;
