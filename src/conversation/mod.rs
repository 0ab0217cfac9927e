//! The two-agent conversation: an introduction that learns the listener's name
//! and home, and a storyteller that takes over, exactly once, when both are known.

pub mod controller;
pub mod profile;
pub mod state;

pub use controller::{ConversationController, Handoff, TurnOutcome, Utterance, UtteranceKind};
pub use profile::UserProfile;
pub use state::{ConversationState, StateKind};
