mod core;
mod history;
mod state;
mod streaming;


pub use state::{ConversationSession, ConversationState, ConversationUpdate, TurnOutcome, TurnPhase};
pub use streaming::UpdateSender;
