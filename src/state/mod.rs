mod conversation;
pub mod registry;
pub mod relay;

pub use conversation::{
    ConversationSession, ConversationState, ConversationUpdate, TurnOutcome, TurnPhase,
    UpdateSender,
};
pub use registry::SessionRegistry;
pub use relay::{current_jump_target, jump_target, suggestion_for, SuggestionRelay};
