pub mod format;
pub mod index;
pub mod player;

pub use format::format_timestamp;
pub use index::{ActiveChange, PlaybackTracker, TimestampIndex};
pub use player::{BindingId, MediaBindingError, PlaybackElement, PlayerBinding, SimulatedPlayer};
