pub mod auth;
pub mod client;
pub mod error;
pub mod events;
pub mod logging;
#[cfg(test)]
pub mod mock_client;
pub mod stream;

pub use auth::{CredentialStore, SharedToken};
pub use client::{ApiClient, ByteStream};
pub use error::{ApiError, TurnError};
pub use events::dispatch_frame;
pub use stream::FrameDecoder;
