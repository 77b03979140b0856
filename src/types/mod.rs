mod api;

pub use api::{
    parse_server_datetime, AskRequest, ChatHistory, ExtractionMetadata, Message,
    MessageMetadata, Role, StreamEvent, TimestampEntry, TimestampResponse, WireFrame,
    MAX_QUESTION_CHARS,
};
