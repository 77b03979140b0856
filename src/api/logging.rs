use crate::util::parse_bool_flag;
use serde_json::Value;

pub(crate) const DEBUG_PAYLOAD_ENV: &str = "ASKDOC_DEBUG_PAYLOAD";
const MAX_LOGGED_FRAME_CHARS: usize = 512;

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(url = request_url, "request payload:\n{formatted_payload}");
}

pub fn emit_frame_parse_error(json_data: &str, parse_error: &serde_json::Error) {
    tracing::warn!(
        error = %parse_error,
        data = %clip(json_data),
        "skipping malformed stream frame"
    );
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_LOGGED_FRAME_CHARS {
        return text.to_string();
    }
    let clipped: String = text.chars().take(MAX_LOGGED_FRAME_CHARS).collect();
    format!("{clipped}...")
}
