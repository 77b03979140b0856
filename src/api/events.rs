use crate::types::{StreamEvent, WireFrame};

/// Classifies a decoded frame. `None` means the frame carries nothing the
/// conversation needs (unknown `type`).
pub fn dispatch_frame(frame: WireFrame) -> Option<StreamEvent> {
    match frame {
        WireFrame::Content { content } => Some(StreamEvent::ContentDelta { text: content }),
        WireFrame::Error { error } => {
            let message = if error.trim().is_empty() {
                "the server reported an error without details".to_string()
            } else {
                error
            };
            Some(StreamEvent::Error { message })
        }
        WireFrame::Done {
            suggested_timestamp,
        } => Some(StreamEvent::Done {
            suggested_timestamp: sanitize_suggestion(suggested_timestamp),
        }),
        WireFrame::Unknown => {
            tracing::debug!("ignoring stream frame with unrecognized type");
            None
        }
    }
}

/// Negative or non-finite hints cannot address a media position.
fn sanitize_suggestion(seconds: Option<f64>) -> Option<f64> {
    match seconds {
        Some(value) if value.is_finite() && value >= 0.0 => Some(value),
        Some(value) => {
            tracing::warn!(suggested_timestamp = value, "dropping unusable suggested timestamp");
            None
        }
        None => None,
    }
}
