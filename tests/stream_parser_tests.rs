use askdoc::api::{dispatch_frame, FrameDecoder};
use askdoc::types::{StreamEvent, WireFrame};

fn events(frames: Vec<WireFrame>) -> Vec<StreamEvent> {
    frames.into_iter().filter_map(dispatch_frame).collect()
}

#[test]
fn test_fragmented_frame() {
    let mut decoder = FrameDecoder::new();

    let first = decoder.process(b"data: {\"type\":\"cont");
    assert!(first.is_empty());
    assert!(decoder.has_partial_line());

    let second = decoder.process(b"ent\",\"content\":\"Hi\"}\n\n");
    assert_eq!(
        events(second),
        vec![StreamEvent::ContentDelta {
            text: "Hi".to_string()
        }]
    );
    assert!(!decoder.has_partial_line());
}

#[test]
fn test_parse_error_does_not_stop_decoding() {
    let mut decoder = FrameDecoder::new();

    let frames = decoder.process(
        b"data: {invalid json}\n\ndata: {\"type\":\"done\",\"suggested_timestamp\":12.5}\n\n",
    );
    assert_eq!(
        events(frames),
        vec![StreamEvent::Done {
            suggested_timestamp: Some(12.5)
        }]
    );
}

#[test]
fn test_full_turn_in_one_chunk() {
    let mut decoder = FrameDecoder::new();
    let body = concat!(
        "data: {\"type\":\"content\",\"content\":\"The \"}\n\n",
        "data: {\"type\":\"content\",\"content\":\"topic \"}\n\n",
        "data: {\"type\":\"content\",\"content\":\"is X.\"}\n\n",
        "data: {\"type\":\"done\",\"suggested_timestamp\":42}\n\n",
    );

    let decoded = events(decoder.process(body.as_bytes()));
    let text: String = decoded
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ContentDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "The topic is X.");
    assert_eq!(
        decoded.last(),
        Some(&StreamEvent::Done {
            suggested_timestamp: Some(42.0)
        })
    );
    assert!(decoded.last().is_some_and(StreamEvent::is_terminal));
}

#[test]
fn test_byte_at_a_time_delivery_matches_whole_body() {
    let body = "data: {\"type\":\"content\",\"content\":\"naïve ☕\"}\r\n\r\ndata: {\"type\":\"error\",\"error\":\"rate limited\"}\n\n";

    let mut whole = FrameDecoder::new();
    let expected = events(whole.process(body.as_bytes()));

    let mut trickle = FrameDecoder::new();
    let mut actual = Vec::new();
    for byte in body.as_bytes() {
        actual.extend(events(trickle.process(std::slice::from_ref(byte))));
    }

    assert_eq!(actual, expected);
    assert_eq!(
        actual,
        vec![
            StreamEvent::ContentDelta {
                text: "naïve ☕".to_string()
            },
            StreamEvent::Error {
                message: "rate limited".to_string()
            },
        ]
    );
}

#[test]
fn test_unknown_frame_types_are_ignored() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.process(b"event: ping\ndata: {\"type\":\"heartbeat\"}\n\n: comment\n");
    assert_eq!(frames, vec![WireFrame::Unknown]);
    assert!(events(frames).is_empty());
}

#[test]
fn test_finish_flushes_trailing_line() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.process(b"data: {\"type\":\"done\"}").is_empty());
    assert_eq!(
        events(decoder.finish()),
        vec![StreamEvent::Done {
            suggested_timestamp: None
        }]
    );
    assert!(decoder.finish().is_empty());
}
