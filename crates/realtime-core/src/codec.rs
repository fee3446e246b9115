// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use crate::{Frame, Result};

pub fn encode_frame(frame: &Frame) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}

pub fn decode_frame(text: &str) -> Result<Frame> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PingMessage;

    #[test]
    fn test_encode_decode_frame() {
        let frame = Frame::Ping(PingMessage { timestamp: 12345 });
        let encoded = encode_frame(&frame).unwrap();
        let decoded = decode_frame(&encoded).unwrap();

        match decoded {
            Frame::Ping(ping) => assert_eq!(ping.timestamp, 12345),
            _ => panic!("wrong frame type"),
        }
    }

    #[test]
    fn test_encode_decode_event() {
        let frame = Frame::event("message:new", serde_json::json!({"body": "hi"}));
        let encoded = encode_frame(&frame).unwrap();
        let decoded = decode_frame(&encoded).unwrap();

        match decoded {
            Frame::Event(ev) => {
                assert_eq!(ev.event, "message:new");
                assert_eq!(ev.data["body"], "hi");
            }
            _ => panic!("wrong frame type"),
        }
    }

    #[test]
    fn test_decode_unknown_type() {
        let result = decode_frame(r#"{"type":"teleport","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_frame("not json at all").is_err());
    }
}
