use super::logging::emit_sse_parse_error;
use crate::types::TurnEvent;
use anyhow::Result;

/// Incremental SSE parser for the node's per-job event stream. Chunks may
/// split frames at arbitrary byte positions; complete frames are drained,
/// the remainder stays buffered.
#[derive(Default)]
pub struct EventStreamParser {
    buffer: String,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<TurnEvent>> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let frame_end = start + end + 2;
            let frame = &self.buffer[start..frame_end];

            let mut event_name = None;
            let mut data = None;

            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event_name = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = Some(rest.trim().to_string());
                }
            }

            if let (Some(name), Some(json_data)) = (event_name, data) {
                if json_data == "[DONE]"
                    || !matches!(name.as_str(), "partial_content" | "done" | "error")
                {
                    start = frame_end;
                    continue;
                }

                match serde_json::from_str::<TurnEvent>(&json_data) {
                    Ok(event) => events.push(event),
                    Err(parse_error) => {
                        tracing::warn!(event = %name, %parse_error, "skipping malformed stream frame");
                        emit_sse_parse_error(Some(&name), &json_data, &parse_error);
                    }
                }
            }

            start = frame_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(events)
    }

    /// Unconsumed partial frame, if any. Useful when the transport closes
    /// mid-frame.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame_parses_to_event() {
        let mut parser = EventStreamParser::new();
        let events = parser
            .process(b"event: partial_content\ndata: {\"type\":\"partial_content\",\"text\":\"Hi\"}\n\n")
            .expect("parse");
        assert_eq!(
            events,
            vec![TurnEvent::PartialContent {
                text: "Hi".to_string()
            }]
        );
        assert!(parser.flush().is_empty());
    }

    #[test]
    fn test_unknown_event_names_are_skipped() {
        let mut parser = EventStreamParser::new();
        let events = parser
            .process(b"event: heartbeat\ndata: {\"type\":\"heartbeat\"}\n\nevent: done\ndata: {\"type\":\"done\"}\n\n")
            .expect("parse");
        assert_eq!(events, vec![TurnEvent::Done]);
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut parser = EventStreamParser::new();
        let events = parser
            .process(b"event: partial_content\ndata: {\"type\":\"partial")
            .expect("parse");
        assert!(events.is_empty());
        assert!(!parser.flush().is_empty());
    }
}
