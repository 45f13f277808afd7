//! Incremental Server-Sent-Events parser.
//!
//! Both HTTP transports feed response body chunks into [`SseParser`] and get
//! back complete events. Frames are delimited by a blank line; `data:` lines
//! are concatenated with newlines, `id:` sets the resumption watermark, and
//! unrecognised fields and comment lines are ignored.

/// One parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The `event:` field, when present.
    pub event: Option<String>,
    /// Concatenated `data:` lines.
    pub data: String,
    /// The `id:` field, when present.
    pub id: Option<String>,
}

/// Stateful chunk-by-chunk SSE parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk, returning every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let frame = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + 2);
            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut event_type: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_id: Option<String> = None;
    let mut saw_field = false;

    for line in frame.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        // A line starting with ':' is a comment (keep-alives use these).
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.find(':') {
            Some(pos) => (&line[..pos], line[pos + 1..].strip_prefix(' ').unwrap_or(&line[pos + 1..])),
            None => (line, ""),
        };

        match field {
            "event" => {
                event_type = Some(value.to_string());
                saw_field = true;
            }
            "data" => {
                data_lines.push(value);
                saw_field = true;
            }
            "id" => {
                event_id = Some(value.to_string());
                saw_field = true;
            }
            _ => {}
        }
    }

    if !saw_field {
        return None;
    }
    Some(SseEvent {
        event: event_type,
        data: data_lines.join("\n"),
        id: event_id,
    })
}
