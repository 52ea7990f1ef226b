//! Server-Sent Events (SSE) parser for LLM streaming responses.
//!
//! Implements a reusable SSE parser that converts a byte stream into
//! structured [`SseEvent`]s. Handles multi-line `data:` fields,
//! event types, comment lines, and the `[DONE]` sentinel.
//!
//! # SSE Format
//!
//! ```text
//! event: message
//! data: {"key": "value"}
//!
//! data: {"next": "chunk"}
//!
//! data: [DONE]
//! ```
//!
//! # Examples
//!
//! ```
//! use fae::fae_llm::providers::sse::SseEvent;
//!
//! let event = SseEvent {
//!     event_type: Some("message".into()),
//!     data: r#"{"text":"hello"}"#.into(),
//!     id: None,
//! };
//! assert_eq!(event.event_type.as_deref(), Some("message"));
//! ```

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field). `None` if not specified.
    pub event_type: Option<String>,
    /// The data payload (from `data:` field(s)). Multiple data lines are joined with `\n`.
    pub data: String,
    /// The event ID (from `id:` field). `None` if not specified.
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Internal state for building an SSE event from lines.
#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
}

impl EventBuilder {
    /// Whether we have any data to emit.
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    /// Build the event and reset state.
    fn build(&mut self) -> SseEvent {
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
            id: self.id.take(),
        };
        self.data_lines.clear();
        event
    }

    /// Process a single line of SSE input.
    ///
    /// Returns `Some(SseEvent)` when an empty line (event boundary) is encountered
    /// and there is accumulated data.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        // Empty line = event boundary
        if line.is_empty() {
            if self.has_data() {
                return Some(self.build());
            }
            return None;
        }

        // Comment line (starts with ':')
        if line.starts_with(':') {
            return None;
        }

        // Parse field:value
        if let Some((field, value)) = parse_field(line) {
            match field {
                "data" => self.data_lines.push(value.to_string()),
                "event" => self.event_type = Some(value.to_string()),
                "id" => self.id = Some(value.to_string()),
                // Ignore unknown fields per SSE spec
                _ => {}
            }
        }

        None
    }
}

/// Parse a line into (field, value). The value has leading space stripped.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let colon_pos = line.find(':')?;
    let field = &line[..colon_pos];
    let mut value = &line[colon_pos + 1..];
    // Strip single leading space after colon per SSE spec
    if value.starts_with(' ') {
        value = &value[1..];
    }
    Some((field, value))
}

/// Parse raw SSE text into a vector of events.
///
/// This is the primary entry point for parsing SSE data received as a
/// complete string (e.g. from a buffered response). For streaming use,
/// create an [`SseLineParser`] and feed lines incrementally.
///
/// # Examples
///
/// ```
/// use fae::fae_llm::providers::sse::parse_sse_text;
///
/// let input = "data: hello\n\ndata: world\n\n";
/// let events = parse_sse_text(input);
/// assert_eq!(events.len(), 2);
/// assert_eq!(events[0].data, "hello");
/// assert_eq!(events[1].data, "world");
/// ```
pub fn parse_sse_text(text: &str) -> Vec<SseEvent> {
    let mut builder = EventBuilder::default();
    let mut events = Vec::new();

    for line in text.lines() {
        if let Some(event) = builder.process_line(line) {
            events.push(event);
        }
    }

    // Flush any trailing event (data without final empty line)
    if builder.has_data() {
        events.push(builder.build());
    }

    events
}

/// Incrementally parse SSE bytes, yielding events as they become complete.
///
/// Maintains internal line buffer state. Feed chunks of bytes via
/// [`SseLineParser::push`] and collect emitted events.
#[derive(Debug, Default)]
pub struct SseLineParser {
    line_buffer: String,
    builder: EventBuilder,
}

impl SseLineParser {
    /// Create a new incremental SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes into the parser.
    ///
    /// Returns any complete events that were parsed from this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let text = String::from_utf8_lossy(chunk);
        let mut events = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                // Handle \r\n by stripping trailing \r
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(event) = self.builder.process_line(line) {
                    events.push(event);
                }
            } else {
                self.line_buffer.push(ch);
            }
        }

        events
    }

    /// Flush any remaining buffered data as a final event.
    ///
    /// Call this when the stream ends to emit any incomplete event.
    pub fn flush(&mut self) -> Option<SseEvent> {
        // Process any remaining line in the buffer
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            self.builder.process_line(line);
        }

        if self.builder.has_data() {
            Some(self.builder.build())
        } else {
            None
        }
    }
}
