use crate::error::{Error, Field, Result};
use std::fmt;
use std::time::Duration;

const KEEP_ALIVE: &str = "keep-alive";

fn single_line(value: &str, field: Field) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(Error::invalid_field(field));
    }
    Ok(())
}

/// One unit of published information, rendered as an SSE event block.
///
/// `id` and `event` are validated on construction, so every `Event` renders
/// to a well-formed block. `data` may span several lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    id: String,
    event: String,
    data: String,
}

impl Event {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        single_line(&id, Field::Id)?;
        self.id = id;
        Ok(self)
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Result<Self> {
        let event = event.into();
        single_line(&event, Field::Event)?;
        self.event = event;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.id.is_empty() {
            writeln!(f, "id: {}", self.id)?;
        }
        if !self.event.is_empty() {
            writeln!(f, "event: {}", self.event)?;
        }
        for line in data_lines(&self.data) {
            writeln!(f, "data: {line}")?;
        }
        writeln!(f)
    }
}

/// Splits on `\n`, `\r\n` and `\r`. Unlike `str::lines`, a trailing line break
/// yields a trailing empty line.
fn data_lines(data: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = data;
    while let Some(at) = rest.find(['\r', '\n']) {
        lines.push(&rest[..at]);
        let width = if rest[at..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[at + width..];
    }
    lines.push(rest);
    lines
}

/// A comment line, ignored by clients. Used for keep-alives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment(String);

impl Comment {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        single_line(&text, Field::Comment)?;
        Ok(Self(text))
    }

    pub fn keep_alive() -> Self {
        Self(KEEP_ALIVE.to_string())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, ": {}\n\n", self.0)
    }
}

/// Reconnection delay advertised to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry(pub Duration);

impl fmt::Display for Retry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "retry: {}\n\n", self.0.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_event_renders_all_fields_and_splits_data() {
        let event = Event::new("a\nb")
            .with_id("7")
            .unwrap()
            .with_event("update")
            .unwrap();

        assert_eq!(
            event.to_string(),
            "id: 7\nevent: update\ndata: a\ndata: b\n\n"
        );
    }

    #[test]
    fn test_event_omits_empty_id_and_event() {
        assert_eq!(Event::new("hello").to_string(), "data: hello\n\n");
    }

    #[test]
    fn test_empty_data_still_renders_one_data_line() {
        let event = Event::new("").with_event("ping").unwrap();
        assert_eq!(event.to_string(), "event: ping\ndata: \n\n");
    }

    #[test]
    fn test_data_with_crlf_and_cr_line_breaks() {
        assert_eq!(
            Event::new("a\r\nb\rc").to_string(),
            "data: a\ndata: b\ndata: c\n\n"
        );
    }

    #[test]
    fn test_data_with_trailing_newline_keeps_empty_line() {
        assert_eq!(Event::new("a\n").to_string(), "data: a\ndata: \n\n");
    }

    #[test]
    fn test_id_with_line_break_is_rejected() {
        let err = Event::new("x").with_id("1\n2").unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidField(Field::Id));

        let err = Event::new("x").with_id("1\r2").unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidField(Field::Id));
    }

    #[test]
    fn test_event_name_with_line_break_is_rejected() {
        let err = Event::new("x").with_event("up\ndate").unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidField(Field::Event));
    }

    #[test]
    fn test_comment_rendering_and_validation() {
        assert_eq!(Comment::keep_alive().to_string(), ": keep-alive\n\n");
        assert_eq!(Comment::new("hi").unwrap().to_string(), ": hi\n\n");

        let err = Comment::new("a\nb").unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidField(Field::Comment));
    }

    #[test]
    fn test_retry_renders_milliseconds() {
        assert_eq!(
            Retry(Duration::from_secs(5)).to_string(),
            "retry: 5000\n\n"
        );
        assert_eq!(
            Retry(Duration::from_millis(1500)).to_string(),
            "retry: 1500\n\n"
        );
    }
}
