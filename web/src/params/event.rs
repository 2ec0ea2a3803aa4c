use serde::Deserialize;
use utoipa::ToSchema;

/// Body of `POST /events`.
#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct PublishParams {
    /// Optional `id:` field; must not contain a line break.
    #[serde(default)]
    pub(crate) id: Option<String>,
    /// Optional `event:` type; must not contain a line break.
    #[serde(default)]
    pub(crate) event: Option<String>,
    /// Payload; may span several lines.
    pub(crate) data: String,
}

impl TryFrom<PublishParams> for sse::Event {
    type Error = sse::Error;

    fn try_from(params: PublishParams) -> Result<Self, Self::Error> {
        let mut event = sse::Event::new(params.data);
        if let Some(id) = params.id {
            event = event.with_id(id)?;
        }
        if let Some(kind) = params.event {
            event = event.with_event(kind)?;
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sse::{ErrorKind, Field};

    fn parse(json: &str) -> PublishParams {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_optional_fields_default_to_empty() {
        let event = sse::Event::try_from(parse(r#"{"data":"hi"}"#)).unwrap();

        assert_eq!(event.id(), "");
        assert_eq!(event.event(), "");
        assert_eq!(event.to_string(), "data: hi\n\n");
    }

    #[test]
    fn test_all_fields_are_carried_over() {
        let event =
            sse::Event::try_from(parse(r#"{"id":"7","event":"update","data":"a\nb"}"#)).unwrap();

        assert_eq!(event.to_string(), "id: 7\nevent: update\ndata: a\ndata: b\n\n");
    }

    #[test]
    fn test_line_break_in_event_type_is_rejected() {
        let err = sse::Event::try_from(parse(r#"{"event":"a\nb","data":"x"}"#)).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidField(Field::Event));
    }

    #[test]
    fn test_missing_data_fails_to_deserialize() {
        assert!(serde_json::from_str::<PublishParams>(r#"{"id":"1"}"#).is_err());
    }
}
