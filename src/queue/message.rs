use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Subject the API publishes to when a link is saved.
pub const SUBJECT_LINKS_SAVED: &str = "keepstack.links.saved";

/// Payload carried by a link-saved message. The id travels as a string so
/// the wire format stays identical for non-Rust publishers.
#[derive(Debug, Serialize, Deserialize)]
pub struct LinkSaved {
    pub link_id: String,
}

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid link id: {0}")]
    LinkId(#[from] uuid::Error),
}

/// Build the JSON body for a link-saved message.
pub fn link_saved_payload(link_id: Uuid) -> serde_json::Value {
    serde_json::json!({ "link_id": link_id.to_string() })
}

/// Parse a delivered payload into a link id. Failures here mean the message
/// is garbage and must be dropped, never retried.
pub fn parse_link_saved(payload: &serde_json::Value) -> Result<Uuid, PayloadError> {
    let parsed: LinkSaved = serde_json::from_value(payload.clone())?;
    Ok(Uuid::parse_str(&parsed.link_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_link_id() {
        let id = Uuid::new_v4();
        let payload = link_saved_payload(id);
        assert_eq!(parse_link_saved(&payload).unwrap(), id);
    }

    #[test]
    fn rejects_non_uuid_link_id() {
        let payload = serde_json::json!({ "link_id": "not-a-uuid" });
        assert!(matches!(
            parse_link_saved(&payload),
            Err(PayloadError::LinkId(_))
        ));
    }

    #[test]
    fn rejects_missing_field() {
        let payload = serde_json::json!({ "something_else": true });
        assert!(matches!(
            parse_link_saved(&payload),
            Err(PayloadError::Json(_))
        ));
    }

    #[test]
    fn rejects_wrong_type() {
        let payload = serde_json::json!({ "link_id": 42 });
        assert!(parse_link_saved(&payload).is_err());
    }
}
