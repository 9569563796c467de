//! Request and response types for the mimikeepass protocol

use serde::{Deserialize, Serialize};

/// Fully-qualified method name for entry lookups
pub const GET_ENTRY_METHOD: &str = "fr.urdhr.mimikeepass.GetEntry";

/// Request envelope sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Fully-qualified method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub parameters: EntryQuery,
    /// Fire-and-forget: when true the daemon sends no response frame
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub oneway: bool,
}

impl Request {
    pub fn get_entry(parameters: EntryQuery) -> Self {
        Self {
            method: GET_ENTRY_METHOD.to_string(),
            parameters,
            oneway: false,
        }
    }
}

/// Lookup filters for `GetEntry`.
///
/// Every field is optional and absent fields must be left out of the wire
/// payload entirely (never sent as `null`); the underlying store treats a
/// present-but-null filter differently from an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl EntryQuery {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.url.is_none() && self.uuid.is_none() && self.title.is_none()
    }
}

/// One retrievable secret record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Response frame from the daemon.
///
/// `Entry(None)` serializes as `null` (no match), `Entry(Some(_))` as the
/// entry map, and `Error` as `{"error": "..."}`. Clients only look for a
/// string `password` field inside a map, so an error map reads as "no
/// answer" to older clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Entry(Option<Entry>),
    Error { error: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_filter_fields_are_omitted() {
        let request = Request::get_entry(EntryQuery {
            username: Some("alice".into()),
            ..Default::default()
        });

        let json = serde_json::to_value(&request).unwrap();
        let parameters = json["parameters"].as_object().unwrap();

        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters["username"], "alice");
    }

    #[test]
    fn oneway_defaults_to_false() {
        let request: Request =
            serde_json::from_str(r#"{"method": "fr.urdhr.mimikeepass.GetEntry", "parameters": {}}"#)
                .unwrap();
        assert!(!request.oneway);
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn request_roundtrip() {
        let request = Request {
            method: GET_ENTRY_METHOD.into(),
            parameters: EntryQuery {
                url: Some("ssh://host.example".into()),
                username: Some("alice".into()),
                ..Default::default()
            },
            oneway: true,
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.method, GET_ENTRY_METHOD);
        assert_eq!(parsed.parameters, request.parameters);
        assert!(parsed.oneway);
    }

    #[test]
    fn no_match_serializes_as_null() {
        let json = serde_json::to_string(&Response::Entry(None)).unwrap();
        assert_eq!(json, "null");
    }

    #[test]
    fn entry_response_is_a_map_without_null_fields() {
        let response = Response::Entry(Some(Entry {
            title: Some("Mail".into()),
            password: Some("s3cret".into()),
            ..Default::default()
        }));

        let json = serde_json::to_value(&response).unwrap();
        let map = json.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["password"], "s3cret");
    }

    #[test]
    fn error_response_shape() {
        let json = serde_json::to_value(Response::error("unknown method")).unwrap();
        assert_eq!(json["error"], "unknown method");
    }

    #[test]
    fn json_payloads_never_contain_nul() {
        // The framing layer relies on this: JSON escapes control characters,
        // so a NUL inside a string value never appears as a raw byte.
        let request = Request::get_entry(EntryQuery {
            title: Some("weird\0title".into()),
            ..Default::default()
        });
        let bytes = serde_json::to_vec(&request).unwrap();
        assert!(!bytes.contains(&0));
    }
}
