//! Request frames and their typed payloads.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default number of clips returned when a request omits `limit` or sends 0.
pub const DEFAULT_LIMIT: usize = 20;

/// The `{type, data}` envelope every line on the socket carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Errors decoding an inbound frame. None of these close the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The line was not a `{type, data}` JSON object.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The `type` field named no known request.
    #[error("unknown command: {0}")]
    UnknownType(String),

    /// The payload did not fit the request's shape.
    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// The line exceeded the configured frame limit.
    #[error("frame exceeds {0} bytes")]
    TooLong(usize),
}

/// Payload for `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub limit: usize,
}

/// Payload for `search`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: usize,
}

/// Payload for requests that address a single clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: i64,
}

/// Payload for `clear`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearRequest {
    /// Keep pinned clips (both tiers) and drop only unpinned history.
    #[serde(default)]
    pub keep_pinned: bool,
}

/// Every request the daemon understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Recent clips, most recent first.
    List(ListRequest),
    /// Clips whose content contains `query`.
    Search(SearchRequest),
    /// Pinned clips only.
    Pins,
    /// Write a clip back to the system clipboard.
    CopyClip(IdRequest),
    Pin(IdRequest),
    Unpin(IdRequest),
    Remove(IdRequest),
    Clear(ClearRequest),
    /// Health check.
    Ping,
}

impl Request {
    /// Decode one line received from a client.
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        let frame: Frame = serde_json::from_str(line).map_err(FrameError::Malformed)?;
        Self::from_frame(frame)
    }

    /// Resolve an envelope into a typed request.
    pub fn from_frame(frame: Frame) -> Result<Self, FrameError> {
        let Frame { kind, data } = frame;
        let request = match kind.as_str() {
            "list" => Request::List(payload(&kind, data)?),
            "search" => Request::Search(payload(&kind, data)?),
            "pins" => Request::Pins,
            "copy_clip" => Request::CopyClip(payload(&kind, data)?),
            "pin" => Request::Pin(payload(&kind, data)?),
            "unpin" => Request::Unpin(payload(&kind, data)?),
            "remove" => Request::Remove(payload(&kind, data)?),
            "clear" => Request::Clear(payload(&kind, data)?),
            "ping" => Request::Ping,
            _ => return Err(FrameError::UnknownType(kind)),
        };
        Ok(request)
    }

    /// The wire name of this request.
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::List(_) => "list",
            Request::Search(_) => "search",
            Request::Pins => "pins",
            Request::CopyClip(_) => "copy_clip",
            Request::Pin(_) => "pin",
            Request::Unpin(_) => "unpin",
            Request::Remove(_) => "remove",
            Request::Clear(_) => "clear",
            Request::Ping => "ping",
        }
    }

    pub fn to_frame(&self) -> Frame {
        let data = match self {
            Request::List(p) => serde_json::to_value(p),
            Request::Search(p) => serde_json::to_value(p),
            Request::CopyClip(p) | Request::Pin(p) | Request::Unpin(p) | Request::Remove(p) => {
                serde_json::to_value(p)
            }
            Request::Clear(p) => serde_json::to_value(p),
            Request::Pins | Request::Ping => Ok(Value::Null),
        };
        Frame::new(self.type_name(), data.unwrap_or_default())
    }

    /// Serialize as a newline-terminated line.
    pub fn encode_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(&self.to_frame())?;
        line.push('\n');
        Ok(line)
    }
}

/// Resolve a limit from a request, mapping "absent" and 0 to the default.
pub fn effective_limit(limit: usize) -> usize {
    if limit == 0 { DEFAULT_LIMIT } else { limit }
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, FrameError> {
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|source| FrameError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_list_with_limit() {
        let req = Request::decode(r#"{"type":"list","data":{"limit":5}}"#).unwrap();
        assert_eq!(req, Request::List(ListRequest { limit: 5 }));
    }

    #[test]
    fn test_decode_without_data() {
        assert_eq!(Request::decode(r#"{"type":"pins"}"#).unwrap(), Request::Pins);
        assert_eq!(
            Request::decode(r#"{"type":"list"}"#).unwrap(),
            Request::List(ListRequest::default())
        );
        assert_eq!(
            Request::decode(r#"{"type":"clear","data":null}"#).unwrap(),
            Request::Clear(ClearRequest::default())
        );
    }

    #[test]
    fn test_decode_pins_ignores_payload() {
        assert_eq!(
            Request::decode(r#"{"type":"pins","data":{}}"#).unwrap(),
            Request::Pins
        );
    }

    #[test]
    fn test_unknown_type() {
        let err = Request::decode(r#"{"type":"explode","data":{}}"#).unwrap_err();
        assert!(matches!(err, FrameError::UnknownType(ref t) if t == "explode"));
        assert_eq!(err.to_string(), "unknown command: explode");
    }

    #[test]
    fn test_missing_id_is_invalid_payload() {
        let err = Request::decode(r#"{"type":"pin","data":{}}"#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidPayload { ref kind, .. } if kind == "pin"));
    }

    #[test]
    fn test_malformed_line() {
        let err = Request::decode("not json").unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn test_encode_line_shape() {
        let line = Request::Search(SearchRequest {
            query: "api".to_string(),
            limit: 3,
        })
        .encode_line()
        .unwrap();

        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "search");
        assert_eq!(value["data"]["query"], "api");
        assert_eq!(value["data"]["limit"], 3);

        let ping = Request::Ping.encode_line().unwrap();
        assert_eq!(ping, "{\"type\":\"ping\"}\n");
    }

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(0), DEFAULT_LIMIT);
        assert_eq!(effective_limit(3), 3);
    }
}
