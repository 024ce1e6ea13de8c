//! Parsing of the `FRAME[...]` descriptors mod_http2 writes for every frame
//! sent or received on a session.

use serde::Serialize;
use std::fmt;

/// HTTP/2 frame types (RFC 7540 section 6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    Goaway,
    WindowUpdate,
    Continuation,
    Other(String),
}

impl FrameType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "DATA" => FrameType::Data,
            "HEADERS" => FrameType::Headers,
            "PRIORITY" => FrameType::Priority,
            "RST_STREAM" => FrameType::RstStream,
            "SETTINGS" => FrameType::Settings,
            "PUSH_PROMISE" => FrameType::PushPromise,
            "PING" => FrameType::Ping,
            "GOAWAY" => FrameType::Goaway,
            "WINDOW_UPDATE" => FrameType::WindowUpdate,
            "CONTINUATION" => FrameType::Continuation,
            other => FrameType::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
            FrameType::Other(name) => name,
        }
    }
}

impl Serialize for FrameType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed frame descriptor, e.g. `HEADERS[length=36, hend=1, stream=1, eos=1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameDescriptor {
    pub frame_type: FrameType,
    pub length: Option<u64>,
    /// Stream the frame belongs to; 0 is the connection itself
    pub stream_id: Option<u32>,
    /// Remaining `key=value` fields in log order
    pub flags: Vec<(String, String)>,
}

impl FrameDescriptor {
    /// Parse the text between `FRAME[` and its closing bracket.
    ///
    /// Returns None when the descriptor is structurally broken or `length`/`stream`
    /// is not a number.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (name, fields) = match text.split_once('[') {
            Some((name, rest)) => (name.trim(), rest.strip_suffix(']')?),
            None => (text, ""),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }

        let mut length = None;
        let mut stream_id = None;
        let mut flags = Vec::new();

        for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let (key, value) = field.split_once('=')?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "length" => length = Some(value.parse().ok()?),
                "stream" => stream_id = Some(value.parse().ok()?),
                _ => flags.push((key.to_string(), value.to_string())),
            }
        }

        Some(Self {
            frame_type: FrameType::from_name(name),
            length,
            stream_id,
            flags,
        })
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Slice out the bracket-balanced body of `FRAME[...]` from a message.
pub fn frame_body(message: &str) -> Option<&str> {
    let start = message.find("FRAME[")? + "FRAME[".len();
    let mut depth = 1usize;
    for (i, c) in message[start..].char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&message[start..start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_frame() {
        let d = FrameDescriptor::parse("HEADERS[length=36, hend=1, stream=3, eos=1]").unwrap();
        assert_eq!(d.frame_type, FrameType::Headers);
        assert_eq!(d.length, Some(36));
        assert_eq!(d.stream_id, Some(3));
        assert_eq!(d.flag("hend"), Some("1"));
        assert_eq!(d.flag("eos"), Some("1"));
        assert_eq!(d.flags.len(), 2);
    }

    #[test]
    fn test_window_update_without_length() {
        let d = FrameDescriptor::parse("WINDOW_UPDATE[stream=0, wait=0]").unwrap();
        assert_eq!(d.frame_type, FrameType::WindowUpdate);
        assert_eq!(d.length, None);
        assert_eq!(d.stream_id, Some(0));
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let d = FrameDescriptor::parse("ORIGIN[length=4, stream=0]").unwrap();
        assert_eq!(d.frame_type, FrameType::Other("ORIGIN".to_string()));
        assert_eq!(d.frame_type.to_string(), "ORIGIN");
    }

    #[test]
    fn test_malformed_numbers_reject() {
        assert!(FrameDescriptor::parse("DATA[length=abc, stream=1]").is_none());
        assert!(FrameDescriptor::parse("DATA[length=10, stream=-1]").is_none());
        assert!(FrameDescriptor::parse("DATA[length=10, stream=1").is_none());
        assert!(FrameDescriptor::parse("DATA[garbage]").is_none());
    }

    #[test]
    fn test_frame_body_balances_brackets() {
        let msg = "h2_session(1,BUSY,1): recv FRAME[HEADERS[length=36, stream=1]], frames=1/0 (r/s)";
        assert_eq!(frame_body(msg), Some("HEADERS[length=36, stream=1]"));
        assert_eq!(frame_body("FRAME[DATA[length=1"), None);
        assert_eq!(frame_body("no frame here"), None);
    }
}
