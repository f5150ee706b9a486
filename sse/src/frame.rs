use crate::error::{Error, Result};
use serde::ser::Error as _;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::Value;
use std::io;

/// Comment frame sent while a stream is idle. SSE clients ignore lines that
/// start with a colon, so this only keeps intermediaries from timing out.
pub const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

/// The body of an outbound event before it is framed.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Pre-formatted text, sent as is.
    Text(String),
    /// Structured value, serialized to JSON text before framing.
    Json(Value),
}

impl Payload {
    /// Builds a JSON payload from any serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    fn into_text(self) -> Result<String> {
        match self {
            Payload::Text(text) | Payload::Json(Value::String(text)) => Ok(text),
            Payload::Json(value) => to_spaced_json(&value),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// Encodes one SSE record:
///
/// ```text
/// [event: <name>\n]data: <line>\n[data: <line>\n...]\n
/// ```
///
/// Payloads spanning several lines get one `data:` line per segment so the
/// client reassembles the original text. An empty event name is treated as
/// no event name.
pub fn encode(payload: Payload, event: Option<&str>) -> Result<String> {
    let data = payload.into_text()?;
    let mut frame = String::with_capacity(data.len() + 16);

    if let Some(name) = event.filter(|name| !name.is_empty()) {
        if name.contains(['\r', '\n']) {
            return Err(Error::InvalidEventName(name.to_string()));
        }
        frame.push_str("event: ");
        frame.push_str(name);
        frame.push('\n');
    }

    for line in data_lines(&data) {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');

    Ok(frame)
}

// CRLF, CR and LF all end a line in the SSE grammar.
fn data_lines(data: &str) -> impl Iterator<Item = &str> {
    data.split("\r\n").flat_map(|chunk| chunk.split(['\r', '\n']))
}

/// Writes `", "` between items and `": "` after keys, so `{"x": 1}` comes out
/// exactly in that shape.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn to_spaced_json(value: &Value) -> Result<String> {
    let mut buf = Vec::with_capacity(128);
    let mut serializer = Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| Error::Serialization(serde_json::Error::custom(e)))
}
