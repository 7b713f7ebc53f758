use std::io::Cursor;

use flate2::write::GzEncoder;
use flate2::Compression;
use rmpv::Value;

use crate::entry::{EntryListExt, Record};
use crate::error::{ProtocolError, Result};
use crate::event_time::EventTime;
use crate::options::{MessageOptions, GZIP};

/// The timestamp carried by a [`Message`] — either integer seconds or a
/// nanosecond-precision `EventTime` extension. Both encodings are valid on
/// the wire; a message built with `SendMessage` uses the former, one built
/// with `SendMessageExt` the latter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestamp {
    Seconds(i64),
    Ext(EventTime),
}

impl Timestamp {
    fn to_value(self) -> Value {
        match self {
            Timestamp::Seconds(s) => Value::from(s),
            Timestamp::Ext(t) => t.to_value(),
        }
    }

    fn from_value(v: &Value) -> Result<Self> {
        if matches!(v, Value::Ext(..)) {
            return Ok(Timestamp::Ext(EventTime::from_value(v)?));
        }
        v.as_i64()
            .map(Timestamp::Seconds)
            .ok_or_else(|| ProtocolError::MalformedFrame("expected integer or EventTime timestamp".into()))
    }
}

/// Reads exactly one top-level MessagePack value off `bytes`, returning it
/// along with the unconsumed tail.
fn read_top_level(bytes: &[u8]) -> Result<(Value, &[u8])> {
    let mut cursor = Cursor::new(bytes);
    let value =
        rmpv::decode::read_value(&mut cursor).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
    let consumed = cursor.position() as usize;
    Ok((value, &bytes[consumed..]))
}

fn write_top_level(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    rmpv::encode::write_value(buf, value).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
}

fn expect_array(v: Value) -> Result<Vec<Value>> {
    match v {
        Value::Array(items) => Ok(items),
        other => Err(ProtocolError::MalformedFrame(format!(
            "expected a top-level array, got {other:?}"
        ))),
    }
}

fn expect_tag(v: Value) -> Result<String> {
    v.as_str()
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::MalformedFrame("expected tag string".into()))
}

/// Variant 1: `[tag, timestamp, record, options?]`. A single event.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub tag: String,
    pub timestamp: Timestamp,
    pub record: Record,
    pub options: Option<MessageOptions>,
}

impl Message {
    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let mut items = vec![
            Value::from(self.tag.as_str()),
            self.timestamp.to_value(),
            self.record.clone(),
        ];
        if let Some(opts) = &self.options {
            if !opts.is_empty() {
                items.push(opts.to_value());
            }
        }
        write_top_level(buf, &Value::Array(items))
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (value, tail) = read_top_level(bytes)?;
        let mut items = expect_array(value)?;
        if items.len() != 3 && items.len() != 4 {
            return Err(ProtocolError::MalformedFrame(format!(
                "Message array must have 3 or 4 elements, got {}",
                items.len()
            )));
        }
        let options = if items.len() == 4 {
            Some(MessageOptions::from_value(&items.pop().unwrap())?)
        } else {
            None
        };
        let record = items.pop().unwrap();
        let timestamp = Timestamp::from_value(&items.pop().unwrap())?;
        let tag = expect_tag(items.pop().unwrap())?;
        Ok((
            Message {
                tag,
                timestamp,
                record,
                options,
            },
            tail,
        ))
    }
}

/// Variant 2: `[tag, entries, options?]`. `entries` is an array of
/// `[timestamp, record]` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardMessage {
    pub tag: String,
    pub entries: EntryListExt,
    pub options: Option<MessageOptions>,
}

impl ForwardMessage {
    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let mut items = vec![
            Value::from(self.tag.as_str()),
            self.entries.to_array_value(),
        ];
        if let Some(opts) = &self.options {
            if !opts.is_empty() {
                items.push(opts.to_value());
            }
        }
        write_top_level(buf, &Value::Array(items))
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (value, tail) = read_top_level(bytes)?;
        let mut items = expect_array(value)?;
        if items.len() != 2 && items.len() != 3 {
            return Err(ProtocolError::MalformedFrame(format!(
                "ForwardMessage array must have 2 or 3 elements, got {}",
                items.len()
            )));
        }
        let options = if items.len() == 3 {
            Some(MessageOptions::from_value(&items.pop().unwrap())?)
        } else {
            None
        };
        let entries = EntryListExt::from_array_value_ext(items.pop().unwrap())?;
        let tag = expect_tag(items.pop().unwrap())?;
        Ok((
            ForwardMessage {
                tag,
                entries,
                options,
            },
            tail,
        ))
    }
}

/// Variant 3: `[tag, eventstream, options]`. `eventstream` is a MessagePack
/// `bin` holding the concatenation of individually-marshalled
/// `[timestamp, record]` entries. `options.size` is required.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedForwardMessage {
    pub tag: String,
    pub eventstream: Vec<u8>,
    pub options: MessageOptions,
}

impl PackedForwardMessage {
    /// Packs `entries` and fills in the required `options.size`, preserving
    /// any caller-supplied `chunk`.
    pub fn from_entries(tag: impl Into<String>, entries: &EntryListExt, chunk: Option<String>) -> Result<Self> {
        let eventstream = entries.marshal_packed()?;
        let options = MessageOptions {
            size: Some(entries.0.len() as u64),
            chunk,
            compressed: None,
        };
        Ok(PackedForwardMessage {
            tag: tag.into(),
            eventstream,
            options,
        })
    }

    pub fn entries(&self) -> Result<EntryListExt> {
        EntryListExt::unmarshal_packed(&self.eventstream)
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let items = vec![
            Value::from(self.tag.as_str()),
            Value::Binary(self.eventstream.clone()),
            self.options.to_value(),
        ];
        write_top_level(buf, &Value::Array(items))
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (value, tail) = read_top_level(bytes)?;
        let mut items = expect_array(value)?;
        if items.len() != 3 {
            return Err(ProtocolError::MalformedFrame(format!(
                "PackedForwardMessage array must have 3 elements, got {}",
                items.len()
            )));
        }
        let options = MessageOptions::from_value(&items.pop().unwrap())?;
        if options.size.is_none() {
            return Err(ProtocolError::MalformedFrame(
                "PackedForwardMessage requires options.size".into(),
            ));
        }
        let eventstream = items
            .pop()
            .unwrap()
            .as_slice()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ProtocolError::MalformedFrame("eventstream must be binary".into()))?;
        let tag = expect_tag(items.pop().unwrap())?;
        Ok((
            PackedForwardMessage {
                tag,
                eventstream,
                options,
            },
            tail,
        ))
    }
}

/// Variant 4: same as [`PackedForwardMessage`] but `eventstream` is
/// gzip-compressed and `options.compressed = "gzip"` is required.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedPackedForwardMessage {
    pub tag: String,
    pub eventstream: Vec<u8>,
    pub options: MessageOptions,
}

impl CompressedPackedForwardMessage {
    pub fn from_entries(tag: impl Into<String>, entries: &EntryListExt, chunk: Option<String>) -> Result<Self> {
        let packed = entries.marshal_packed()?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut encoder, &packed)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        let eventstream = encoder
            .finish()
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        let options = MessageOptions {
            size: Some(entries.0.len() as u64),
            chunk,
            compressed: Some(GZIP.to_owned()),
        };
        Ok(CompressedPackedForwardMessage {
            tag: tag.into(),
            eventstream,
            options,
        })
    }

    pub fn entries(&self) -> Result<EntryListExt> {
        let mut decoder = flate2::read::GzDecoder::new(self.eventstream.as_slice());
        let mut packed = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut packed)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        EntryListExt::unmarshal_packed(&packed)
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let items = vec![
            Value::from(self.tag.as_str()),
            Value::Binary(self.eventstream.clone()),
            self.options.to_value(),
        ];
        write_top_level(buf, &Value::Array(items))
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (value, tail) = read_top_level(bytes)?;
        let mut items = expect_array(value)?;
        if items.len() != 3 {
            return Err(ProtocolError::MalformedFrame(format!(
                "CompressedPackedForwardMessage array must have 3 elements, got {}",
                items.len()
            )));
        }
        let options = MessageOptions::from_value(&items.pop().unwrap())?;
        options.check_compression()?;
        if options.compressed.as_deref() != Some(GZIP) {
            return Err(ProtocolError::UnsupportedCompression(
                options.compressed.clone().unwrap_or_default(),
            ));
        }
        if options.size.is_none() {
            return Err(ProtocolError::MalformedFrame(
                "CompressedPackedForwardMessage requires options.size".into(),
            ));
        }
        let eventstream = items
            .pop()
            .unwrap()
            .as_slice()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ProtocolError::MalformedFrame("eventstream must be binary".into()))?;
        let tag = expect_tag(items.pop().unwrap())?;
        Ok((
            CompressedPackedForwardMessage {
                tag,
                eventstream,
                options,
            },
            tail,
        ))
    }
}
