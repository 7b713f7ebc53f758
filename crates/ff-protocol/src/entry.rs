use std::io::Cursor;

use rmpv::Value;

use crate::error::{ProtocolError, Result};
use crate::event_time::EventTime;

/// An event record: an unordered mapping from string keys to arbitrary
/// MessagePack-serialisable values. Key order is not semantically
/// significant; callers build one with `Value::Map(...)`.
pub type Record = Value;

/// A {timestamp, record} pair with an integer-seconds timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub timestamp: i64,
    pub record: Record,
}

/// A {timestamp, record} pair with a nanosecond-precision `EventTime`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryExt {
    pub timestamp: EventTime,
    pub record: Record,
}

impl Entry {
    pub(crate) fn to_value(&self) -> Value {
        Value::Array(vec![Value::from(self.timestamp), self.record.clone()])
    }

    pub(crate) fn from_value(v: Value) -> Result<Self> {
        let mut items = into_pair(v)?;
        let record = items.pop().unwrap();
        let ts_val = items.pop().unwrap();
        let timestamp = ts_val
            .as_i64()
            .ok_or_else(|| ProtocolError::MalformedFrame("entry timestamp must be an integer".into()))?;
        Ok(Entry { timestamp, record })
    }
}

impl EntryExt {
    pub(crate) fn to_value(&self) -> Value {
        Value::Array(vec![self.timestamp.to_value(), self.record.clone()])
    }

    pub(crate) fn from_value(v: Value) -> Result<Self> {
        let mut items = into_pair(v)?;
        let record = items.pop().unwrap();
        let ts_val = items.pop().unwrap();
        let timestamp = EventTime::from_value(&ts_val)?;
        Ok(EntryExt { timestamp, record })
    }
}

fn into_pair(v: Value) -> Result<Vec<Value>> {
    match v {
        Value::Array(items) if items.len() == 2 => Ok(items),
        other => Err(ProtocolError::MalformedFrame(format!(
            "expected a 2-element [timestamp, record] array, got {other:?}"
        ))),
    }
}

/// Ordered sequence of integer-timestamp entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryList(pub Vec<Entry>);

/// Ordered sequence of EventTime entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryListExt(pub Vec<EntryExt>);

impl EntryList {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self(entries)
    }

    pub(crate) fn to_array_value(&self) -> Value {
        Value::Array(self.0.iter().map(Entry::to_value).collect())
    }

    pub(crate) fn from_array_value(v: Value) -> Result<Self> {
        let items = v
            .as_array()
            .ok_or_else(|| ProtocolError::MalformedFrame("entries must be an array".into()))?
            .to_vec();
        let entries = items
            .into_iter()
            .map(Entry::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(EntryList(entries))
    }

    /// Streams each entry's `[timestamp, record]` marshal into one
    /// pre-allocated buffer, back to back, with no outer array wrapper.
    pub fn marshal_packed(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.0.len() * 64);
        for entry in &self.0 {
            rmpv::encode::write_value(&mut buf, &entry.to_value())
                .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        }
        Ok(buf)
    }

    pub fn unmarshal_packed(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut entries = Vec::new();
        while (cursor.position() as usize) < bytes.len() {
            let value = rmpv::decode::read_value(&mut cursor)
                .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
            entries.push(Entry::from_value(value)?);
        }
        Ok(EntryList(entries))
    }
}

impl EntryListExt {
    pub fn new(entries: Vec<EntryExt>) -> Self {
        Self(entries)
    }

    pub(crate) fn to_array_value(&self) -> Value {
        Value::Array(self.0.iter().map(EntryExt::to_value).collect())
    }

    pub(crate) fn from_array_value_ext(v: Value) -> Result<Self> {
        let items = v
            .as_array()
            .ok_or_else(|| ProtocolError::MalformedFrame("entries must be an array".into()))?
            .to_vec();
        let entries = items
            .into_iter()
            .map(EntryExt::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(EntryListExt(entries))
    }

    pub fn marshal_packed(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.0.len() * 64);
        for entry in &self.0 {
            rmpv::encode::write_value(&mut buf, &entry.to_value())
                .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        }
        Ok(buf)
    }

    pub fn unmarshal_packed(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut entries = Vec::new();
        while (cursor.position() as usize) < bytes.len() {
            let value = rmpv::decode::read_value(&mut cursor)
                .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
            entries.push(EntryExt::from_value(value)?);
        }
        Ok(EntryListExt(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(n: i64) -> Record {
        Value::Map(vec![(Value::from("n"), Value::from(n))])
    }

    #[test]
    fn packed_roundtrip_preserves_order_and_contents() {
        let list = EntryList::new(vec![
            Entry { timestamp: 1, record: rec(1) },
            Entry { timestamp: 2, record: rec(2) },
            Entry { timestamp: 3, record: rec(3) },
        ]);
        let packed = list.marshal_packed().unwrap();
        let decoded = EntryList::unmarshal_packed(&packed).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn packed_roundtrip_ext() {
        let list = EntryListExt::new(vec![
            EntryExt { timestamp: EventTime::new(10, 20), record: rec(1) },
            EntryExt { timestamp: EventTime::new(30, 40), record: rec(2) },
        ]);
        let packed = list.marshal_packed().unwrap();
        let decoded = EntryListExt::unmarshal_packed(&packed).unwrap();
        assert_eq!(decoded, list);
    }
}
