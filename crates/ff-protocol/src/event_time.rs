use std::time::{SystemTime, UNIX_EPOCH};

use rmpv::Value;

use crate::error::{ProtocolError, Result};

/// MessagePack extension type used for EventTime payloads (fluent-forward v1).
pub const EVENT_TIME_EXT_TYPE: i8 = 0x00;

/// Nanosecond-precision Unix timestamp.
///
/// Encodes as the 10-byte `fixext8` pattern `D7 00 SSSSSSSS NNNNNNNN`
/// (big-endian seconds, then big-endian nanoseconds) required by the
/// fluent-forward wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTime {
    pub seconds: u32,
    pub nanos: u32,
}

impl EventTime {
    pub fn new(seconds: u32, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// The current wall-clock time, truncated to the u32 ranges the wire
    /// format supports (valid until year 2106).
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: dur.as_secs() as u32,
            nanos: dur.subsec_nanos(),
        }
    }

    pub(crate) fn to_value(self) -> Value {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&self.seconds.to_be_bytes());
        payload.extend_from_slice(&self.nanos.to_be_bytes());
        Value::Ext(EVENT_TIME_EXT_TYPE, payload)
    }

    pub(crate) fn from_value(v: &Value) -> Result<Self> {
        match v {
            Value::Ext(ty, payload) if *ty == EVENT_TIME_EXT_TYPE && payload.len() == 8 => {
                let seconds = u32::from_be_bytes(payload[0..4].try_into().unwrap());
                let nanos = u32::from_be_bytes(payload[4..8].try_into().unwrap());
                Ok(Self { seconds, nanos })
            }
            Value::Ext(ty, payload) => Err(ProtocolError::MalformedFrame(format!(
                "expected EventTime ext type {EVENT_TIME_EXT_TYPE} with 8-byte payload, got type {ty} len {}",
                payload.len()
            ))),
            other => Err(ProtocolError::MalformedFrame(format!(
                "expected EventTime extension, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_spec_bit_pattern() {
        let t = EventTime::new(1257894000, 12340000);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &t.to_value()).unwrap();
        let hex: String = buf.iter().map(|b| format!("{b:02X}")).collect();
        assert_eq!(hex, "D7004AF9F07000BC4B20");
    }

    #[test]
    fn roundtrips() {
        let t = EventTime::new(42, 99);
        let v = t.to_value();
        assert_eq!(EventTime::from_value(&v).unwrap(), t);
    }
}
