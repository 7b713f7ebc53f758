//! Wire types and MessagePack (de)serialization for the Fluent Forward
//! client session layer: the four message variants, the `EventTime`
//! extension, the trailing options map, and the HELO/PING/PONG handshake
//! frames. No I/O lives here — marshal takes a value and an append-target
//! buffer, unmarshal takes a byte slice and returns the unconsumed tail.

mod entry;
mod error;
mod event_time;
mod handshake;
mod message;
mod options;

pub use entry::{Entry, EntryExt, EntryList, EntryListExt, Record};
pub use error::{ProtocolError, Result};
pub use event_time::{EventTime, EVENT_TIME_EXT_TYPE};
pub use handshake::{Ack, Helo, Ping, Pong};
pub use message::{
    CompressedPackedForwardMessage, ForwardMessage, Message, PackedForwardMessage, Timestamp,
};
pub use options::{MessageOptions, GZIP};

#[cfg(test)]
mod tests {
    use super::*;

    fn rec() -> Record {
        rmpv::Value::Map(vec![
            (rmpv::Value::from("first"), rmpv::Value::from("Sir")),
            (rmpv::Value::from("last"), rmpv::Value::from("Gawain")),
        ])
    }

    #[test]
    fn message_roundtrip_without_options() {
        let msg = Message {
            tag: "test.message".into(),
            timestamp: Timestamp::Seconds(1),
            record: rec(),
            options: None,
        };
        let mut buf = Vec::new();
        msg.marshal(&mut buf).unwrap();
        // No options => array length 3, not 4 with an empty map.
        let (decoded, tail) = Message::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded, msg);
        assert!(decoded.options.is_none());
    }

    #[test]
    fn message_roundtrip_with_chunk_option() {
        let msg = Message {
            tag: "test.message".into(),
            timestamp: Timestamp::Ext(EventTime::new(1, 2)),
            record: rec(),
            options: Some(MessageOptions {
                size: None,
                chunk: Some("abc123".into()),
                compressed: None,
            }),
        };
        let mut buf = Vec::new();
        msg.marshal(&mut buf).unwrap();
        let (decoded, tail) = Message::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn forward_message_roundtrip() {
        let entries = EntryListExt::new(vec![
            EntryExt {
                timestamp: EventTime::new(1, 0),
                record: rec(),
            },
            EntryExt {
                timestamp: EventTime::new(2, 0),
                record: rec(),
            },
        ]);
        let msg = ForwardMessage {
            tag: "test.forward".into(),
            entries,
            options: None,
        };
        let mut buf = Vec::new();
        msg.marshal(&mut buf).unwrap();
        let (decoded, tail) = ForwardMessage::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn packed_forward_message_roundtrip() {
        let entries = EntryListExt::new(vec![
            EntryExt { timestamp: EventTime::new(1, 0), record: rec() },
            EntryExt { timestamp: EventTime::new(2, 0), record: rec() },
        ]);
        let msg = PackedForwardMessage::from_entries("test.packed", &entries, Some("chunk-1".into())).unwrap();
        assert_eq!(msg.options.size, Some(2));
        let mut buf = Vec::new();
        msg.marshal(&mut buf).unwrap();
        let (decoded, tail) = PackedForwardMessage::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded.entries().unwrap(), entries);
    }

    #[test]
    fn compressed_packed_forward_message_roundtrip() {
        let entries = EntryListExt::new(vec![
            EntryExt { timestamp: EventTime::new(1, 0), record: rec() },
            EntryExt { timestamp: EventTime::new(2, 0), record: rec() },
        ]);
        let msg = CompressedPackedForwardMessage::from_entries("test.compressed", &entries, None).unwrap();
        assert_eq!(msg.options.compressed.as_deref(), Some(GZIP));
        assert_eq!(msg.options.size, Some(2));
        let mut buf = Vec::new();
        msg.marshal(&mut buf).unwrap();
        let (decoded, tail) = CompressedPackedForwardMessage::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded.entries().unwrap(), entries);
    }

    #[test]
    fn unsupported_compression_is_rejected() {
        let entries = EntryListExt::new(vec![]);
        let mut msg = CompressedPackedForwardMessage::from_entries("t", &entries, None).unwrap();
        msg.options.compressed = Some("zstd".into());
        let mut buf = Vec::new();
        msg.marshal(&mut buf).unwrap();
        let err = CompressedPackedForwardMessage::unmarshal(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedCompression(_)));
    }

    #[test]
    fn sixty_five_kib_record_packs_in_one_pass() {
        let big_value = rmpv::Value::Binary(vec![0u8; 65 * 1024]);
        let entries = EntryListExt::new(vec![EntryExt {
            timestamp: EventTime::now(),
            record: rmpv::Value::Map(vec![(rmpv::Value::from("blob"), big_value)]),
        }]);
        let packed = entries.marshal_packed().unwrap();
        let decoded = EntryListExt::unmarshal_packed(&packed).unwrap();
        assert_eq!(decoded, entries);
    }
}
