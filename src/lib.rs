//! Client library for the Fluent Forward log-shipping protocol.
//!
//! [`FluentClient`] is the entry point: construct it with a
//! [`ConnectionOptions`], `connect()`, then reach for `send_message`,
//! `send_forward`, `send_packed`, or `send_compressed` depending on which
//! wire form fits. The wire codec itself (message variants, `EventTime`,
//! entries) lives in `ff_protocol` and is re-exported here so callers don't
//! need a direct dependency on it.

mod ack;
mod chunk;
pub mod client;
pub mod error;
pub mod framing;
pub mod handshake;
mod session;
pub mod stream;

pub use client::{ConnectionOptions, FluentClient};
pub use error::{FluentError, Result};
pub use framing::FrameReader;
pub use handshake::AuthInfo;
pub use stream::{FactoryError, Stream, StreamFactory};

pub use ff_protocol::{
    CompressedPackedForwardMessage, Entry, EntryExt, EntryList, EntryListExt, EventTime,
    ForwardMessage, Message, MessageOptions, PackedForwardMessage, Record, Timestamp,
};

pub use chunk::new_chunk_id;
