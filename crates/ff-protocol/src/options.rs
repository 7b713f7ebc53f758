use rmpv::Value;

use crate::error::{ProtocolError, Result};

/// The only compression scheme this codec emits or accepts on decode.
pub const GZIP: &str = "gzip";

/// Trailing options map shared by all four message variants.
///
/// Only populated keys are serialized — `size: None, chunk: None,
/// compressed: None` serializes as an empty map, and the message encoders
/// skip the whole `MessageOptions` field (not an empty map) when nothing at
/// all was set, so older Fluent servers that predate the options field
/// still parse the frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageOptions {
    pub size: Option<u64>,
    pub chunk: Option<String>,
    pub compressed: Option<String>,
}

impl MessageOptions {
    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.chunk.is_none() && self.compressed.is_none()
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut entries = Vec::new();
        if let Some(size) = self.size {
            entries.push((Value::from("size"), Value::from(size)));
        }
        if let Some(chunk) = &self.chunk {
            entries.push((Value::from("chunk"), Value::from(chunk.as_str())));
        }
        if let Some(compressed) = &self.compressed {
            entries.push((Value::from("compressed"), Value::from(compressed.as_str())));
        }
        Value::Map(entries)
    }

    pub(crate) fn from_value(v: &Value) -> Result<Self> {
        let entries = v
            .as_map()
            .ok_or_else(|| ProtocolError::MalformedFrame("options must be a map".into()))?;

        let mut opts = MessageOptions::default();
        for (k, val) in entries {
            match k.as_str() {
                Some("size") => {
                    opts.size = Some(val.as_u64().ok_or_else(|| {
                        ProtocolError::MalformedFrame("options.size must be an integer".into())
                    })?);
                }
                Some("chunk") => {
                    opts.chunk = Some(
                        val.as_str()
                            .ok_or_else(|| {
                                ProtocolError::MalformedFrame(
                                    "options.chunk must be a string".into(),
                                )
                            })?
                            .to_owned(),
                    );
                }
                Some("compressed") => {
                    opts.compressed = Some(
                        val.as_str()
                            .ok_or_else(|| {
                                ProtocolError::MalformedFrame(
                                    "options.compressed must be a string".into(),
                                )
                            })?
                            .to_owned(),
                    );
                }
                _ => {} // forward-compatible: ignore unrecognized keys
            }
        }
        Ok(opts)
    }

    /// Validates `compressed` against the one value this codec understands.
    pub(crate) fn check_compression(&self) -> Result<()> {
        match &self.compressed {
            None => Ok(()),
            Some(v) if v == GZIP => Ok(()),
            Some(other) => Err(ProtocolError::UnsupportedCompression(other.clone())),
        }
    }
}
