use std::io::Cursor;

use rmpv::Value;

use crate::error::{ProtocolError, Result};

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

fn discriminant(items: &[Value]) -> Result<&str> {
    items
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::MalformedFrame("handshake frame missing string discriminant".into()))
}

fn bin(v: &Value) -> Result<Vec<u8>> {
    v.as_slice()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| ProtocolError::MalformedFrame("expected binary field".into()))
}

fn string(v: &Value) -> Result<String> {
    v.as_str()
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::MalformedFrame("expected string field".into()))
}

fn boolean(v: &Value) -> Result<bool> {
    v.as_bool()
        .ok_or_else(|| ProtocolError::MalformedFrame("expected bool field".into()))
}

/// Server -> client. First frame of the handshake; captures the nonce the
/// client must fold into its shared-key digest and, if user auth is
/// required, the `auth` salt for the password digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helo {
    pub nonce: Vec<u8>,
    pub auth: Vec<u8>,
    pub keepalive: bool,
}

impl Helo {
    pub fn unmarshal(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (value, tail) = read_top_level(bytes)?;
        let items = value
            .as_array()
            .ok_or_else(|| ProtocolError::MalformedFrame("HELO must be an array".into()))?;
        if items.len() != 2 || discriminant(items)? != "HELO" {
            return Err(ProtocolError::MalformedFrame("expected [\"HELO\", {..}]".into()));
        }
        let fields = items[1]
            .as_map()
            .ok_or_else(|| ProtocolError::MalformedFrame("HELO options must be a map".into()))?;
        let mut nonce = None;
        let mut auth = None;
        let mut keepalive = false;
        for (k, v) in fields {
            match k.as_str() {
                Some("nonce") => nonce = Some(bin(v)?),
                Some("auth") => auth = Some(bin(v)?),
                Some("keepalive") => keepalive = boolean(v)?,
                _ => {}
            }
        }
        Ok((
            Helo {
                nonce: nonce.ok_or_else(|| ProtocolError::MalformedFrame("HELO missing nonce".into()))?,
                auth: auth.unwrap_or_default(),
                keepalive,
            },
            tail,
        ))
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let fields = Value::Map(vec![
            (Value::from("nonce"), Value::Binary(self.nonce.clone())),
            (Value::from("auth"), Value::Binary(self.auth.clone())),
            (Value::from("keepalive"), Value::from(self.keepalive)),
        ]);
        write_top_level(buf, &Value::Array(vec![Value::from("HELO"), fields]))
    }
}

/// Client -> server. Proves knowledge of the shared key (and, optionally,
/// user credentials) derived from the HELO nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub hostname: String,
    pub shared_key_salt: Vec<u8>,
    pub shared_key_hexdigest: String,
    pub username: String,
    pub password_hexdigest: String,
}

impl Ping {
    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let items = vec![
            Value::from("PING"),
            Value::from(self.hostname.as_str()),
            Value::Binary(self.shared_key_salt.clone()),
            Value::from(self.shared_key_hexdigest.as_str()),
            Value::from(self.username.as_str()),
            Value::from(self.password_hexdigest.as_str()),
        ];
        write_top_level(buf, &Value::Array(items))
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (value, tail) = read_top_level(bytes)?;
        let items = value
            .as_array()
            .ok_or_else(|| ProtocolError::MalformedFrame("PING must be an array".into()))?;
        if items.len() != 6 || discriminant(items)? != "PING" {
            return Err(ProtocolError::MalformedFrame(
                "expected [\"PING\", hostname, salt, digest, user, pw_digest]".into(),
            ));
        }
        Ok((
            Ping {
                hostname: string(&items[1])?,
                shared_key_salt: bin(&items[2])?,
                shared_key_hexdigest: string(&items[3])?,
                username: string(&items[4])?,
                password_hexdigest: string(&items[5])?,
            },
            tail,
        ))
    }
}

/// Server -> client. Accepts or rejects the PING; carries the server's own
/// digest of the shared key so the client can detect a peer-key mismatch
/// even when the server claims `ok = true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub ok: bool,
    pub reason: String,
    pub server_hostname: String,
    pub shared_key_hexdigest: String,
}

impl Pong {
    pub fn unmarshal(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (value, tail) = read_top_level(bytes)?;
        let items = value
            .as_array()
            .ok_or_else(|| ProtocolError::MalformedFrame("PONG must be an array".into()))?;
        if items.len() != 5 || discriminant(items)? != "PONG" {
            return Err(ProtocolError::MalformedFrame(
                "expected [\"PONG\", ok, reason, hostname, digest]".into(),
            ));
        }
        Ok((
            Pong {
                ok: boolean(&items[1])?,
                reason: string(&items[2])?,
                server_hostname: string(&items[3])?,
                shared_key_hexdigest: string(&items[4])?,
            },
            tail,
        ))
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let items = vec![
            Value::from("PONG"),
            Value::from(self.ok),
            Value::from(self.reason.as_str()),
            Value::from(self.server_hostname.as_str()),
            Value::from(self.shared_key_hexdigest.as_str()),
        ];
        write_top_level(buf, &Value::Array(items))
    }
}

/// A frame addressed to this client on an established session: only acks
/// are acted on; anything else is forward-compatible noise the reader
/// drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub chunk: String,
}

impl Ack {
    pub fn unmarshal(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (value, tail) = read_top_level(bytes)?;
        let fields = value
            .as_map()
            .ok_or_else(|| ProtocolError::MalformedFrame("ack frame must be a map".into()))?;
        let chunk = fields
            .iter()
            .find(|(k, _)| k.as_str() == Some("ack"))
            .map(|(_, v)| string(v))
            .transpose()?
            .ok_or_else(|| ProtocolError::MalformedFrame("not an ack frame".into()))?;
        Ok((Ack { chunk }, tail))
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let value = Value::Map(vec![(Value::from("ack"), Value::from(self.chunk.as_str()))]);
        write_top_level(buf, &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helo_roundtrip() {
        let helo = Helo {
            nonce: b"nonce-bytes".to_vec(),
            auth: b"auth-bytes".to_vec(),
            keepalive: true,
        };
        let mut buf = Vec::new();
        helo.marshal(&mut buf).unwrap();
        let (decoded, tail) = Helo::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded, helo);
    }

    #[test]
    fn ping_roundtrip() {
        let ping = Ping {
            hostname: "client.local".into(),
            shared_key_salt: b"salt".to_vec(),
            shared_key_hexdigest: "deadbeef".into(),
            username: "user".into(),
            password_hexdigest: "".into(),
        };
        let mut buf = Vec::new();
        ping.marshal(&mut buf).unwrap();
        let (decoded, tail) = Ping::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded, ping);
    }

    #[test]
    fn pong_roundtrip() {
        let pong = Pong {
            ok: true,
            reason: "".into(),
            server_hostname: "server.local".into(),
            shared_key_hexdigest: "cafebabe".into(),
        };
        let mut buf = Vec::new();
        pong.marshal(&mut buf).unwrap();
        let (decoded, tail) = Pong::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded, pong);
    }

    #[test]
    fn ack_roundtrip() {
        let ack = Ack { chunk: "abc123".into() };
        let mut buf = Vec::new();
        ack.marshal(&mut buf).unwrap();
        let (decoded, tail) = Ack::unmarshal(&buf).unwrap();
        assert!(tail.is_empty());
        assert_eq!(decoded, ack);
    }
}
