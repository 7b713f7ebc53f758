//! End-to-end scenarios driving `FluentClient` against `ff-test-utils`'s
//! in-process duplex transport: no real socket, but a real session, a real
//! handshake state machine, and a real ack registry on both ends.

use std::time::Duration;

use fluent_forward_client::{AuthInfo, ConnectionOptions, EntryExt, EntryListExt, EventTime, FluentClient, FluentError};
use ff_test_utils::{DuplexStream, FakeForwardServer, ScriptedFactory};
use rmpv::Value;

fn rec(n: i64) -> Value {
    Value::Map(vec![(Value::from("n"), Value::from(n))])
}

/// S3: a send with no peer on the other end times out, and the client stays
/// usable afterwards — a later send against the same session still
/// completes once something is listening.
#[tokio::test]
async fn ack_timeout_does_not_poison_the_session() {
    let (client_stream, server_stream) = DuplexStream::pair(4096);
    let factory = ScriptedFactory::single(client_stream);
    let mut options = ConnectionOptions::new(factory);
    options.require_ack = true;
    options.ack_timeout = Duration::from_millis(100);
    let client = FluentClient::new(options);
    client.connect().await.unwrap();

    let err = client.send_message("t", rec(1)).await.unwrap_err();
    assert!(matches!(err, FluentError::Timeout));

    let mut server = FakeForwardServer::new(server_stream);
    let server_task = tokio::spawn(async move {
        // Drains the first (never-acked) frame plus the second, acking only
        // the second one.
        let _first = server.recv_frame().await;
        let frame = server.recv_frame().await;
        let (decoded, _tail) = ff_protocol::Message::unmarshal(&frame).unwrap();
        let chunk = decoded.options.unwrap().chunk.unwrap();
        server.send_ack(&chunk).await.unwrap();
    });

    client.send_message("t", rec(2)).await.unwrap();
    server_task.await.unwrap();
}

/// S4: a packed send round-trips through the wire as entries the peer can
/// recover in order.
#[tokio::test]
async fn packed_send_reaches_the_peer_as_the_same_entries() {
    let (client_stream, server_stream) = DuplexStream::pair(4096);
    let factory = ScriptedFactory::single(client_stream);
    let client = FluentClient::new(ConnectionOptions::new(factory));
    client.connect().await.unwrap();

    let mut server = FakeForwardServer::new(server_stream);
    let entries = EntryListExt::new(vec![
        EntryExt { timestamp: EventTime::new(1, 0), record: rec(1) },
        EntryExt { timestamp: EventTime::new(2, 0), record: rec(2) },
    ]);

    let send = client.send_packed("t", &entries);
    let (sent, frame) = tokio::join!(send, server.recv_frame());
    sent.unwrap();

    let (decoded, tail) = ff_protocol::PackedForwardMessage::unmarshal(&frame).unwrap();
    assert!(tail.is_empty());
    assert_eq!(decoded.tag, "t");
    assert_eq!(decoded.options.size, Some(2));
    assert_eq!(decoded.entries().unwrap(), entries);
}

/// S5: a compressed send carries `options.compressed = "gzip"` and decodes
/// back to the same entries the caller sent.
#[tokio::test]
async fn compressed_send_round_trips_through_gzip() {
    let (client_stream, server_stream) = DuplexStream::pair(4096);
    let factory = ScriptedFactory::single(client_stream);
    let client = FluentClient::new(ConnectionOptions::new(factory));
    client.connect().await.unwrap();

    let mut server = FakeForwardServer::new(server_stream);
    let entries = EntryListExt::new(vec![EntryExt { timestamp: EventTime::new(5, 0), record: rec(9) }]);

    let send = client.send_compressed("t", &entries);
    let (sent, frame) = tokio::join!(send, server.recv_frame());
    sent.unwrap();

    let (decoded, _tail) = ff_protocol::CompressedPackedForwardMessage::unmarshal(&frame).unwrap();
    assert_eq!(decoded.options.compressed.as_deref(), Some("gzip"));
    assert_eq!(decoded.options.size, Some(1));
    assert_eq!(decoded.entries().unwrap(), entries);
}

fn auth(shared_key: &[u8]) -> AuthInfo {
    AuthInfo {
        shared_key_salt: b"salt".to_vec(),
        shared_key: shared_key.to_vec(),
        username: None,
        password: None,
    }
}

/// S6: HELO/PING/PONG with matching digests establishes the session, and a
/// subsequent send flows over it normally.
#[tokio::test]
async fn handshake_happy_path_establishes_a_usable_session() {
    let (client_stream, server_stream) = DuplexStream::pair(4096);
    let factory = ScriptedFactory::single(client_stream);
    let mut options = ConnectionOptions::new(factory);
    options.hostname = "client.local".into();
    options.auth = Some(auth(b"shared-secret"));
    let client = FluentClient::new(options);

    let nonce = b"nonce-value".to_vec();
    let server_task = tokio::spawn(async move {
        let mut server = FakeForwardServer::new(server_stream);
        server.send_helo(&nonce, b"", false).await.unwrap();
        let ping = server.recv_ping().await;
        assert_eq!(ping.hostname, "client.local");
        let client_digest = FakeForwardServer::<DuplexStream>::expected_digest(
            b"salt",
            b"client.local",
            &nonce,
            b"shared-secret",
        );
        assert_eq!(ping.shared_key_hexdigest, client_digest);

        let server_digest = FakeForwardServer::<DuplexStream>::expected_digest(
            b"salt",
            b"server.local",
            &nonce,
            b"shared-secret",
        );
        server.send_pong(true, "", "server.local", &server_digest).await.unwrap();

        let frame = server.recv_frame().await;
        let (decoded, _tail) = ff_protocol::Message::unmarshal(&frame).unwrap();
        assert_eq!(decoded.tag, "t");
    });

    client.connect().await.unwrap();
    client.send_message("t", rec(1)).await.unwrap();
    server_task.await.unwrap();
}

/// S7: a PONG carrying a digest that doesn't match the client's own
/// computation fails the handshake even when the server claims `ok = true`.
#[tokio::test]
async fn handshake_fails_on_peer_key_mismatch_even_when_ok() {
    let (client_stream, server_stream) = DuplexStream::pair(4096);
    let factory = ScriptedFactory::single(client_stream);
    let mut options = ConnectionOptions::new(factory);
    options.hostname = "client.local".into();
    options.auth = Some(auth(b"shared-secret"));
    let client = FluentClient::new(options);

    let nonce = b"nonce-value".to_vec();
    let server_task = tokio::spawn(async move {
        let mut server = FakeForwardServer::new(server_stream);
        server.send_helo(&nonce, b"", false).await.unwrap();
        let _ping = server.recv_ping().await;
        server.send_pong(true, "", "server.local", "not-the-right-digest").await.unwrap();
    });

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, FluentError::HandshakeFailed(reason) if reason == "peer key mismatch"));
    server_task.await.unwrap();
}

/// S8: reconnecting tears down the old session exactly once and installs a
/// fresh one from the factory's next stream.
#[tokio::test]
async fn reconnect_replaces_the_session_with_a_fresh_stream() {
    let (client_a, server_a) = DuplexStream::pair(4096);
    let (client_b, server_b) = DuplexStream::pair(4096);
    let factory = std::sync::Arc::new(ScriptedFactory::new(vec![client_a, client_b]));
    let client = FluentClient::new(ConnectionOptions::new(factory));

    client.connect().await.unwrap();
    drop(server_a);

    client.reconnect().await.unwrap();

    let mut server = FakeForwardServer::new(server_b);
    let send = client.send_message("t", rec(1));
    let (sent, frame) = tokio::join!(send, server.recv_frame());
    sent.unwrap();
    let (decoded, _tail) = ff_protocol::Message::unmarshal(&frame).unwrap();
    assert_eq!(decoded.tag, "t");

    // A third connect attempt without disconnecting first is rejected; a
    // second reconnect tears the fresh session down again and fails because
    // the factory is now exhausted.
    let err = client.reconnect().await.unwrap_err();
    assert!(matches!(err, FluentError::FactoryError { retryable: false, .. }));
}
