//! End-to-end tests against an in-process WebSocket server.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use voxlink::protocol::ClientControl;
use voxlink::{Connection, ConnectionState, InboundMessage};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws/chat", listener.local_addr().unwrap());
    (listener, url)
}

#[tokio::test]
async fn uplink_preserves_text_audio_and_end_audio_order() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut received = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => received.push(message),
                _ => {}
            }
        }
        received
    });

    let (connection, _inbound) = Connection::connect(&url).await.unwrap();
    assert!(connection.is_open());

    connection.send_text("hello");
    connection.send_audio_frame(&[1, -2, 300]);
    connection.send_control(&ClientControl::EndAudio);
    connection.close();

    let received = server.await.unwrap();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0], Message::Text("hello".to_string()));
    match &received[1] {
        Message::Binary(bytes) => assert_eq!(bytes, &vec![1, 0, 254, 255, 44, 1]),
        other => panic!("expected binary frame, got {:?}", other),
    }
    assert_eq!(
        received[2],
        Message::Text(r#"{"type":"end_audio"}"#.to_string())
    );
}

#[tokio::test]
async fn downlink_delivers_text_and_binary_in_arrival_order() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"type": "transcription", "content": "hel"}"#.to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            r#"{"type": "text", "content": "Hello there"}"#.to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Binary(vec![82, 73, 70, 70])).await.unwrap();
        ws.send(Message::Close(None)).await.ok();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (connection, mut inbound) = Connection::connect(&url).await.unwrap();

    assert_eq!(
        inbound.recv().await.unwrap(),
        InboundMessage::Text(r#"{"type": "transcription", "content": "hel"}"#.to_string())
    );
    assert_eq!(
        inbound.recv().await.unwrap(),
        InboundMessage::Text(r#"{"type": "text", "content": "Hello there"}"#.to_string())
    );
    assert_eq!(
        inbound.recv().await.unwrap(),
        InboundMessage::Binary(vec![82, 73, 70, 70])
    );

    // Server closed; the stream ends and the state flips.
    assert!(inbound.recv().await.is_none());
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn sends_after_close_are_silently_dropped() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut count = 0usize;
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => count += 1,
                _ => {}
            }
        }
        count
    });

    let (connection, _inbound) = Connection::connect(&url).await.unwrap();
    connection.close();
    assert_eq!(connection.state(), ConnectionState::Closed);

    // None of these may panic or reach the wire.
    connection.send_text("too late");
    connection.send_audio_frame(&[1, 2, 3]);
    connection.send_control(&ClientControl::EndAudio);

    assert_eq!(server.await.unwrap(), 0);
}
