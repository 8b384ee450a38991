#[path = "support/mod.rs"]
mod support;

use hub_protocol::{error_codes, MsgSend, ServerEvent, WsMessage};
use support::{connected_identity, TestServer};

/// Sending the exact same signed envelope twice must be rejected the second
/// time -- the nonce memo only forgives a nonce once per sender.
#[tokio::test]
async fn replayed_envelope_is_rejected_on_second_send() {
    let server = TestServer::start().await;
    let (sender, mut sender_ws) = connected_identity(&server).await;
    let (recipient, mut recipient_ws) = connected_identity(&server).await;

    let envelope = sender.sign_envelope(
        WsMessage::MsgSend(MsgSend {
            convo_id: None,
            to_address: recipient.address.clone(),
            content: "hello".to_owned(),
            media_type: None,
            client_message_id: Some("msg-1".to_owned()),
        }),
        chrono::Utc::now().timestamp_millis(),
        "shared-nonce",
    );

    sender_ws.send_envelope(&envelope).await.expect("first send");
    let first = sender_ws.recv_event().await.expect("first ack");
    assert!(matches!(first, ServerEvent::Success { .. }));
    let _delivered = recipient_ws.recv_event().await.expect("recipient receives message");

    sender_ws.send_envelope(&envelope).await.expect("replayed send");
    let second = sender_ws.recv_event().await.expect("replay response");
    match second {
        ServerEvent::Error(err) => assert_eq!(err.code, error_codes::REPLAY),
        other => panic!("expected replay error, got {other:?}"),
    }
}
