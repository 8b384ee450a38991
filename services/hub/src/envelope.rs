use chrono::{Duration, TimeZone, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hub_core::address_from_pubkey;
use hub_protocol::{signing_bytes, Envelope};
use serde::Serialize;

use crate::error::HubError;
use crate::nonce_memo::NonceMemo;

/// Signed envelopes must carry a timestamp within this window of the
/// server's clock, in either direction, to be accepted.
pub const TIMESTAMP_SKEW: Duration = Duration::seconds(60);

/// Verifies an envelope's signature, timestamp freshness, address binding,
/// and replay status. Does not check whether `from_address` is registered
/// on the connection it arrived on — callers with connection context check
/// that separately, since `hub-protocol` has no notion of connections.
pub async fn verify_envelope<P: Serialize>(
    envelope: &Envelope<P>,
    nonces: &NonceMemo,
) -> Result<(), HubError> {
    let pubkey_bytes = bs58::decode(&envelope.from_pubkey)
        .into_vec()
        .map_err(|_| HubError::BadSignature)?;
    let pubkey_array: [u8; 32] = pubkey_bytes
        .as_slice()
        .try_into()
        .map_err(|_| HubError::BadSignature)?;
    let verifying_key =
        VerifyingKey::from_bytes(&pubkey_array).map_err(|_| HubError::BadSignature)?;

    let expected_address = address_from_pubkey(&pubkey_bytes);
    if expected_address != envelope.from_address {
        return Err(HubError::AddressMismatch);
    }

    let signature_bytes = hex::decode(&envelope.signature).map_err(|_| HubError::BadSignature)?;
    let signature_array: [u8; 64] = signature_bytes
        .as_slice()
        .try_into()
        .map_err(|_| HubError::BadSignature)?;
    let signature = Signature::from_bytes(&signature_array);

    let bytes = signing_bytes(envelope).map_err(|_| HubError::Internal)?;
    verifying_key
        .verify(bytes.as_bytes(), &signature)
        .map_err(|_| HubError::BadSignature)?;

    let now = Utc::now();
    let sent_at = Utc
        .timestamp_millis_opt(envelope.timestamp)
        .single()
        .ok_or(HubError::Expired)?;
    if (now - sent_at).abs() > TIMESTAMP_SKEW {
        return Err(HubError::Expired);
    }

    if !nonces.observe(&envelope.from_address, &envelope.nonce, now).await {
        return Err(HubError::Replay);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_protocol::{Ping, WsMessage};
    use hub_test_utils::TestIdentity;

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    #[tokio::test]
    async fn valid_envelope_is_accepted() {
        let identity = TestIdentity::generate();
        let envelope = identity.sign_envelope(WsMessage::Ping(Ping {}), now_millis(), "n1");
        let nonces = NonceMemo::new();
        assert!(verify_envelope(&envelope, &nonces).await.is_ok());
    }

    #[tokio::test]
    async fn tampered_payload_fails_signature_check() {
        let identity = TestIdentity::generate();
        let mut envelope = identity.sign_envelope(WsMessage::Ping(Ping {}), now_millis(), "n1");
        envelope.nonce = "different-nonce".to_owned();
        let nonces = NonceMemo::new();
        assert!(matches!(
            verify_envelope(&envelope, &nonces).await,
            Err(HubError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let identity = TestIdentity::generate();
        let old_millis = now_millis() - Duration::minutes(5).num_milliseconds();
        let envelope = identity.sign_envelope(WsMessage::Ping(Ping {}), old_millis, "n1");
        let nonces = NonceMemo::new();
        assert!(matches!(
            verify_envelope(&envelope, &nonces).await,
            Err(HubError::Expired)
        ));
    }

    #[tokio::test]
    async fn replayed_nonce_is_rejected_on_second_use() {
        let identity = TestIdentity::generate();
        let envelope = identity.sign_envelope(WsMessage::Ping(Ping {}), now_millis(), "n1");
        let nonces = NonceMemo::new();
        assert!(verify_envelope(&envelope, &nonces).await.is_ok());
        assert!(matches!(
            verify_envelope(&envelope, &nonces).await,
            Err(HubError::Replay)
        ));
    }

    #[tokio::test]
    async fn forged_address_is_rejected() {
        let identity = TestIdentity::generate();
        let mut envelope = identity.sign_envelope(WsMessage::Ping(Ping {}), now_millis(), "n1");
        envelope.from_address = "call:someoneelse".to_owned();
        let nonces = NonceMemo::new();
        assert!(matches!(
            verify_envelope(&envelope, &nonces).await,
            Err(HubError::AddressMismatch)
        ));
    }
}
