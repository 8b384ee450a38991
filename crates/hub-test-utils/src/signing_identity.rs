use ed25519_dalek::{Signer, SigningKey};
use hub_protocol::{signing_bytes, Envelope};
use rand::rngs::OsRng;
use serde::Serialize;

/// A throwaway Ed25519 keypair plus its derived address, for minting signed
/// envelopes in tests without round-tripping through the real key-storage
/// path.
pub struct TestIdentity {
    pub signing_key: SigningKey,
    pub address: String,
}

impl TestIdentity {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let address = format!(
            "call:{}",
            bs58::encode(signing_key.verifying_key().as_bytes()).into_string()
        );
        Self {
            signing_key,
            address,
        }
    }

    /// Builds and signs an envelope carrying `payload`, stamped with `now`
    /// (unix millis) and a fresh random nonce.
    pub fn sign_envelope<P: Serialize>(&self, payload: P, now_millis: i64, nonce: &str) -> Envelope<P> {
        let mut envelope = Envelope {
            from_pubkey: bs58::encode(self.signing_key.verifying_key().as_bytes()).into_string(),
            from_address: self.address.clone(),
            nonce: nonce.to_string(),
            timestamp: now_millis,
            payload,
            signature: String::new(),
        };
        let bytes = signing_bytes(&envelope).expect("envelope payload always serializes");
        let signature = self.signing_key.sign(bytes.as_bytes());
        envelope.signature = hex::encode(signature.to_bytes());
        envelope
    }
}
