use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for direct-conversation ids. Fixed forever -- changing it
/// would reassign every existing direct conversation to a new id.
const DIRECT_CONVO_NAMESPACE: Uuid = Uuid::from_bytes(*b"call-hub/convo\0\0");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_message_seq: u64,
}

/// The one canonical formula for a direct conversation's id, derived from
/// the two participant addresses regardless of call order. Every caller --
/// the WS router, the HTTP history endpoint, any future client -- must
/// route through this function so two clients never disagree on the id for
/// the same pair.
pub fn direct_conversation_id(a: &str, b: &str) -> Uuid {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut name = Vec::with_capacity(first.len() + second.len() + 1);
    name.extend_from_slice(first.as_bytes());
    name.push(0);
    name.extend_from_slice(second.as_bytes());
    Uuid::new_v5(&DIRECT_CONVO_NAMESPACE, &name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_conversation_id_is_order_independent() {
        let a = "call:aaaa";
        let b = "call:bbbb";
        assert_eq!(direct_conversation_id(a, b), direct_conversation_id(b, a));
    }

    #[test]
    fn direct_conversation_id_differs_per_pair() {
        let id1 = direct_conversation_id("call:aaaa", "call:bbbb");
        let id2 = direct_conversation_id("call:aaaa", "call:cccc");
        assert_ne!(id1, id2);
    }
}
