#![allow(dead_code)]
//! Pure domain types for the signaling and policy hub: identities, contacts,
//! conversations, messages, call-session tokens, usage counters, active
//! calls, and the policy engine that decides what happens to a call
//! attempt. Nothing in this crate touches a socket or a database connection
//! -- that belongs to `services/hub`.

mod active_call;
mod call_token;
mod contact;
mod conversation;
mod identity;
mod message;
pub mod policy;
mod usage_counter;

pub use active_call::{
    effective_max_duration_seconds, participant_max_duration_seconds, ActiveCall,
    STALE_HEARTBEAT_THRESHOLD,
};
pub use call_token::{CallSessionToken, CALL_TOKEN_TTL};
pub use contact::Contact;
pub use conversation::{direct_conversation_id, Conversation, ConversationKind};
pub use identity::{address_from_pubkey, Identity, Plan, Role, TrialState};
pub use message::{Message, MessageStatus};
pub use usage_counter::UsageCounter;
