pub mod active_calls;
pub mod call_tokens;
pub mod contacts;
pub mod conversations;
pub mod files;
pub mod identities;
pub mod messages;
pub mod policy;
pub mod usage_counters;
