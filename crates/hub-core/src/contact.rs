use serde::{Deserialize, Serialize};

/// Directional: a call is "contact-related" when either direction of the
/// pair has an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub owner_address: String,
    pub contact_address: String,
    pub name: Option<String>,
    pub always_allowed: bool,
}
