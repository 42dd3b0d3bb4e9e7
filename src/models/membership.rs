//! Records that reference users through a membership set.

use serde::{Deserialize, Serialize};

/// A ticket or achievement: anything holding a list of member user ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub id: String,
    pub users: Vec<String>,
}

impl MembershipRecord {
    pub fn new(id: impl Into<String>, users: &[&str]) -> Self {
        Self {
            id: id.into(),
            users: users.iter().map(|u| u.to_string()).collect(),
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }
}
