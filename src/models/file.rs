//! Uploaded file metadata owned by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata record for a user's uploaded file.
///
/// The binary itself lives in separate blob storage keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    /// Owning user id
    pub user: String,
    pub name: String,
    /// MIME type
    pub kind: String,
    pub updated: DateTime<Utc>,
}
