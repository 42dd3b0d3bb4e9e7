// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account merging.
//!
//! Consolidates two user records known to belong to one person:
//! - Dependent file reconciliation (newest file survives)
//! - Ticket and achievement membership repointing
//! - Duplicate removal
//! - Attribute consolidation onto the primary record

use crate::db::{FileStore, MemberSwap, MembershipFilter, MembershipStore, UserFilter, UserStore};
use crate::error::{AppError, Result};
use crate::models::{Provider, User};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Two users representing one person; `duplicate` is folded into `primary`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeDirective {
    pub primary: User,
    pub duplicate: User,
}

/// Per-pair merge locks, keyed by the sorted id pair.
pub type MergeLocks = Arc<DashMap<(String, String), Arc<Mutex<()>>>>;

/// Collaborators touched by a merge.
#[derive(Clone)]
pub struct AccountMerger {
    users: Arc<dyn UserStore>,
    files: Arc<dyn FileStore>,
    tickets: Arc<dyn MembershipStore>,
    achievements: Arc<dyn MembershipStore>,
    locks: MergeLocks,
}

impl AccountMerger {
    pub fn new(
        users: Arc<dyn UserStore>,
        files: Arc<dyn FileStore>,
        tickets: Arc<dyn MembershipStore>,
        achievements: Arc<dyn MembershipStore>,
    ) -> Self {
        Self {
            users,
            files,
            tickets,
            achievements,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Merge `directive.duplicate` into `directive.primary`.
    ///
    /// Returns the persisted merged user.
    pub async fn merge(&self, directive: MergeDirective) -> Result<User> {
        let MergeDirective { primary, duplicate } = directive;
        if primary.id == duplicate.id {
            return Err(AppError::Conflict(
                "cannot merge an account into itself".to_string(),
            ));
        }

        let key = lock_key(&primary.id, &duplicate.id);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let result = self.merge_locked(&primary, &duplicate).await;

        drop(guard);
        // Drop the entry once no other merge of this pair is queued on it.
        self.locks
            .remove_if(&key, |_, entry| Arc::strong_count(entry) <= 2);

        result
    }

    async fn merge_locked(&self, primary: &User, duplicate: &User) -> Result<User> {
        tracing::info!(
            primary = %primary.id,
            duplicate = %duplicate.id,
            "Merging accounts"
        );

        // Re-check under the lock: a merge of the same pair may have just run.
        let primary_filter = UserFilter::Id(primary.id.clone());
        let duplicate_filter = UserFilter::Id(duplicate.id.clone());
        let (stored_primary, stored_duplicate) = tokio::try_join!(
            self.users.get(&primary_filter),
            self.users.get(&duplicate_filter),
        )?;
        let Some(stored_primary) = stored_primary else {
            return Err(AppError::NotFound(format!("account {}", primary.id)));
        };
        let Some(stored_duplicate) = stored_duplicate else {
            return Err(AppError::NotFound(format!(
                "duplicate account {} already merged",
                duplicate.id
            )));
        };

        tokio::try_join!(
            self.reconcile_files(&primary.id, &duplicate.id),
            self.repoint("tickets", self.tickets.as_ref(), &primary.id, &duplicate.id),
            self.repoint(
                "achievements",
                self.achievements.as_ref(),
                &primary.id,
                &duplicate.id
            ),
        )?;

        let removed = self.users.remove(&duplicate.id).await.map_err(|e| {
            tracing::error!(user_id = %duplicate.id, error = %e, "Error removing duplicate account");
            e
        })?;
        if !removed {
            tracing::warn!(user_id = %duplicate.id, "Duplicate account was already gone");
        }
        tracing::debug!(user_id = %duplicate.id, "Removed duplicate account");

        let base = with_linked_credentials(stored_primary, primary);
        let merged = consolidate(&base, &stored_duplicate);
        let stored = self.users.replace(merged).await.map_err(|e| {
            tracing::error!(
                primary = %primary.id,
                duplicate = %duplicate.id,
                error = %e,
                "Error updating merged account"
            );
            e
        })?;

        tracing::info!(user_id = %stored.id, "Accounts merged");
        Ok(stored)
    }

    /// Keep one file for the merged account, owned by the primary.
    async fn reconcile_files(&self, primary_id: &str, duplicate_id: &str) -> Result<()> {
        let (primary_file, duplicate_file) = tokio::try_join!(
            self.files.get_by_user(primary_id),
            self.files.get_by_user(duplicate_id),
        )
        .map_err(|e| {
            tracing::error!(primary = primary_id, duplicate = duplicate_id, error = %e, "Error getting user files");
            e
        })?;

        let (keep, stale) = match (primary_file, duplicate_file) {
            (None, None) => return Ok(()),
            (Some(file), None) | (None, Some(file)) => (file, None),
            (Some(mine), Some(theirs)) => {
                if mine.updated > theirs.updated {
                    (mine, Some(theirs))
                } else {
                    (theirs, Some(mine))
                }
            }
        };

        if let Some(stale) = stale {
            let (binary, metadata) = tokio::join!(
                self.files.delete_binary(&stale.id),
                self.files.remove(&stale.id),
            );

            if let Err(e) = binary {
                tracing::warn!(file_id = %stale.id, error = %e, "Error deleting stale file binary, continuing");
            }
            metadata.map_err(|e| {
                tracing::error!(file_id = %stale.id, error = %e, "Error removing stale file record");
                e
            })?;
        }

        if keep.user != primary_id {
            self.files
                .set_owner(&keep.id, primary_id)
                .await
                .map_err(|e| {
                    tracing::error!(file_id = %keep.id, error = %e, "Error reassigning file");
                    e
                })?;
        }

        Ok(())
    }

    /// Swap `duplicate_id` for `primary_id` in records that reference only the duplicate.
    async fn repoint(
        &self,
        collection: &'static str,
        store: &dyn MembershipStore,
        primary_id: &str,
        duplicate_id: &str,
    ) -> Result<()> {
        let filter = MembershipFilter {
            contains: duplicate_id.to_string(),
            excludes: primary_id.to_string(),
        };
        let swap = MemberSwap {
            from: duplicate_id.to_string(),
            to: primary_id.to_string(),
        };

        match store.update_multi(&filter, &swap).await {
            Ok(affected) => {
                tracing::debug!(collection, count = affected.len(), "Repointed records");
                Ok(())
            }
            Err(AppError::NotFound(_)) => {
                tracing::debug!(collection, user_id = duplicate_id, "No records to repoint");
                Ok(())
            }
            Err(e) => {
                tracing::error!(collection, primary = primary_id, duplicate = duplicate_id, error = %e, "Error repointing records");
                Err(e)
            }
        }
    }
}

/// The stored primary with the credential blocks the resolver linked onto
/// `directive`. Everything else comes from the stored record.
fn with_linked_credentials(mut stored: User, directive: &User) -> User {
    for provider in [Provider::Facebook, Provider::Google, Provider::Fenix] {
        if let Some(auth) = directive.auth_for(provider) {
            if stored.auth_for(provider).as_ref() != Some(&auth) {
                stored.set_auth(auth);
            }
        }
    }
    stored
}

fn lock_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Build the merged record: fields present on `primary` win, absent ones fall
/// back to `duplicate`. Skills are unioned, and the duplicate's sessions are
/// appended after the primary's so its live tokens keep working. The session
/// cap is applied by the next session issue.
pub fn consolidate(primary: &User, duplicate: &User) -> User {
    let mut merged = primary.clone();

    if !merged.has_mail() {
        merged.mail = duplicate.mail.clone();
    }
    if merged.name.is_none() {
        merged.name = duplicate.name.clone();
    }
    merged.skills.extend(duplicate.skills.iter().cloned());

    for provider in [Provider::Facebook, Provider::Google, Provider::Fenix] {
        if merged.auth_for(provider).is_none() {
            if let Some(auth) = duplicate.auth_for(provider) {
                merged.set_auth(auth);
            }
        }
    }

    for session in &duplicate.sessions {
        if !merged.sessions.iter().any(|s| s.token == session.token) {
            merged.sessions.push(session.clone());
        }
    }

    merged
}
