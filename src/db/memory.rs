// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process stores implementing the persistence contracts.
//!
//! Provides:
//! - Users (with unique id and mail constraints, atomic find-or-create)
//! - Files (metadata plus binary blobs)
//! - Membership collections (tickets, achievements)

use crate::db::{
    FileStore, MemberSwap, MembershipFilter, MembershipStore, NewUser, UserChanges, UserFilter,
    UserStore,
};
use crate::error::{AppError, Result};
use crate::models::{FileRecord, MembershipRecord, Session, User};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

// ─── Users ───────────────────────────────────────────────────────────────────

/// User collection held in memory.
///
/// A single write lock covers every mutation, so filter-then-insert in
/// [`UserStore::find_or_create`] is atomic.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<BTreeMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly, enforcing the same constraints as writes.
    pub async fn insert(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(AppError::Database(format!(
                "duplicate key: id={} already exists",
                user.id
            )));
        }
        if let Some(mail) = &user.mail {
            check_unique_mail(&users, &user.id, mail)?;
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Snapshot of every stored user, ordered by id.
    pub async fn all(&self) -> Vec<User> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

/// Reject `mail` if a user other than `owner_id` already holds it.
fn check_unique_mail(users: &BTreeMap<String, User>, owner_id: &str, mail: &str) -> Result<()> {
    let taken = users
        .values()
        .any(|u| u.id != owner_id && u.mail.as_deref() == Some(mail));
    if taken {
        return Err(AppError::Database(format!(
            "duplicate key: mail={mail} already exists"
        )));
    }
    Ok(())
}

fn find_id(users: &BTreeMap<String, User>, filter: &UserFilter) -> Option<String> {
    if let UserFilter::Id(id) = filter {
        return users.contains_key(id).then(|| id.clone());
    }
    users
        .values()
        .find(|u| filter.matches(u))
        .map(|u| u.id.clone())
}

fn apply_changes(
    users: &mut BTreeMap<String, User>,
    user_id: &str,
    changes: UserChanges,
) -> Result<User> {
    if let Some(mail) = &changes.mail {
        check_unique_mail(users, user_id, mail)?;
    }

    let user = users
        .get_mut(user_id)
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;

    if let Some(mail) = changes.mail {
        user.mail = Some(mail);
    }
    if let Some(name) = changes.name {
        user.name = Some(name);
    }
    if let Some(auth) = changes.auth {
        user.set_auth(auth);
    }
    if let Some(session) = changes.push_session {
        user.sessions.push(session);
    }
    if let Some(limit) = changes.session_limit {
        // The session just pushed always survives.
        let excess = user.sessions.len().saturating_sub(limit.max(1));
        user.sessions = user.sessions.split_off(excess);
    }

    Ok(user.clone())
}

/// Constant-time token comparison.
fn token_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, filter: &UserFilter) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(find_id(&users, filter).and_then(|id| users.get(&id).cloned()))
    }

    async fn update(&self, filter: &UserFilter, changes: UserChanges) -> Result<User> {
        let mut users = self.users.write().await;
        let id = find_id(&users, filter)
            .ok_or_else(|| AppError::NotFound(format!("user matching {filter}")))?;
        apply_changes(&mut users, &id, changes)
    }

    async fn find_or_create(
        &self,
        filter: &UserFilter,
        changes: UserChanges,
        on_insert: NewUser,
    ) -> Result<User> {
        let mut users = self.users.write().await;

        if let Some(id) = find_id(&users, filter) {
            return apply_changes(&mut users, &id, changes);
        }

        if users.contains_key(&on_insert.id) {
            return Err(AppError::Database(format!(
                "duplicate key: id={} already exists",
                on_insert.id
            )));
        }
        check_unique_mail(&users, &on_insert.id, &on_insert.mail)?;

        let id = on_insert.id.clone();
        users.insert(
            id.clone(),
            User {
                id: on_insert.id,
                name: on_insert.name,
                mail: Some(on_insert.mail),
                ..Default::default()
            },
        );

        match apply_changes(&mut users, &id, changes) {
            Ok(user) => Ok(user),
            Err(e) => {
                users.remove(&id);
                Err(e)
            }
        }
    }

    async fn replace(&self, user: User) -> Result<User> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(AppError::NotFound(format!("user {}", user.id)));
        }
        if let Some(mail) = &user.mail {
            check_unique_mail(&users, &user.id, mail)?;
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn rotate_session(
        &self,
        user_id: &str,
        token: &str,
        refresh_token: &str,
        new_session: Session,
    ) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(user_id) else {
            return Ok(None);
        };

        let slot = user
            .sessions
            .iter_mut()
            .find(|s| token_eq(&s.token, token) && token_eq(&s.refresh_token, refresh_token));

        match slot {
            Some(session) => {
                *session = new_session;
                Ok(Some(user.clone()))
            }
            None => Ok(None),
        }
    }

    async fn remove_session(&self, user_id: &str, token: &str) -> Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(user_id) else {
            return Ok(false);
        };
        let before = user.sessions.len();
        user.sessions.retain(|s| !token_eq(&s.token, token));
        Ok(user.sessions.len() != before)
    }

    async fn remove(&self, user_id: &str) -> Result<bool> {
        Ok(self.users.write().await.remove(user_id).is_some())
    }
}

// ─── Files ───────────────────────────────────────────────────────────────────

/// File metadata and blobs held in memory.
#[derive(Default)]
pub struct MemoryFileStore {
    records: DashMap<String, FileRecord>,
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file record together with its binary content.
    pub fn insert(&self, record: FileRecord, content: Vec<u8>) {
        self.blobs.insert(record.id.clone(), content);
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, file_id: &str) -> Option<FileRecord> {
        self.records.get(file_id).map(|r| r.clone())
    }

    pub fn has_binary(&self, file_id: &str) -> bool {
        self.blobs.contains_key(file_id)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn get_by_user(&self, user_id: &str) -> Result<Option<FileRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.user == user_id)
            .map(|r| r.value().clone()))
    }

    async fn delete_binary(&self, file_id: &str) -> Result<()> {
        self.blobs
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("file blob {file_id}")))
    }

    async fn remove(&self, file_id: &str) -> Result<FileRecord> {
        self.records
            .remove(file_id)
            .map(|(_, record)| record)
            .ok_or_else(|| AppError::NotFound(format!("file {file_id}")))
    }

    async fn set_owner(&self, file_id: &str, user_id: &str) -> Result<FileRecord> {
        let mut record = self
            .records
            .get_mut(file_id)
            .ok_or_else(|| AppError::NotFound(format!("file {file_id}")))?;
        record.user = user_id.to_string();
        Ok(record.clone())
    }
}

// ─── Memberships ─────────────────────────────────────────────────────────────

/// A ticket or achievement collection held in memory.
#[derive(Default)]
pub struct MemoryMembershipStore {
    records: DashMap<String, MembershipRecord>,
}

impl MemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: MembershipRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<MembershipRecord> {
        self.records.get(id).map(|r| r.clone())
    }
}

#[async_trait]
impl MembershipStore for MemoryMembershipStore {
    async fn update_multi(
        &self,
        filter: &MembershipFilter,
        swap: &MemberSwap,
    ) -> Result<BTreeSet<String>> {
        let mut affected = BTreeSet::new();

        for mut record in self.records.iter_mut() {
            if !record.has_member(&filter.contains) || record.has_member(&filter.excludes) {
                continue;
            }
            for member in record.users.iter_mut() {
                if *member == swap.from {
                    *member = swap.to.clone();
                }
            }
            affected.insert(record.id.clone());
        }

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FacebookAuth, Provider, ProviderAuth};
    use chrono::Utc;

    fn user(id: &str, mail: Option<&str>) -> User {
        User {
            id: id.to_string(),
            mail: mail.map(String::from),
            ..Default::default()
        }
    }

    fn session(token: &str, refresh: &str) -> Session {
        Session {
            token: token.to_string(),
            refresh_token: refresh.to_string(),
            ttl: 3600,
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_mail() {
        let store = MemoryUserStore::new();
        store.insert(user("a", Some("a@x.com"))).await.unwrap();
        let err = store.insert(user("b", Some("a@x.com"))).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn find_or_create_inserts_then_matches() {
        let store = MemoryUserStore::new();
        let auth = ProviderAuth::Facebook(FacebookAuth {
            id: "fb1".to_string(),
            token: "tok".to_string(),
        });
        let filter = UserFilter::Mail("a@x.com".to_string());

        let created = store
            .find_or_create(
                &filter,
                UserChanges::with_auth(auth.clone()),
                NewUser {
                    id: "u1".to_string(),
                    name: Some("A".to_string()),
                    mail: "a@x.com".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.id, "u1");
        assert_eq!(created.provider_id(Provider::Facebook), Some("fb1"));

        let again = store
            .find_or_create(
                &filter,
                UserChanges::with_auth(auth),
                NewUser {
                    id: "u2".to_string(),
                    name: None,
                    mail: "a@x.com".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(again.id, "u1");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let store = MemoryUserStore::new();
        let err = store
            .update(&UserFilter::Id("nope".to_string()), UserChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn session_limit_drops_oldest() {
        let store = MemoryUserStore::new();
        let mut u = user("u1", None);
        u.sessions = vec![session("t1", "r1"), session("t2", "r2")];
        store.insert(u).await.unwrap();

        let updated = store
            .update(
                &UserFilter::Id("u1".to_string()),
                UserChanges {
                    push_session: Some(session("t3", "r3")),
                    session_limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let tokens: Vec<_> = updated.sessions.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, vec!["t2", "t3"]);
    }

    #[tokio::test]
    async fn zero_session_limit_keeps_newest() {
        let store = MemoryUserStore::new();
        let mut u = user("u1", None);
        u.sessions = vec![session("t1", "r1")];
        store.insert(u).await.unwrap();

        let updated = store
            .update(
                &UserFilter::Id("u1".to_string()),
                UserChanges {
                    push_session: Some(session("t2", "r2")),
                    session_limit: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let tokens: Vec<_> = updated.sessions.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, vec!["t2"]);
    }

    #[tokio::test]
    async fn rotate_requires_exact_pair() {
        let store = MemoryUserStore::new();
        let mut u = user("u1", None);
        u.sessions = vec![session("t1", "r1")];
        store.insert(u).await.unwrap();

        let miss = store
            .rotate_session("u1", "t1", "r2", session("t9", "r9"))
            .await
            .unwrap();
        assert!(miss.is_none());

        let hit = store
            .rotate_session("u1", "t1", "r1", session("t2", "r2"))
            .await
            .unwrap()
            .expect("pair should match");
        assert_eq!(hit.sessions[0].token, "t2");
    }

    #[tokio::test]
    async fn membership_swap_skips_records_with_both() {
        let store = MemoryMembershipStore::new();
        store.insert(MembershipRecord::new("t1", &["dup"]));
        store.insert(MembershipRecord::new("t2", &["dup", "primary"]));
        store.insert(MembershipRecord::new("t3", &["other"]));

        let affected = store
            .update_multi(
                &MembershipFilter {
                    contains: "dup".to_string(),
                    excludes: "primary".to_string(),
                },
                &MemberSwap {
                    from: "dup".to_string(),
                    to: "primary".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec!["t1"]);
        assert_eq!(store.get("t1").unwrap().users, vec!["primary"]);
        assert_eq!(store.get("t2").unwrap().users, vec!["dup", "primary"]);
    }
}
