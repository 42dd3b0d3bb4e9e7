//! Persistence contracts consumed by the auth core.
//!
//! The core never talks to a database directly: it is handed trait objects
//! for the user collection, the file collection, and the membership
//! collections (tickets, achievements). [`memory`] provides an in-process
//! implementation of all of them.

pub mod memory;

pub use memory::{MemoryFileStore, MemoryMembershipStore, MemoryUserStore};

use crate::error::Result;
use crate::models::{FileRecord, Provider, ProviderAuth, Session, User};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;

/// Selects a single user record.
#[derive(Debug, Clone, PartialEq)]
pub enum UserFilter {
    Id(String),
    Mail(String),
    /// Any user whose mail is one of the listed addresses
    MailIn(Vec<String>),
    ProviderId(Provider, String),
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserFilter::Id(id) => &user.id == id,
            UserFilter::Mail(mail) => user.mail.as_deref() == Some(mail.as_str()),
            UserFilter::MailIn(mails) => user
                .mail
                .as_deref()
                .is_some_and(|m| mails.iter().any(|candidate| candidate == m)),
            UserFilter::ProviderId(provider, id) => {
                user.provider_id(*provider) == Some(id.as_str())
            }
        }
    }
}

impl fmt::Display for UserFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserFilter::Id(id) => write!(f, "id={id}"),
            UserFilter::Mail(mail) => write!(f, "mail={mail}"),
            UserFilter::MailIn(mails) => write!(f, "mail in [{}]", mails.join(", ")),
            UserFilter::ProviderId(provider, id) => write!(f, "{provider}.id={id}"),
        }
    }
}

/// Field updates applied to an existing user in one write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub mail: Option<String>,
    pub name: Option<String>,
    /// Credential block to store; replaces the stored block for its provider
    pub auth: Option<ProviderAuth>,
    /// Session to append to the session list
    pub push_session: Option<Session>,
    /// After appending, keep only this many newest sessions
    pub session_limit: Option<usize>,
}

impl UserChanges {
    pub fn with_auth(auth: ProviderAuth) -> Self {
        Self {
            auth: Some(auth),
            ..Default::default()
        }
    }
}

impl fmt::Display for UserChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Vec::new();
        if let Some(mail) = &self.mail {
            fields.push(format!("mail={mail}"));
        }
        if self.name.is_some() {
            fields.push("name".to_string());
        }
        if let Some(auth) = &self.auth {
            fields.push(format!("{}.id={}", auth.provider(), auth.provider_id()));
        }
        if self.push_session.is_some() {
            fields.push("+session".to_string());
        }
        write!(f, "{{{}}}", fields.join(", "))
    }
}

/// Fields set only when find-or-create inserts a new user.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub id: String,
    pub name: Option<String>,
    pub mail: String,
}

/// Filter for bulk membership updates: records containing one id but not another.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipFilter {
    pub contains: String,
    pub excludes: String,
}

/// Replace one member id with another within matched records.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSwap {
    pub from: String,
    pub to: String,
}

/// The user collection.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch the single user matching `filter`.
    async fn get(&self, filter: &UserFilter) -> Result<Option<User>>;

    /// Apply `changes` to the user matching `filter`.
    ///
    /// Fails with `NotFound` if no user matches.
    async fn update(&self, filter: &UserFilter, changes: UserChanges) -> Result<User>;

    /// Atomically apply `changes` to the user matching `filter`, or insert a
    /// new user built from `on_insert` plus `changes` if none matches.
    ///
    /// Concurrent calls with overlapping filters must never produce two users.
    async fn find_or_create(
        &self,
        filter: &UserFilter,
        changes: UserChanges,
        on_insert: NewUser,
    ) -> Result<User>;

    /// Overwrite the stored record with the same id as `user`.
    async fn replace(&self, user: User) -> Result<User>;

    /// Replace the session exactly matching `(token, refresh_token)` with
    /// `new_session`. Returns `None` without writing if no entry matches.
    async fn rotate_session(
        &self,
        user_id: &str,
        token: &str,
        refresh_token: &str,
        new_session: Session,
    ) -> Result<Option<User>>;

    /// Drop the session carrying `token`. Returns whether one was removed.
    async fn remove_session(&self, user_id: &str, token: &str) -> Result<bool>;

    /// Delete a user. Returns whether a record was removed.
    async fn remove(&self, user_id: &str) -> Result<bool>;
}

/// File metadata plus the binary blob storage behind it.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Metadata of the file owned by `user_id`, if any.
    async fn get_by_user(&self, user_id: &str) -> Result<Option<FileRecord>>;

    /// Delete the binary blob of a file.
    async fn delete_binary(&self, file_id: &str) -> Result<()>;

    /// Delete the metadata record of a file.
    async fn remove(&self, file_id: &str) -> Result<FileRecord>;

    /// Reassign a file to another owner.
    async fn set_owner(&self, file_id: &str, user_id: &str) -> Result<FileRecord>;
}

/// A collection of records carrying a `users` membership set.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Apply `swap` to every record matching `filter`; returns affected ids.
    async fn update_multi(
        &self,
        filter: &MembershipFilter,
        swap: &MemberSwap,
    ) -> Result<BTreeSet<String>>;
}
