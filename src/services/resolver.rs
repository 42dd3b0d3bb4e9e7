// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Maps a verified provider identity onto an internal user.
//!
//! Provider id is the authoritative key, e-mail the secondary one. When a
//! distinct account matching the identity turns up, the outcome is a merge;
//! the only refusal is re-linking an identity the caller already owns.

use crate::db::{NewUser, UserChanges, UserFilter, UserStore};
use crate::error::{AppError, Result};
use crate::models::User;
use crate::services::merge::MergeDirective;
use crate::services::providers::{
    auth_block, with_deadline, IdentityProvider, ProviderGrant, ProviderProfile,
};
use std::sync::Arc;
use std::time::Duration;

/// What the orchestrator must do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Issue a session for `user_id`, persisting `changes` with it.
    Authenticate { user_id: String, changes: UserChanges },
    /// Merge two accounts, then issue a session for the primary.
    Merge(MergeDirective),
}

/// Resolves verified identities against the user store.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
    provider_timeout: Duration,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>, provider_timeout: Duration) -> Self {
        Self {
            users,
            provider_timeout,
        }
    }

    async fn fetch_profile(
        &self,
        provider: &dyn IdentityProvider,
        grant: &ProviderGrant,
    ) -> Result<ProviderProfile> {
        with_deadline(
            provider.provider(),
            self.provider_timeout,
            provider.fetch_profile(grant),
        )
        .await
    }

    /// Resolve a sign-in.
    pub async fn resolve_login(
        &self,
        provider: &dyn IdentityProvider,
        grant: &ProviderGrant,
    ) -> Result<Resolution> {
        let kind = provider.provider();

        // Providers whose credential does not name the user need the profile first.
        let mut profile = None;
        let provider_id = match &grant.claimed_id {
            Some(id) => id.clone(),
            None => {
                let fetched = self.fetch_profile(provider, grant).await?;
                let id = fetched.provider_id.clone();
                profile = Some(fetched);
                id
            }
        };

        let existing = self
            .users
            .get(&UserFilter::ProviderId(kind, provider_id.clone()))
            .await?;

        let Some(user) = existing else {
            let profile = match profile {
                Some(p) => p,
                None => self.fetch_profile(provider, grant).await?,
            };
            return self
                .create_or_attach(provider, &provider_id, grant, &profile)
                .await;
        };

        if user.has_mail() {
            tracing::debug!(user_id = %user.id, provider = %kind, "Returning user");
            let auth = auth_block(kind, &provider_id, grant, profile.as_ref())
                .overlay(user.auth_for(kind).as_ref());
            return Ok(Resolution::Authenticate {
                user_id: user.id,
                changes: UserChanges::with_auth(auth),
            });
        }

        // Partial record: complete it from the profile, or fold it into the
        // account that already owns the address.
        let profile = match profile {
            Some(p) => p,
            None => self.fetch_profile(provider, grant).await?,
        };
        let mail = profile.require_email(kind)?;
        let auth = auth_block(kind, &provider_id, grant, Some(&profile))
            .overlay(user.auth_for(kind).as_ref());

        match self.users.get(&UserFilter::Mail(mail.clone())).await? {
            Some(owner) if owner.id != user.id => {
                tracing::info!(
                    user_id = %user.id,
                    owner = %owner.id,
                    provider = %kind,
                    "Provider account collides with existing e-mail, merging"
                );
                let mut primary = owner;
                primary.set_auth(auth);
                Ok(Resolution::Merge(MergeDirective {
                    primary,
                    duplicate: user,
                }))
            }
            _ => Ok(Resolution::Authenticate {
                user_id: user.id,
                changes: UserChanges {
                    mail: Some(mail),
                    auth: Some(auth),
                    ..Default::default()
                },
            }),
        }
    }

    /// First sign-in with this provider id: attach to the user owning one of
    /// the profile's addresses, or create a new user.
    async fn create_or_attach(
        &self,
        provider: &dyn IdentityProvider,
        provider_id: &str,
        grant: &ProviderGrant,
        profile: &ProviderProfile,
    ) -> Result<Resolution> {
        let kind = provider.provider();
        let mail = profile.require_email(kind)?;

        let filter = if provider.multi_email() {
            UserFilter::MailIn(profile.all_emails())
        } else {
            UserFilter::Mail(mail.clone())
        };
        let changes = UserChanges::with_auth(auth_block(kind, provider_id, grant, Some(profile)));
        let on_insert = NewUser {
            id: uuid::Uuid::new_v4().to_string(),
            name: profile.name.clone(),
            mail,
        };

        let user = self
            .users
            .find_or_create(&filter, changes.clone(), on_insert)
            .await
            .map_err(|e| {
                tracing::error!(filter = %filter, changes = %changes, error = %e, "Error upserting user");
                e
            })?;

        tracing::debug!(user_id = %user.id, provider = %kind, "Upserted user");
        Ok(Resolution::Authenticate {
            user_id: user.id,
            changes: UserChanges::default(),
        })
    }

    /// Resolve linking a new provider account onto `current`.
    pub async fn resolve_add_account(
        &self,
        provider: &dyn IdentityProvider,
        grant: &ProviderGrant,
        current: &User,
    ) -> Result<Resolution> {
        let kind = provider.provider();
        let profile = self.fetch_profile(provider, grant).await?;
        let mail = profile.require_email(kind)?;
        let provider_id = grant
            .claimed_id
            .clone()
            .unwrap_or_else(|| profile.provider_id.clone());
        let fresh = auth_block(kind, &provider_id, grant, Some(&profile));

        let linked = self
            .users
            .get(&UserFilter::ProviderId(kind, provider_id.clone()))
            .await?;

        match linked {
            None => {
                tracing::debug!(user_id = %current.id, provider = %kind, "Linking provider account");
                Ok(Resolution::Authenticate {
                    user_id: current.id.clone(),
                    changes: UserChanges {
                        mail: (!current.has_mail()).then_some(mail),
                        auth: Some(fresh.overlay(current.auth_for(kind).as_ref())),
                        ..Default::default()
                    },
                })
            }
            Some(owner) if owner.id == current.id => {
                tracing::warn!(user_id = %current.id, provider = %kind, "User already added account");
                Err(AppError::Conflict(
                    "Account already registered to this user".to_string(),
                ))
            }
            Some(owner) => {
                tracing::info!(
                    user_id = %current.id,
                    owner = %owner.id,
                    provider = %kind,
                    "Provider account belongs to another user, merging"
                );
                let auth = fresh.overlay(owner.auth_for(kind).as_ref());
                let mut primary = current.clone();
                primary.set_auth(auth);
                Ok(Resolution::Merge(MergeDirective {
                    primary,
                    duplicate: owner,
                }))
            }
        }
    }
}
