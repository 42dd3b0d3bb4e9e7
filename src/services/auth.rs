// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in orchestration.
//!
//! Every entry point is a strict pipeline: verify the credential, resolve
//! the identity, merge if needed, then issue a session. The first failing
//! step ends the flow.

use crate::config::Config;
use crate::db::{FileStore, MembershipStore, UserChanges, UserFilter, UserStore};
use crate::error::{AppError, Result};
use crate::models::{Provider, Session, User};
use crate::services::merge::AccountMerger;
use crate::services::providers::{
    with_deadline, FacebookProvider, FenixProvider, GoogleProvider, IdentityProvider,
    ProviderCredential,
};
use crate::services::resolver::{IdentityResolver, Resolution};
use crate::services::session::SessionIssuer;
use crate::services::token::{JwtSigner, TokenSigner};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Successful sign-in: the user the caller now is, and their new session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
    pub user_id: String,
    pub session: Session,
}

/// Persistence collaborators the auth service is built from.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub files: Arc<dyn FileStore>,
    pub tickets: Arc<dyn MembershipStore>,
    pub achievements: Arc<dyn MembershipStore>,
}

/// The authentication core.
#[derive(Clone)]
pub struct AuthService {
    providers: HashMap<Provider, Arc<dyn IdentityProvider>>,
    users: Arc<dyn UserStore>,
    resolver: IdentityResolver,
    merger: AccountMerger,
    sessions: SessionIssuer,
    provider_timeout: Duration,
}

impl AuthService {
    /// Assemble the service from explicit collaborators.
    pub fn new(
        stores: Stores,
        providers: Vec<Arc<dyn IdentityProvider>>,
        signer: Arc<dyn TokenSigner>,
        provider_timeout: Duration,
        max_sessions: usize,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.provider(), p))
            .collect();

        Self {
            providers,
            users: stores.users.clone(),
            resolver: IdentityResolver::new(stores.users.clone(), provider_timeout),
            merger: AccountMerger::new(
                stores.users.clone(),
                stores.files,
                stores.tickets,
                stores.achievements,
            ),
            sessions: SessionIssuer::new(stores.users, signer, max_sessions),
            provider_timeout,
        }
    }

    /// Build the service with the HTTP providers and JWT signer described by `config`.
    pub fn from_config(config: &Config, stores: Stores) -> anyhow::Result<Self> {
        let mut providers: Vec<Arc<dyn IdentityProvider>> = Vec::new();
        if let Some(fb) = &config.facebook {
            providers.push(Arc::new(FacebookProvider::new(fb, config.provider_timeout)?));
        }
        if let Some(google) = &config.google {
            providers.push(Arc::new(GoogleProvider::new(google, config.provider_timeout)?));
        }
        if let Some(fenix) = &config.fenix {
            providers.push(Arc::new(FenixProvider::new(fenix, config.provider_timeout)?));
        }

        tracing::info!(
            providers = ?providers.iter().map(|p| p.provider()).collect::<Vec<_>>(),
            "Initialized identity providers"
        );

        let signer = Arc::new(JwtSigner::new(
            &config.jwt_signing_key,
            config.session_ttl,
            config.refresh_ttl,
        ));

        Ok(Self::new(
            stores,
            providers,
            signer,
            config.provider_timeout,
            config.max_sessions,
        ))
    }

    fn provider(&self, provider: Provider) -> Result<&Arc<dyn IdentityProvider>> {
        self.providers
            .get(&provider)
            .ok_or_else(|| AppError::Unauthorized(format!("{provider} login is not enabled")))
    }

    /// Sign in with a provider credential, creating or merging accounts as needed.
    pub async fn login_with_provider(
        &self,
        provider: Provider,
        credential: &ProviderCredential,
    ) -> Result<AuthOutcome> {
        let client = self.provider(provider)?;

        let result = async {
            let grant =
                with_deadline(provider, self.provider_timeout, client.verify(credential)).await?;
            let resolution = self.resolver.resolve_login(client.as_ref(), &grant).await?;
            self.finish(resolution).await
        }
        .await;

        if let Err(e) = &result {
            tracing::error!(provider = %provider, error = %e, "Error on {} login", provider);
        }
        result
    }

    /// Link another provider account to the already authenticated `current` user.
    pub async fn add_provider_account(
        &self,
        current: &User,
        provider: Provider,
        credential: &ProviderCredential,
    ) -> Result<AuthOutcome> {
        let client = self.provider(provider)?;

        let result = async {
            let grant =
                with_deadline(provider, self.provider_timeout, client.verify(credential)).await?;
            let current = self
                .users
                .get(&UserFilter::Id(current.id.clone()))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("user {}", current.id)))?;
            let resolution = self
                .resolver
                .resolve_add_account(client.as_ref(), &grant, &current)
                .await?;
            self.finish(resolution).await
        }
        .await;

        if let Err(e) = &result {
            tracing::error!(user_id = %current.id, provider = %provider, error = %e, "Error adding {} account", provider);
        }
        result
    }

    /// Rotate a session pair.
    pub async fn refresh_session(
        &self,
        user_id: &str,
        token: &str,
        refresh_token: &str,
    ) -> Result<Session> {
        self.sessions.refresh(user_id, token, refresh_token).await
    }

    /// End the session carrying `token`.
    pub async fn logout(&self, user_id: &str, token: &str) -> Result<()> {
        self.sessions.revoke(user_id, token).await
    }

    async fn finish(&self, resolution: Resolution) -> Result<AuthOutcome> {
        let (user_id, changes) = match resolution {
            Resolution::Authenticate { user_id, changes } => (user_id, changes),
            Resolution::Merge(directive) => {
                let merged = self.merger.merge(directive).await?;
                (merged.id, UserChanges::default())
            }
        };

        let session = self.sessions.authenticate(&user_id, changes).await?;
        Ok(AuthOutcome { user_id, session })
    }
}
