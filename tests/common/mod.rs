// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use federated_auth::config::Config;
use federated_auth::db::{
    FileStore, MembershipStore, MemoryFileStore, MemoryMembershipStore, MemoryUserStore, UserStore,
};
use federated_auth::error::{AppError, Result};
use federated_auth::models::{Provider, Session, User};
use federated_auth::services::{
    IdentityProvider, JwtSigner, ProviderCredential, ProviderGrant, ProviderProfile, TokenSigner,
};
use federated_auth::{AuthService, Stores};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted identity provider.
///
/// Accounts are keyed by the access token (or authorization code) that
/// unlocks them.
pub struct FakeProvider {
    kind: Provider,
    multi_email: bool,
    delay_ms: AtomicU64,
    accounts: DashMap<String, ProviderProfile>,
    pub verify_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new(kind: Provider) -> Self {
        Self {
            kind,
            multi_email: kind == Provider::Fenix,
            delay_ms: AtomicU64::new(0),
            accounts: DashMap::new(),
            verify_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
        }
    }

    /// Register an account reachable with `token`.
    pub fn add_account(&self, token: &str, profile: ProviderProfile) {
        self.accounts.insert(token.to_string(), profile);
    }

    /// Make every `verify` call take this long.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn profile_fetches(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn provider(&self) -> Provider {
        self.kind
    }

    fn multi_email(&self) -> bool {
        self.multi_email
    }

    async fn verify(&self, credential: &ProviderCredential) -> Result<ProviderGrant> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match credential {
            ProviderCredential::AccessToken { id, token } => match self.accounts.get(token) {
                Some(profile) if &profile.provider_id == id => {
                    Ok(ProviderGrant::for_token(id.clone(), token.clone()))
                }
                _ => Err(AppError::Unauthorized("invalid token".to_string())),
            },
            ProviderCredential::AuthorizationCode { code } => {
                if !self.accounts.contains_key(code) {
                    return Err(AppError::Unauthorized("invalid code".to_string()));
                }
                Ok(ProviderGrant {
                    claimed_id: None,
                    access_token: code.clone(),
                    refresh_token: Some(format!("refresh-{code}")),
                    expires_in: Some(3600),
                    issued_at: Utc::now(),
                })
            }
        }
    }

    async fn fetch_profile(&self, grant: &ProviderGrant) -> Result<ProviderProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.accounts
            .get(&grant.access_token)
            .map(|p| p.clone())
            .ok_or_else(|| AppError::Unauthorized("unknown grant".to_string()))
    }
}

/// Profile with a provider id and optional primary e-mail.
#[allow(dead_code)]
pub fn profile(provider_id: &str, email: Option<&str>) -> ProviderProfile {
    ProviderProfile {
        provider_id: provider_id.to_string(),
        email: email.map(String::from),
        name: Some(format!("Person {provider_id}")),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn access_token(id: &str, token: &str) -> ProviderCredential {
    ProviderCredential::AccessToken {
        id: id.to_string(),
        token: token.to_string(),
    }
}

#[allow(dead_code)]
pub fn user(id: &str, mail: Option<&str>) -> User {
    User {
        id: id.to_string(),
        mail: mail.map(String::from),
        ..Default::default()
    }
}

/// An auth service wired to in-memory stores and fake providers.
#[allow(dead_code)]
pub struct Harness {
    pub service: AuthService,
    pub users: Arc<MemoryUserStore>,
    pub files: Arc<MemoryFileStore>,
    pub tickets: Arc<MemoryMembershipStore>,
    pub achievements: Arc<MemoryMembershipStore>,
    pub signer: Arc<JwtSigner>,
    pub facebook: Arc<FakeProvider>,
    pub google: Arc<FakeProvider>,
    pub fenix: Arc<FakeProvider>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_config(&Config::test_default())
    }

    pub fn with_config(config: &Config) -> Self {
        let users = Arc::new(MemoryUserStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let tickets = Arc::new(MemoryMembershipStore::new());
        let achievements = Arc::new(MemoryMembershipStore::new());
        let signer = Arc::new(JwtSigner::new(
            &config.jwt_signing_key,
            config.session_ttl,
            config.refresh_ttl,
        ));
        let facebook = Arc::new(FakeProvider::new(Provider::Facebook));
        let google = Arc::new(FakeProvider::new(Provider::Google));
        let fenix = Arc::new(FakeProvider::new(Provider::Fenix));

        let stores = Stores {
            users: users.clone() as Arc<dyn UserStore>,
            files: files.clone() as Arc<dyn FileStore>,
            tickets: tickets.clone() as Arc<dyn MembershipStore>,
            achievements: achievements.clone() as Arc<dyn MembershipStore>,
        };
        let providers = vec![
            facebook.clone() as Arc<dyn IdentityProvider>,
            google.clone() as Arc<dyn IdentityProvider>,
            fenix.clone() as Arc<dyn IdentityProvider>,
        ];

        let service = AuthService::new(
            stores,
            providers,
            signer.clone() as Arc<dyn TokenSigner>,
            config.provider_timeout,
            config.max_sessions,
        );

        Self {
            service,
            users,
            files,
            tickets,
            achievements,
            signer,
            facebook,
            google,
            fenix,
        }
    }

    /// Current stored state of a user.
    pub async fn stored(&self, user_id: &str) -> Option<User> {
        self.users
            .get(&federated_auth::db::UserFilter::Id(user_id.to_string()))
            .await
            .expect("memory store never fails reads")
    }

    /// Mint a session the way a previous login would have.
    pub fn mint(&self, user_id: &str) -> Session {
        self.signer.sign(user_id).expect("signing should succeed")
    }
}
