// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider verification.
//!
//! Each provider implements [`IdentityProvider`]: `verify` proves the
//! presented credential is live for the claimed identity, `fetch_profile`
//! returns the normalized profile the resolver works with.

pub mod facebook;
pub mod fenix;
pub mod google;

pub use facebook::FacebookProvider;
pub use fenix::FenixProvider;
pub use google::GoogleProvider;

use crate::error::{AppError, Result};
use crate::models::{FacebookAuth, FenixAuth, GoogleAuth, Provider, ProviderAuth};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use validator::ValidateEmail;

/// Credential presented by a caller signing in with a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCredential {
    /// Provider user id plus an access token issued to our app (Facebook, Google)
    AccessToken { id: String, token: String },
    /// OAuth authorization code to exchange (Fenix)
    AuthorizationCode { code: String },
}

/// Outcome of a successful `verify` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderGrant {
    /// Provider user id, when the credential already names it
    pub claimed_id: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Declared access token lifetime in seconds
    pub expires_in: Option<i64>,
    pub issued_at: DateTime<Utc>,
}

impl ProviderGrant {
    /// Grant for a bearer token that carries its own id.
    pub fn for_token(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            claimed_id: Some(id.into()),
            access_token: token.into(),
            refresh_token: None,
            expires_in: None,
            issued_at: Utc::now(),
        }
    }
}

/// Normalized profile returned by `fetch_profile`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub email: Option<String>,
    /// Other addresses the provider knows for this person
    pub secondary_emails: Vec<String>,
    pub name: Option<String>,
    pub image: Option<String>,
}

impl ProviderProfile {
    /// The address used to identify this person: the primary email if
    /// usable, otherwise the first usable secondary one.
    pub fn require_email(&self, provider: Provider) -> Result<String> {
        self.email
            .iter()
            .chain(self.secondary_emails.iter())
            .map(|e| e.trim())
            .find(|e| is_usable_email(e))
            .map(str::to_string)
            .ok_or_else(|| {
                tracing::warn!(
                    provider = %provider,
                    provider_id = %self.provider_id,
                    "Profile has no usable e-mail"
                );
                AppError::NotAcceptable(format!("you must have a valid {provider} e-mail"))
            })
    }

    /// Every usable address known for this person, primary first, deduplicated.
    pub fn all_emails(&self) -> Vec<String> {
        let mut emails: Vec<String> = Vec::new();
        for email in self.email.iter().chain(self.secondary_emails.iter()) {
            let email = email.trim();
            if is_usable_email(email) && !emails.iter().any(|e| e == email) {
                emails.push(email.to_string());
            }
        }
        emails
    }
}

fn is_usable_email(email: &str) -> bool {
    !email.is_empty() && email.to_string().validate_email()
}

/// An external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// True if the provider may return several addresses for one person, in
    /// which case first sign-in matches existing users on any of them.
    fn multi_email(&self) -> bool {
        false
    }

    /// Confirm the credential is currently valid for the claimed identity.
    async fn verify(&self, credential: &ProviderCredential) -> Result<ProviderGrant>;

    /// Fetch the profile behind a verified grant.
    async fn fetch_profile(&self, grant: &ProviderGrant) -> Result<ProviderProfile>;
}

/// Build the credential block stored on the user for this grant.
///
/// `profile` is absent on the returning-user fast path, where only the
/// token is refreshed.
pub fn auth_block(
    provider: Provider,
    provider_id: &str,
    grant: &ProviderGrant,
    profile: Option<&ProviderProfile>,
) -> ProviderAuth {
    match provider {
        Provider::Facebook => ProviderAuth::Facebook(FacebookAuth {
            id: provider_id.to_string(),
            token: grant.access_token.clone(),
        }),
        Provider::Google => ProviderAuth::Google(GoogleAuth {
            id: provider_id.to_string(),
            img: profile.and_then(|p| p.image.clone()),
            token: grant.access_token.clone(),
        }),
        Provider::Fenix => ProviderAuth::Fenix(FenixAuth {
            id: provider_id.to_string(),
            token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            ttl: grant.expires_in,
            issued_at: grant.issued_at,
        }),
    }
}

/// Run a provider call under a deadline; a timeout counts as a failed verification.
pub async fn with_deadline<T, F>(provider: Provider, deadline: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(provider = %provider, deadline_ms = deadline.as_millis() as u64, "Provider call timed out");
            Err(AppError::Unauthorized(format!(
                "couldn't reach {provider} in time"
            )))
        }
    }
}

/// Map a transport or HTTP failure from a provider into `Unauthorized`.
pub(crate) fn transport_error(provider: Provider, err: reqwest::Error) -> AppError {
    tracing::warn!(provider = %provider, error = %err, "Provider request failed");
    AppError::Unauthorized(format!("couldn't retrieve your info from {provider}"))
}

/// Check the response status and decode its JSON body.
pub(crate) async fn read_json<T: for<'de> serde::Deserialize<'de>>(
    provider: Provider,
    response: reqwest::Response,
) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(provider = %provider, status = %status, body = %body, "Provider rejected request");
        return Err(AppError::Unauthorized(format!(
            "{provider} rejected the credential"
        )));
    }

    response.json().await.map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "Invalid provider JSON");
        AppError::Unauthorized(format!("couldn't retrieve your info from {provider}"))
    })
}

/// Shared HTTP client builder for provider calls.
pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed building provider HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_email_falls_back_to_secondary() {
        let profile = ProviderProfile {
            provider_id: "ist1".to_string(),
            email: Some("not-an-email".to_string()),
            secondary_emails: vec!["me@personal.pt".to_string()],
            ..Default::default()
        };
        assert_eq!(
            profile.require_email(Provider::Fenix).unwrap(),
            "me@personal.pt"
        );
    }

    #[test]
    fn require_email_without_any_is_not_acceptable() {
        let profile = ProviderProfile {
            provider_id: "fb1".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            profile.require_email(Provider::Facebook),
            Err(AppError::NotAcceptable(_))
        ));
    }

    #[test]
    fn all_emails_dedups_and_keeps_primary_first() {
        let profile = ProviderProfile {
            provider_id: "ist1".to_string(),
            email: Some("a@ist.pt".to_string()),
            secondary_emails: vec![
                "b@x.com".to_string(),
                "a@ist.pt".to_string(),
                "".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(profile.all_emails(), vec!["a@ist.pt", "b@x.com"]);
    }

    #[test]
    fn fenix_block_carries_grant_lifetime() {
        let grant = ProviderGrant {
            claimed_id: None,
            access_token: "acc".to_string(),
            refresh_token: Some("ref".to_string()),
            expires_in: Some(3600),
            issued_at: Utc::now(),
        };
        match auth_block(Provider::Fenix, "ist1", &grant, None) {
            ProviderAuth::Fenix(f) => {
                assert_eq!(f.refresh_token.as_deref(), Some("ref"));
                assert_eq!(f.ttl, Some(3600));
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_maps_to_unauthorized() {
        let result: Result<()> = with_deadline(
            Provider::Google,
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }
}
