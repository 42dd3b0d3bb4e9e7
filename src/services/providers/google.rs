// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google access token verification and profile lookup.
//!
//! The profile comes from two separate calls, the public profile by id
//! (People API) and the e-mail by token (userinfo). Both must succeed.

use crate::config::GoogleConfig;
use crate::error::{AppError, Result};
use crate::models::Provider;
use crate::services::providers::{
    http_client, read_json, transport_error, IdentityProvider, ProviderCredential, ProviderGrant,
    ProviderProfile,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const PEOPLE_URL: &str = "https://people.googleapis.com/v1/people";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Google identity provider.
pub struct GoogleProvider {
    http: reqwest::Client,
    client_id: String,
    api_key: String,
}

impl GoogleProvider {
    pub fn new(config: &GoogleConfig, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            client_id: config.client_id.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get_person(&self, id: &str) -> Result<Person> {
        let response = self
            .http
            .get(format!("{PEOPLE_URL}/{id}"))
            .query(&[("personFields", "names,photos"), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, e))?;

        read_json(Provider::Google, response).await
    }

    async fn get_mail(&self, token: &str) -> Result<Option<String>> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, e))?;

        let info: UserInfo = read_json(Provider::Google, response).await?;
        if info.email_verified == Some(false) {
            tracing::warn!("Google e-mail is not verified, ignoring it");
            return Ok(None);
        }
        Ok(info.email)
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: Option<String>,
    aud: Option<String>,
    azp: Option<String>,
    /// Seconds until expiry, sent as a string
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Person {
    #[serde(default)]
    names: Vec<PersonName>,
    #[serde(default)]
    photos: Vec<PersonPhoto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonName {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonPhoto {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    email_verified: Option<bool>,
}

/// Check a tokeninfo payload against the claimed user and our client id.
///
/// Returns the remaining lifetime in seconds.
fn check_token_info(info: &TokenInfo, claimed_id: &str, client_id: &str) -> Result<i64> {
    if info.sub.as_deref() != Some(claimed_id) {
        return Err(AppError::Unauthorized("nice try".to_string()));
    }

    let audience_ok = [info.aud.as_deref(), info.azp.as_deref()]
        .into_iter()
        .flatten()
        .any(|aud| aud == client_id);
    if !audience_ok {
        tracing::warn!(aud = ?info.aud, azp = ?info.azp, "Google token issued to another client");
        return Err(AppError::Unauthorized("nice try".to_string()));
    }

    let expires_in = info
        .expires_in
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    if expires_in <= 0 {
        return Err(AppError::Unauthorized("google token expired".to_string()));
    }

    Ok(expires_in)
}

fn into_profile(id: &str, person: Person, email: Option<String>) -> ProviderProfile {
    ProviderProfile {
        provider_id: id.to_string(),
        email,
        secondary_emails: Vec::new(),
        name: person.names.into_iter().find_map(|n| n.display_name),
        image: person.photos.into_iter().find_map(|p| p.url),
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn verify(&self, credential: &ProviderCredential) -> Result<ProviderGrant> {
        let ProviderCredential::AccessToken { id, token } = credential else {
            return Err(AppError::Unauthorized(
                "google expects an access token".to_string(),
            ));
        };

        let response = self
            .http
            .get(TOKENINFO_URL)
            .query(&[("access_token", token.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, e))?;
        let info: TokenInfo = read_json(Provider::Google, response).await?;

        let expires_in = check_token_info(&info, id, &self.client_id)?;
        tracing::debug!(google_id = %id, expires_in, "Google token verified");

        let mut grant = ProviderGrant::for_token(id.clone(), token.clone());
        grant.expires_in = Some(expires_in);
        Ok(grant)
    }

    async fn fetch_profile(&self, grant: &ProviderGrant) -> Result<ProviderProfile> {
        let id = grant
            .claimed_id
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("google grant without user id".to_string()))?;

        let (person, email) = futures_util::future::try_join(
            self.get_person(id),
            self.get_mail(&grant.access_token),
        )
        .await?;

        Ok(into_profile(id, person, email))
    }
}
