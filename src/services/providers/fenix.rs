// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fenix OAuth: authorization code exchange and person lookup.
//!
//! Fenix users carry an institutional address plus personal and work
//! addresses, so first sign-in matches existing users on any of them.

use crate::config::FenixConfig;
use crate::error::{AppError, Result};
use crate::models::Provider;
use crate::services::providers::{
    http_client, read_json, transport_error, IdentityProvider, ProviderCredential, ProviderGrant,
    ProviderProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

/// Fenix identity provider.
pub struct FenixProvider {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

impl FenixProvider {
    pub fn new(config: &FenixConfig, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
        })
    }

    /// URL the user is sent to in order to authorize this application.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}/oauth/userdialog?client_id={}&redirect_uri={}",
            self.base_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_url)
        )
    }

    /// Exchange an authorization code for an access/refresh token pair.
    async fn exchange_code(&self, code: &str) -> Result<ProviderGrant> {
        let response = self
            .http
            .post(format!("{}/oauth/access_token", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| transport_error(Provider::Fenix, e))?;

        let body: TokenResponse = read_json(Provider::Fenix, response).await?;
        tracing::debug!(expires_in = ?body.expires_in, "Fenix code exchanged");

        Ok(ProviderGrant {
            claimed_id: None,
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
            issued_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    username: String,
    name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    personal_emails: Vec<String>,
    #[serde(default)]
    work_emails: Vec<String>,
}

impl From<Person> for ProviderProfile {
    fn from(person: Person) -> Self {
        let mut secondary_emails = person.personal_emails;
        secondary_emails.extend(person.work_emails);

        ProviderProfile {
            provider_id: person.username,
            email: person.email,
            secondary_emails,
            name: person.name,
            image: None,
        }
    }
}

#[async_trait]
impl IdentityProvider for FenixProvider {
    fn provider(&self) -> Provider {
        Provider::Fenix
    }

    fn multi_email(&self) -> bool {
        true
    }

    async fn verify(&self, credential: &ProviderCredential) -> Result<ProviderGrant> {
        let ProviderCredential::AuthorizationCode { code } = credential else {
            return Err(AppError::Unauthorized(
                "fenix expects an authorization code".to_string(),
            ));
        };

        self.exchange_code(code).await
    }

    async fn fetch_profile(&self, grant: &ProviderGrant) -> Result<ProviderProfile> {
        let response = self
            .http
            .get(format!("{}/api/fenix/v1/person", self.base_url))
            .bearer_auth(&grant.access_token)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Fenix, e))?;

        let person: Person = read_json(Provider::Fenix, response).await?;
        tracing::debug!(fenix_id = %person.username, "Got fenix person");
        Ok(person.into())
    }
}
