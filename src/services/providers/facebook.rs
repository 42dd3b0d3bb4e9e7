// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Facebook Graph API verification.

use crate::config::FacebookConfig;
use crate::error::{AppError, Result};
use crate::models::Provider;
use crate::services::providers::{
    http_client, read_json, transport_error, IdentityProvider, ProviderCredential, ProviderGrant,
    ProviderProfile,
};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const GRAPH_URL: &str = "https://graph.facebook.com";

/// Facebook identity provider.
pub struct FacebookProvider {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
}

impl FacebookProvider {
    pub fn new(config: &FacebookConfig, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: GRAPH_URL.to_string(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
        })
    }

    /// `appsecret_proof` parameter: HMAC-SHA256 of the access token keyed by the app secret.
    fn appsecret_proof(&self, access_token: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.app_secret.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(access_token.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Inspect a user access token with the app token.
    async fn debug_token(&self, token: &str) -> Result<DebugTokenData> {
        let app_token = format!("{}|{}", self.app_id, self.app_secret);
        let response = self
            .http
            .get(format!("{}/debug_token", self.base_url))
            .query(&[("input_token", token), ("access_token", app_token.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(Provider::Facebook, e))?;

        let body: DebugTokenResponse = read_json(Provider::Facebook, response).await?;
        Ok(body.data)
    }
}

#[derive(Debug, Deserialize)]
struct DebugTokenResponse {
    data: DebugTokenData,
}

#[derive(Debug, Deserialize)]
struct DebugTokenData {
    #[serde(default)]
    is_valid: bool,
    app_id: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookUser {
    id: String,
    name: Option<String>,
    email: Option<String>,
}

/// Check the debug_token payload against the claimed user and our app.
fn check_debug_token(data: &DebugTokenData, claimed_id: &str, app_id: &str) -> Result<()> {
    if !data.is_valid {
        return Err(AppError::Unauthorized("nice try".to_string()));
    }
    if data.user_id.as_deref() != Some(claimed_id) {
        tracing::warn!(claimed_id, token_user = ?data.user_id, "Facebook token issued to another user");
        return Err(AppError::Unauthorized("nice try".to_string()));
    }
    if data.app_id.as_deref() != Some(app_id) {
        tracing::warn!(token_app = ?data.app_id, "Facebook token issued to another app");
        return Err(AppError::Unauthorized("nice try".to_string()));
    }
    Ok(())
}

#[async_trait]
impl IdentityProvider for FacebookProvider {
    fn provider(&self) -> Provider {
        Provider::Facebook
    }

    async fn verify(&self, credential: &ProviderCredential) -> Result<ProviderGrant> {
        let ProviderCredential::AccessToken { id, token } = credential else {
            return Err(AppError::Unauthorized(
                "facebook expects an access token".to_string(),
            ));
        };

        let data = self.debug_token(token).await?;
        check_debug_token(&data, id, &self.app_id)?;

        tracing::debug!(facebook_id = %id, "Facebook token verified");
        Ok(ProviderGrant::for_token(id.clone(), token.clone()))
    }

    async fn fetch_profile(&self, grant: &ProviderGrant) -> Result<ProviderProfile> {
        let proof = self.appsecret_proof(&grant.access_token)?;
        let response = self
            .http
            .get(format!("{}/me", self.base_url))
            .query(&[
                ("fields", "id,name,email"),
                ("access_token", grant.access_token.as_str()),
                ("appsecret_proof", proof.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(Provider::Facebook, e))?;

        let me: FacebookUser = read_json(Provider::Facebook, response).await?;
        tracing::debug!(facebook_id = %me.id, "Got facebook user");

        Ok(ProviderProfile {
            provider_id: me.id,
            email: me.email,
            secondary_emails: Vec::new(),
            name: me.name,
            image: None,
        })
    }
}
