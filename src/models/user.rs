// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model and the per-provider credential blocks stored on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// External identity providers users can sign in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Facebook,
    Google,
    Fenix,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Facebook => "facebook",
            Provider::Google => "google",
            Provider::Fenix => "fenix",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "facebook" => Ok(Provider::Facebook),
            "google" => Ok(Provider::Google),
            "fenix" => Ok(Provider::Fenix),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Facebook credential block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookAuth {
    pub id: String,
    pub token: String,
}

/// Google credential block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleAuth {
    pub id: String,
    /// Profile picture URL
    pub img: Option<String>,
    pub token: String,
}

/// Fenix credential block, including the provider-side refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FenixAuth {
    pub id: String,
    pub token: String,
    pub refresh_token: Option<String>,
    /// Declared access token lifetime in seconds
    pub ttl: Option<i64>,
    pub issued_at: DateTime<Utc>,
}

/// A credential block for exactly one provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderAuth {
    Facebook(FacebookAuth),
    Google(GoogleAuth),
    Fenix(FenixAuth),
}

impl ProviderAuth {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderAuth::Facebook(_) => Provider::Facebook,
            ProviderAuth::Google(_) => Provider::Google,
            ProviderAuth::Fenix(_) => Provider::Fenix,
        }
    }

    pub fn provider_id(&self) -> &str {
        match self {
            ProviderAuth::Facebook(a) => &a.id,
            ProviderAuth::Google(a) => &a.id,
            ProviderAuth::Fenix(a) => &a.id,
        }
    }

    /// Overlay this (fresh) block on top of an existing stored one.
    ///
    /// Fresh values win; fields the fresh block does not know about (a Google
    /// picture when the profile was not fetched, a Fenix refresh token the
    /// provider did not reissue) keep their stored value.
    pub fn overlay(self, stored: Option<&ProviderAuth>) -> ProviderAuth {
        match (self, stored) {
            (ProviderAuth::Google(mut fresh), Some(ProviderAuth::Google(old))) => {
                if fresh.img.is_none() {
                    fresh.img = old.img.clone();
                }
                ProviderAuth::Google(fresh)
            }
            (ProviderAuth::Fenix(mut fresh), Some(ProviderAuth::Fenix(old))) => {
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = old.refresh_token.clone();
                }
                if fresh.ttl.is_none() {
                    fresh.ttl = old.ttl;
                }
                ProviderAuth::Fenix(fresh)
            }
            (fresh, _) => fresh,
        }
    }
}

/// One active session: a signed access token and its companion refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub refresh_token: String,
    /// Session token lifetime in seconds
    pub ttl: i64,
    pub issued_at: DateTime<Utc>,
}

/// User profile stored in the user collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque unique id, immutable once assigned
    pub id: String,
    /// Unique when present
    pub mail: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    pub facebook: Option<FacebookAuth>,
    pub google: Option<GoogleAuth>,
    pub fenix: Option<FenixAuth>,
    /// Active sessions, oldest first
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl User {
    /// The credential block stored for `provider`, if linked.
    pub fn auth_for(&self, provider: Provider) -> Option<ProviderAuth> {
        match provider {
            Provider::Facebook => self.facebook.clone().map(ProviderAuth::Facebook),
            Provider::Google => self.google.clone().map(ProviderAuth::Google),
            Provider::Fenix => self.fenix.clone().map(ProviderAuth::Fenix),
        }
    }

    /// Provider id linked on this user for `provider`.
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Facebook => self.facebook.as_ref().map(|a| a.id.as_str()),
            Provider::Google => self.google.as_ref().map(|a| a.id.as_str()),
            Provider::Fenix => self.fenix.as_ref().map(|a| a.id.as_str()),
        }
    }

    /// Store a credential block, replacing whatever was there for that provider.
    pub fn set_auth(&mut self, auth: ProviderAuth) {
        match auth {
            ProviderAuth::Facebook(a) => self.facebook = Some(a),
            ProviderAuth::Google(a) => self.google = Some(a),
            ProviderAuth::Fenix(a) => self.fenix = Some(a),
        }
    }

    /// True if `mail` is set to a non-empty address.
    pub fn has_mail(&self) -> bool {
        self.mail.as_deref().is_some_and(|m| !m.is_empty())
    }
}
