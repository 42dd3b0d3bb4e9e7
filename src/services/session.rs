// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session issuance and rotation.

use crate::db::{UserChanges, UserFilter, UserStore};
use crate::error::{AppError, Result};
use crate::models::Session;
use crate::services::token::{TokenKind, TokenSigner};
use std::sync::Arc;

/// Issues, rotates and revokes sessions on user records.
#[derive(Clone)]
pub struct SessionIssuer {
    users: Arc<dyn UserStore>,
    signer: Arc<dyn TokenSigner>,
    max_sessions: usize,
}

impl SessionIssuer {
    pub fn new(users: Arc<dyn UserStore>, signer: Arc<dyn TokenSigner>, max_sessions: usize) -> Self {
        Self {
            users,
            signer,
            max_sessions,
        }
    }

    /// Mint a session for `user_id` and persist it together with `changes`
    /// in a single write.
    pub async fn authenticate(&self, user_id: &str, changes: UserChanges) -> Result<Session> {
        let session = self.signer.sign(user_id)?;

        let changes = UserChanges {
            push_session: Some(session.clone()),
            session_limit: Some(self.max_sessions),
            ..changes
        };
        let summary = changes.to_string();

        self.users
            .update(&UserFilter::Id(user_id.to_string()), changes)
            .await
            .map_err(|e| {
                tracing::error!(user_id, changes = %summary, error = %e, "Error updating user on login");
                match e {
                    AppError::NotFound(msg) => AppError::Database(format!(
                        "user vanished during login ({msg}); changes={summary}"
                    )),
                    other => other,
                }
            })?;

        tracing::info!(user_id, "User logged in");
        Ok(session)
    }

    /// Rotate the exact `(token, refresh_token)` pair into a new session.
    pub async fn refresh(&self, user_id: &str, token: &str, refresh_token: &str) -> Result<Session> {
        self.signer
            .verify(user_id, refresh_token, TokenKind::Refresh)?;

        let session = self.signer.sign(user_id)?;
        let rotated = self
            .users
            .rotate_session(user_id, token, refresh_token, session.clone())
            .await?;

        if rotated.is_none() {
            tracing::warn!(user_id, "Refresh with unknown or already rotated session");
            return Err(AppError::Unauthorized(
                "session is not active".to_string(),
            ));
        }

        tracing::debug!(user_id, "Session rotated");
        Ok(session)
    }

    /// Drop the session carrying `token`. Expired tokens can still be revoked.
    pub async fn revoke(&self, user_id: &str, token: &str) -> Result<()> {
        if !self.users.remove_session(user_id, token).await? {
            return Err(AppError::Unauthorized("session is not active".to_string()));
        }

        tracing::info!(user_id, "User logged out");
        Ok(())
    }
}
