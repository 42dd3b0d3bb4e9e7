// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - authentication and account reconciliation.

pub mod auth;
pub mod merge;
pub mod providers;
pub mod resolver;
pub mod session;
pub mod token;

pub use auth::{AuthOutcome, AuthService, Stores};
pub use merge::{consolidate, AccountMerger, MergeDirective};
pub use providers::{
    FacebookProvider, FenixProvider, GoogleProvider, IdentityProvider, ProviderCredential,
    ProviderGrant, ProviderProfile,
};
pub use resolver::{IdentityResolver, Resolution};
pub use session::SessionIssuer;
pub use token::{Claims, JwtSigner, TokenKind, TokenSigner};
