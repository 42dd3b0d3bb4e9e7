// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod file;
pub mod membership;
pub mod user;

pub use file::FileRecord;
pub use membership::MembershipRecord;
pub use user::{FacebookAuth, FenixAuth, GoogleAuth, Provider, ProviderAuth, Session, User};
