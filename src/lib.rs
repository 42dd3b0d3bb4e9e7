// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Federated-Auth: sign in with Facebook, Google or Fenix
//!
//! This crate provides the authentication core: provider credential
//! verification, identity resolution, account merging and session issuance.
//! Storage and HTTP transport are supplied by the embedding service.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use error::{AppError, Result};
pub use services::{AuthOutcome, AuthService, Stores};
