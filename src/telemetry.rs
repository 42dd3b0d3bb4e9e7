// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Structured JSON logging.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured JSON logging (GCP-compliant).
///
/// `RUST_LOG` is honoured on top of the defaults. Fails if a global
/// subscriber is already installed.
pub fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("federated_auth=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        // Another test may already have installed a subscriber.
        let _ = init_logging();
        assert!(init_logging().is_err());
    }
}
