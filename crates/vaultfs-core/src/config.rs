//! Store client configuration.

use std::time::Duration;

use secrecy::SecretString;

/// Address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "https://localhost:8200";

/// Connection settings for a [`VaultClient`](crate::VaultClient).
///
/// The token is held as a [`SecretString`] so it is zeroized on drop and
/// redacted from `Debug` output.
#[derive(Debug)]
pub struct StoreConfig {
    /// Base URL of the store, e.g. `https://vault.example.com:8200`.
    pub address: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Bearer token passed through on every request.
    pub token: SecretString,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
}

impl StoreConfig {
    /// Creates a configuration with TLS verification on and no timeout.
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            insecure: false,
            token: SecretString::from(token.into()),
            timeout: None,
        }
    }

    /// Skip TLS certificate verification.
    #[must_use]
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set a per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
