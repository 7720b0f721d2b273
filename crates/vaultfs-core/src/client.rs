//! Blocking HTTP client for the HashiCorp Vault API.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::config::StoreConfig;
use crate::entry::{CollectionListing, StoreEntry};
use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::store::SecretStore;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Envelope shared by every Vault read response.
#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct KeyList {
    #[serde(default)]
    keys: Vec<Value>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// [`SecretStore`] backed by a Vault server.
///
/// Every call is a fresh HTTP request; nothing is cached. The underlying
/// connection pool is shared, so one client can serve many filesystem
/// threads at once.
pub struct VaultClient {
    http: Client,
    base: Url,
    token: SecretString,
}

impl VaultClient {
    /// Builds a client from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid URL or the HTTP
    /// client cannot be constructed (e.g. TLS backend initialization).
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let base = Url::parse(&config.address).map_err(|source| StoreError::InvalidAddress {
            address: config.address.clone(),
            source,
        })?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidAddress {
                address: config.address,
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            });
        }

        if config.insecure {
            warn!(address = %base, "TLS certificate verification disabled");
        }

        let http = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(config.timeout)
            .user_agent(concat!("vaultfs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::ClientBuild)?;

        debug!(address = %base, timeout = ?config.timeout, "Vault client ready");

        Ok(Self {
            http,
            base,
            token: config.token,
        })
    }

    /// Base URL requests are resolved against.
    pub fn address(&self) -> &Url {
        &self.base
    }

    /// URL of a logical path. Each segment is percent-encoded on its own,
    /// so `#`, `?` and `%` in key names stay part of the path.
    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        let cleaned = path::clean(path);
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::InvalidAddress {
                address: self.base.to_string(),
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            })?
            .pop_if_empty()
            .push("v1")
            .extend(cleaned.split(path::SEPARATOR).filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn get(&self, path: &str, list: bool) -> StoreResult<Response> {
        let mut url = self.endpoint(path)?;
        if list {
            url.query_pairs_mut().append_pair("list", "true");
        }
        trace!(%url, "GET");

        self.http
            .get(url)
            .header(TOKEN_HEADER, self.token.expose_secret())
            .send()
            .map_err(|source| StoreError::Transport {
                path: path.to_string(),
                source,
            })
    }

    /// Classifies a response: `Ok(None)` for absent, the decoded `data`
    /// payload for success, an error otherwise.
    fn decode<T: DeserializeOwned>(path: &str, response: Response) -> StoreResult<Option<Option<T>>> {
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            s if s.is_success() => {
                let envelope: Envelope<T> =
                    response.json().map_err(|e| StoreError::Malformed {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(envelope.data))
            }
            s => {
                let body: ErrorBody = response.json().unwrap_or_default();
                Err(StoreError::Http {
                    path: path.to_string(),
                    status: s.as_u16(),
                    errors: body.errors,
                })
            }
        }
    }
}

impl SecretStore for VaultClient {
    #[instrument(level = "debug", skip(self))]
    fn read(&self, path: &str) -> StoreResult<Option<StoreEntry>> {
        let response = self.get(path, false)?;
        let data = Self::decode::<BTreeMap<String, Value>>(path, response)?;
        Ok(data.map(|d| StoreEntry::new(d.unwrap_or_default())))
    }

    #[instrument(level = "debug", skip(self))]
    fn list(&self, path: &str) -> StoreResult<Option<CollectionListing>> {
        let response = self.get(path, true)?;
        let Some(data) = Self::decode::<KeyList>(path, response)? else {
            return Ok(None);
        };
        let keys = data.map(|d| d.keys).unwrap_or_default();

        let mut names = Vec::with_capacity(keys.len());
        for key in keys {
            match key {
                Value::String(name) => names.push(name),
                other => {
                    return Err(StoreError::Malformed {
                        path: path.to_string(),
                        reason: format!("listing key is not a string: {other}"),
                    });
                }
            }
        }
        Ok(Some(CollectionListing::from_raw(names)))
    }
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}
