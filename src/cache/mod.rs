//! External cache instances
//!
//! The locator lists the cache instances visible to an account; this module
//! picks one and derives the backend connection the state-store component
//! points at.
//!
//! # Secret handling
//!
//! - Credentials arrive already decoded; envelope decoding belongs to the
//!   boundary.
//! - `Debug` on every credential-bearing type prints `<redacted>`.
//! - The cache password only leaves this module through
//!   [`CacheBackendConnection::password`], which the workflow writes into the
//!   component spec and nowhere else.

pub mod dcs;
mod signer;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{Error, Result};

pub use dcs::DcsLocator;

/// Status the locator reports for a serving instance
pub const STATUS_RUNNING: &str = "RUNNING";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInstance {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: String,
    /// Instance accepts connections without a password
    pub passwordless: bool,
}

impl CacheInstance {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }
}

/// Account credentials for the locator (access key / secret key)
#[derive(Clone, Default)]
pub struct LocatorCredentials {
    pub access_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

impl fmt::Debug for LocatorCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorCredentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Everything needed to connect a cache backend
#[derive(Clone, Default)]
pub struct CacheConnectParams {
    pub credentials: LocatorCredentials,
    /// Cache password, used unless the instance is passwordless
    pub password: Vec<u8>,
    /// Exact instance name; `None` takes the first listed instance
    pub instance_name: Option<String>,
}

impl fmt::Debug for CacheConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConnectParams")
            .field("credentials", &self.credentials)
            .field("password", &"<redacted>")
            .field("instance_name", &self.instance_name)
            .finish()
    }
}

/// Address and secret of the selected cache
#[derive(Clone)]
pub struct CacheBackendConnection {
    pub instance: String,
    pub address: String,
    password: String,
}

impl CacheBackendConnection {
    pub fn new(instance: impl Into<String>, address: impl Into<String>, password: String) -> Self {
        Self {
            instance: instance.into(),
            address: address.into(),
            password,
        }
    }

    /// Empty when the instance is passwordless.
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for CacheBackendConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBackendConnection")
            .field("instance", &self.instance)
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Catalogue of cache instances owned by an account
#[async_trait]
pub trait CacheLocator: Send + Sync {
    /// All instances, in the locator's order. An empty list is not an error.
    async fn list_instances(&self, credentials: &LocatorCredentials) -> Result<Vec<CacheInstance>>;
}

/// Pick the instance to connect.
///
/// Without a target the first instance wins whatever its status. With a
/// target the name must match exactly and the instance must be running.
pub fn select_instance<'a>(
    instances: &'a [CacheInstance],
    target: Option<&str>,
) -> Result<&'a CacheInstance> {
    match target.filter(|t| !t.is_empty()) {
        None => instances.first().ok_or_else(|| {
            Error::CacheNotFound("no instances listed for this account".to_string())
        }),
        Some(target) => {
            let instance = instances
                .iter()
                .find(|i| i.name == target)
                .ok_or_else(|| Error::CacheNotFound(target.to_string()))?;
            if !instance.is_running() {
                return Err(Error::CacheNotRunning {
                    name: instance.name.clone(),
                    status: instance.status.clone(),
                });
            }
            Ok(instance)
        }
    }
}

/// Locate the cache and derive its connection.
#[instrument(skip(locator, params), fields(target = ?params.instance_name))]
pub async fn locate(
    locator: &dyn CacheLocator,
    params: &CacheConnectParams,
) -> Result<CacheBackendConnection> {
    let instances = locator.list_instances(&params.credentials).await?;
    let instance = select_instance(&instances, params.instance_name.as_deref())?;

    let password = if instance.passwordless {
        String::new()
    } else {
        String::from_utf8(params.password.clone())
            .map_err(|_| Error::InvalidCredential("credential"))?
    };

    info!(
        instance = %instance.name,
        address = %instance.address(),
        passwordless = instance.passwordless,
        "Located cache instance"
    );
    Ok(CacheBackendConnection::new(
        &instance.name,
        instance.address(),
        password,
    ))
}
