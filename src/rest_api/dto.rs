//! Request and response types for the REST API

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{CacheConnectParams, LocatorCredentials};
use crate::error::{Error, Result};

/// Base64-encoded cache credentials
#[derive(Clone, Deserialize)]
pub struct DcsConnectRequest {
    #[serde(alias = "AK")]
    pub ak: String,
    #[serde(alias = "SK")]
    pub sk: String,
    #[serde(alias = "Credential")]
    pub credential: String,
    /// Instance to connect; empty or absent picks the first listed
    #[serde(default, rename = "dcsName", alias = "DCSName")]
    pub dcs_name: String,
}

impl fmt::Debug for DcsConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DcsConnectRequest")
            .field("ak", &"<redacted>")
            .field("sk", &"<redacted>")
            .field("credential", &"<redacted>")
            .field("dcs_name", &self.dcs_name)
            .finish()
    }
}

impl DcsConnectRequest {
    /// Decode the envelopes. Errors name the field, never its content.
    pub fn decode(&self) -> Result<CacheConnectParams> {
        Ok(CacheConnectParams {
            credentials: LocatorCredentials {
                access_key: decode_field("ak", &self.ak)?,
                secret_key: decode_field("sk", &self.sk)?,
            },
            password: decode_field("credential", &self.credential)?,
            instance_name: Some(self.dcs_name.clone()).filter(|n| !n.is_empty()),
        })
    }
}

fn decode_field(field: &'static str, encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|_| Error::InvalidCredential(field))
}

#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
    /// Deployment manifest as JSON
    pub deployment: Value,
    pub dcs: DcsConnectRequest,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAppRequest {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}
