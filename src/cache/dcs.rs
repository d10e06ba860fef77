//! Distributed Cache Service (DCS) instance catalogue

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::signer::{Signer, DATE_HEADER};
use super::{CacheInstance, CacheLocator, LocatorCredentials};
use crate::config::LocatorConfig;
use crate::error::{Error, Result};

#[derive(Debug, Default, Deserialize)]
struct ListInstancesResponse {
    #[serde(default)]
    instance_num: Option<u32>,
    #[serde(default)]
    instances: Vec<DcsInstance>,
}

#[derive(Debug, Deserialize)]
struct DcsInstance {
    name: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    status: String,
    /// The API reports this as the string `"true"` or `"false"`
    #[serde(default)]
    no_password_access: String,
}

impl From<DcsInstance> for CacheInstance {
    fn from(i: DcsInstance) -> Self {
        CacheInstance {
            name: i.name,
            host: i.ip,
            port: i.port,
            status: i.status,
            passwordless: i.no_password_access.eq_ignore_ascii_case("true"),
        }
    }
}

/// [`CacheLocator`] backed by the DCS v2 REST API
#[derive(Clone)]
pub struct DcsLocator {
    client: Client,
    endpoint: String,
    project_id: String,
}

impl DcsLocator {
    pub fn new(config: &LocatorConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::LocatorError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
        })
    }

    fn instances_url(&self) -> Result<Url> {
        let raw = format!("{}/v2/{}/instances", self.endpoint, self.project_id);
        Url::parse(&raw).map_err(|e| Error::ConfigError(format!("invalid DCS endpoint {}: {}", raw, e)))
    }
}

#[async_trait]
impl CacheLocator for DcsLocator {
    #[instrument(skip(self, credentials), fields(endpoint = %self.endpoint))]
    async fn list_instances(&self, credentials: &LocatorCredentials) -> Result<Vec<CacheInstance>> {
        let access_key = std::str::from_utf8(&credentials.access_key)
            .map_err(|_| Error::InvalidCredential("ak"))?;
        let url = self.instances_url()?;
        let signature =
            Signer::new(access_key, &credentials.secret_key).sign("GET", &url, b"", Utc::now())?;

        let response = self
            .client
            .get(url)
            .header(DATE_HEADER, signature.sdk_date)
            .header(reqwest::header::AUTHORIZATION, signature.authorization)
            .send()
            .await
            .map_err(|e| Error::LocatorError(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::LocatorError(format!(
                "DCS API returned {}",
                status
            )));
        }

        let body: ListInstancesResponse = response
            .json()
            .await
            .map_err(|e| Error::LocatorError(format!("unreadable DCS response: {}", e.without_url())))?;
        debug!(
            reported = ?body.instance_num,
            listed = body.instances.len(),
            "Listed DCS instances"
        );
        Ok(body.instances.into_iter().map(CacheInstance::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> LocatorCredentials {
        LocatorCredentials {
            access_key: b"AKID".to_vec(),
            secret_key: b"SECRET".to_vec(),
        }
    }

    fn locator(server: &MockServer) -> DcsLocator {
        let config = LocatorConfig {
            endpoint: server.uri(),
            project_id: "proj-1".to_string(),
        };
        DcsLocator::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_lists_instances_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/proj-1/instances"))
            .and(header_exists("authorization"))
            .and(header_exists("x-sdk-date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instance_num": 2,
                "instances": [
                    {"name": "a", "ip": "10.0.0.1", "port": 6379, "status": "RUNNING", "no_password_access": "false"},
                    {"name": "b", "ip": "10.0.0.2", "port": 6380, "status": "STOPPED", "no_password_access": "true"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let instances = locator(&server).list_instances(&credentials()).await.unwrap();

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].name, "a");
        assert_eq!(instances[0].address(), "10.0.0.1:6379");
        assert!(!instances[0].passwordless);
        assert_eq!(instances[1].status, "STOPPED");
        assert!(instances[1].passwordless);
    }

    #[tokio::test]
    async fn test_missing_instances_is_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instance_num": 0})))
            .mount(&server)
            .await;

        let instances = locator(&server).list_instances(&credentials()).await.unwrap();
        assert!(instances.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_locator_error_without_secrets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("APIGW.0301 SECRET mismatch"))
            .mount(&server)
            .await;

        let err = locator(&server).list_instances(&credentials()).await.unwrap_err();
        let rendered = err.to_string();
        assert!(matches!(err, Error::LocatorError(_)));
        assert!(rendered.contains("401"));
        assert!(!rendered.contains("SECRET"));
        assert!(!rendered.contains("AKID"));
    }

    #[tokio::test]
    async fn test_authorization_names_access_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instances": []})))
            .mount(&server)
            .await;

        locator(&server).list_instances(&credentials()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(auth.starts_with("SDK-HMAC-SHA256 Access=AKID, SignedHeaders=host;x-sdk-date, Signature="));
    }
}
