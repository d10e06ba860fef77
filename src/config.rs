//! Runtime configuration shared by the server and the one-shot CLI

use std::path::PathBuf;
use std::time::Duration;

/// Deadline applied to every outbound cluster call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// How long a discovery document may be served from cache
pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_CACHE_BACKEND: &str = "redis";
pub const DEFAULT_DCS_REGION: &str = "cn-north-4";

/// What a delete step does when the target object is already gone
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Surface `NotFoundOnDelete` and abort the workflow
    #[default]
    Strict,
    /// Treat a missing object as already deleted and mark the step skipped
    IgnoreNotFound,
}

/// Location of the DCS instance catalogue
#[derive(Clone, Debug)]
pub struct LocatorConfig {
    /// Base URL, e.g. `https://dcs.cn-north-4.myhuaweicloud.com`
    pub endpoint: String,
    pub project_id: String,
}

impl LocatorConfig {
    /// Public endpoint for a region when none is configured explicitly.
    pub fn regional_endpoint(region: &str) -> String {
        format!("https://dcs.{region}.myhuaweicloud.com")
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::regional_endpoint(DEFAULT_DCS_REGION),
            project_id: String::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AutomationConfig {
    /// Explicit kubeconfig; inferred (in-cluster or `~/.kube/config`) when unset
    pub kubeconfig: Option<PathBuf>,
    pub request_timeout: Duration,
    pub discovery_ttl: Duration,
    pub delete_policy: DeletePolicy,
    /// Suffix of the generated component's `spec.type` (`state.<backend>`)
    pub cache_backend: String,
    pub locator: LocatorConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            discovery_ttl: DEFAULT_DISCOVERY_TTL,
            delete_policy: DeletePolicy::Strict,
            cache_backend: DEFAULT_CACHE_BACKEND.to_string(),
            locator: LocatorConfig::default(),
        }
    }
}
