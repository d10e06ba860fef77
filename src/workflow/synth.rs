//! Generated manifests: the state-store component and the app Service

use serde_json::{json, Value};

use crate::cache::CacheBackendConnection;
use crate::error::{Error, Result};
use crate::manifest::{required, required_str, ManifestDocument};

/// Name of the generated Dapr component
pub const STATE_STORE_NAME: &str = "statestore";

pub const COMPONENT_KIND: &str = "Component";

/// Port the synthesized Service listens on
pub const SERVICE_PORT: i32 = 80;

/// Dapr state-store component pointing at the located cache.
///
/// `redisPassword` is empty exactly when the cache is passwordless.
pub fn build_state_store(connection: &CacheBackendConnection, backend: &str) -> Result<ManifestDocument> {
    ManifestDocument::from_value(json!({
        "apiVersion": "dapr.io/v1alpha1",
        "kind": COMPONENT_KIND,
        "metadata": {"name": STATE_STORE_NAME},
        "spec": {
            "type": format!("state.{}", backend),
            "version": "v1",
            "metadata": [
                {"name": "redisHost", "value": connection.address},
                {"name": "redisPassword", "value": connection.password()}
            ]
        }
    }))
}

/// What the Service needs to know about a deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentFacts {
    /// `metadata.labels.app`
    pub app: String,
    /// First port of the first container
    pub container_port: i32,
}

pub fn extract_deployment_facts(deployment: &ManifestDocument) -> Result<DeploymentFacts> {
    let value = deployment.as_value();
    let app = required_str(value, "/metadata/labels/app")?.to_string();

    let pointer = "/spec/template/spec/containers/0/ports/0/containerPort";
    let container_port = required(value, pointer)?
        .as_i64()
        .and_then(|port| i32::try_from(port).ok())
        .filter(|port| (1..=65535).contains(port))
        .ok_or_else(|| {
            Error::MalformedManifest(
                "spec.template.spec.containers[0].ports[0].containerPort must be a port number"
                    .to_string(),
            )
        })?;

    Ok(DeploymentFacts {
        app,
        container_port,
    })
}

/// LoadBalancer Service in front of `deployment`, sharing its metadata.
pub fn build_service(deployment: &ManifestDocument, facts: &DeploymentFacts) -> Result<ManifestDocument> {
    let metadata = deployment
        .metadata()
        .cloned()
        .map(Value::Object)
        .unwrap_or_else(|| json!({}));

    ManifestDocument::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": metadata,
        "spec": {
            "selector": {"app": facts.app},
            "ports": [{
                "protocol": "TCP",
                "port": SERVICE_PORT,
                "targetPort": facts.container_port
            }],
            "type": "LoadBalancer"
        }
    }))
}
