//! Cluster API seam
//!
//! The apply and delete engines talk to the API server only through
//! [`ClusterApi`], addressing objects by [`ResourceDescriptor`] so that any
//! kind the server can discover is reachable without generated types.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::patch::PatchDocument;

/// Physical location of a resource type on the API server
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name used in URLs, e.g. `deployments`
    pub resource_plural: String,
    pub namespaced: bool,
}

impl ResourceDescriptor {
    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.resource_plural.clone(),
        }
    }
}

/// Get/create/patch/delete against any discovered resource type.
///
/// `namespace` is `None` for cluster-scoped resources. Implementations return
/// `Error::ServerRejected` with the server's status for API errors; `get`
/// reports a missing object as `Ok(None)`.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>>;

    async fn create(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value>;

    async fn patch(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
        patch: &PatchDocument,
    ) -> Result<Value>;

    async fn delete(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()>;
}

/// [`ClusterApi`] backed by a kube-rs client and `DynamicObject`.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    timeout: Duration,
}

impl KubeCluster {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api(&self, resource: &ResourceDescriptor, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = resource.api_resource();
        match namespace {
            Some(ns) if resource.namespaced => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }
}

/// Run a kube call under `timeout`, mapping expiry to `TransportTimeout`.
pub(crate) async fn with_deadline<T, F>(operation: String, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = kube::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(Error::from_kube),
        Err(_) => Err(Error::TransportTimeout {
            operation,
            after: timeout,
        }),
    }
}

fn to_value(obj: DynamicObject) -> Result<Value> {
    Ok(serde_json::to_value(obj)?)
}

#[async_trait]
impl ClusterApi for KubeCluster {
    #[instrument(skip(self), fields(resource = %resource.resource_plural))]
    async fn get(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>> {
        let api = self.api(resource, namespace);
        let op = format!("get {}/{}", resource.resource_plural, name);
        match with_deadline(op, self.timeout, api.get(name)).await {
            Ok(obj) => Ok(Some(to_value(obj)?)),
            Err(e) if e.is_not_found() => {
                debug!("{} {} not found", resource.kind, name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, object), fields(resource = %resource.resource_plural))]
    async fn create(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value> {
        let api = self.api(resource, namespace);
        let obj: DynamicObject = serde_json::from_value(object.clone())?;
        let op = format!("create {}", resource.resource_plural);
        let created = with_deadline(op, self.timeout, api.create(&PostParams::default(), &obj)).await?;
        to_value(created)
    }

    #[instrument(skip(self, patch), fields(resource = %resource.resource_plural))]
    async fn patch(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
        patch: &PatchDocument,
    ) -> Result<Value> {
        let api = self.api(resource, namespace);
        let kube_patch = match patch {
            PatchDocument::Strategic(body) => Patch::Strategic(body),
            PatchDocument::Merge(body) => Patch::Merge(body),
        };
        let op = format!("patch {}/{}", resource.resource_plural, name);
        let patched =
            with_deadline(op, self.timeout, api.patch(name, &PatchParams::default(), &kube_patch))
                .await?;
        to_value(patched)
    }

    #[instrument(skip(self), fields(resource = %resource.resource_plural))]
    async fn delete(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let api = self.api(resource, namespace);
        let op = format!("delete {}/{}", resource.resource_plural, name);
        with_deadline(op, self.timeout, api.delete(name, &DeleteParams::default())).await?;
        Ok(())
    }
}

/// Build a kube client from an optional kubeconfig path.
///
/// Returns the client together with the cluster URL it talks to, which keys
/// the discovery cache.
pub async fn create_client(
    kubeconfig: Option<&Path>,
    read_timeout: Duration,
) -> Result<(Client, String)> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::ConfigError(format!("failed to read kubeconfig: {}", e)))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::ConfigError(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::ConfigError(format!("failed to infer config: {}", e)))?,
    };
    config.read_timeout = Some(read_timeout);
    let host = config.cluster_url.to_string();
    let client = Client::try_from(config)
        .map_err(|e| Error::ConfigError(format!("failed to create client: {}", e)))?;
    Ok((client, host))
}
