//! Create-or-patch with `kubectl apply` semantics

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::cluster::{ClusterApi, ResourceDescriptor};
use super::mapping::MappingResolver;
use crate::error::{Error, Result};
use crate::manifest::ManifestDocument;
use crate::patch::{modified_configuration, original_configuration, strategy_for, three_way_patch};

/// Namespace used for namespaced objects that name none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Where an applied object ended up, as confirmed by the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResourceMetadata {
    pub name: String,
    /// Empty for cluster-scoped objects
    pub namespace: String,
    pub api_version: String,
    /// Plural resource name
    pub resource: String,
    pub kind: String,
}

impl AppliedResourceMetadata {
    fn from_object(resource: &ResourceDescriptor, object: &Value, fallback_name: &str) -> Self {
        let metadata = object.get("metadata");
        let field = |key: &str| {
            metadata
                .and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            name: field("name").unwrap_or_else(|| fallback_name.to_string()),
            namespace: field("namespace").unwrap_or_default(),
            api_version: resource.api_version(),
            resource: resource.resource_plural.clone(),
            kind: resource.kind.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ApplyOutcome {
    Created,
    Patched,
    Unchanged,
}

impl ApplyOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Patched => "patched",
            ApplyOutcome::Unchanged => "unchanged",
        }
    }
}

/// Converges single manifests against the cluster.
pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
    resolver: Arc<MappingResolver>,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn ClusterApi>, resolver: Arc<MappingResolver>) -> Self {
        Self { cluster, resolver }
    }

    /// Create `doc` if absent, otherwise three-way patch it into place.
    ///
    /// A 404 from the server usually means the cached mapping is stale (the
    /// CRD was reinstalled under another version), so the mapping is
    /// invalidated and the apply retried once.
    #[instrument(skip(self, doc), fields(kind = %doc.kind(), name = %doc.name()))]
    pub async fn apply(
        &self,
        doc: &ManifestDocument,
        namespace_override: Option<&str>,
    ) -> Result<AppliedResourceMetadata> {
        let result = match self.apply_once(doc, namespace_override).await {
            Err(e) if e.is_not_found() => {
                warn!("Server returned not found, refreshing mapping and retrying: {}", e);
                self.resolver.invalidate().await;
                self.apply_once(doc, namespace_override).await
            }
            other => other,
        };

        #[cfg(feature = "metrics")]
        crate::metrics::record_apply(
            doc.kind(),
            match &result {
                Ok((_, outcome)) => outcome.as_str(),
                Err(_) => "error",
            },
        );

        let (applied, outcome) = result?;
        info!(
            namespace = %applied.namespace,
            outcome = outcome.as_str(),
            "Applied {}/{}",
            applied.resource,
            applied.name
        );
        Ok(applied)
    }

    async fn apply_once(
        &self,
        doc: &ManifestDocument,
        namespace_override: Option<&str>,
    ) -> Result<(AppliedResourceMetadata, ApplyOutcome)> {
        let resource = self.resolver.resolve(doc.kind(), doc.api_version()).await?;
        let namespace = effective_namespace(&resource, doc.namespace(), namespace_override);
        let name = doc.name();

        let desired = with_namespace(doc.as_value(), namespace.as_deref())?;
        let modified = modified_configuration(&desired)?;

        let ns = namespace.as_deref();
        let Some(live) = self.cluster.get(&resource, ns, name).await? else {
            let created = self.cluster.create(&resource, ns, &modified).await?;
            return Ok((
                AppliedResourceMetadata::from_object(&resource, &created, name),
                ApplyOutcome::Created,
            ));
        };

        let original = original_configuration(&live)?;
        let patch = three_way_patch(strategy_for(&resource), original.as_ref(), &modified, &live)?;
        if patch.is_empty() {
            debug!("Live object already matches, skipping patch");
            return Ok((
                AppliedResourceMetadata::from_object(&resource, &live, name),
                ApplyOutcome::Unchanged,
            ));
        }

        let patched = self.cluster.patch(&resource, ns, name, &patch).await?;
        Ok((
            AppliedResourceMetadata::from_object(&resource, &patched, name),
            ApplyOutcome::Patched,
        ))
    }
}

/// Override, then the document's own namespace, then `default`.
///
/// Cluster-scoped resources never get a namespace.
pub(crate) fn effective_namespace(
    resource: &ResourceDescriptor,
    document: Option<&str>,
    namespace_override: Option<&str>,
) -> Option<String> {
    if !resource.namespaced {
        return None;
    }
    let pick = namespace_override
        .filter(|ns| !ns.is_empty())
        .or(document)
        .unwrap_or(DEFAULT_NAMESPACE);
    Some(pick.to_string())
}

fn with_namespace(object: &Value, namespace: Option<&str>) -> Result<Value> {
    let mut object = object.clone();
    let metadata = object
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::MalformedManifest("metadata is missing".to_string()))?;
    match namespace {
        Some(ns) => {
            metadata.insert("namespace".to_string(), Value::String(ns.to_string()));
        }
        None => {
            metadata.remove("namespace");
        }
    }
    Ok(object)
}
