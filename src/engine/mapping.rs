//! Kind → resource mapping backed by a TTL discovery cache
//!
//! Discovery documents are cached per cluster host. A lookup that misses
//! against a cached document triggers exactly one refetch before failing, and
//! callers that see a 404 from a dependent request can [`invalidate`] the
//! entry to force the same refresh.
//!
//! [`invalidate`]: MappingResolver::invalidate

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::cluster::{with_deadline, ResourceDescriptor};
use crate::error::{Error, Result};

/// One resource type as reported by discovery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredResource {
    pub descriptor: ResourceDescriptor,
    /// Whether `descriptor.version` is the group's preferred version
    pub preferred: bool,
}

/// Flattened discovery result: every served (group, version, kind)
#[derive(Clone, Debug, Default)]
pub struct DiscoveryDocument {
    resources: Vec<DiscoveredResource>,
}

impl DiscoveryDocument {
    pub fn new(resources: Vec<DiscoveredResource>) -> Self {
        Self { resources }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Exact (group, version, kind) lookup.
    pub fn find(&self, group: &str, version: &str, kind: &str) -> Option<&ResourceDescriptor> {
        self.resources
            .iter()
            .map(|r| &r.descriptor)
            .find(|d| d.group == group && d.version == version && d.kind == kind)
    }

    /// Bare kind lookup, preferring each group's preferred version.
    ///
    /// Matches the kind case-insensitively, or the plural resource name, so
    /// `Service`, `service` and `services` all resolve.
    pub fn find_kind(&self, kind: &str) -> Option<&ResourceDescriptor> {
        let matches = |r: &&DiscoveredResource| {
            r.descriptor.kind.eq_ignore_ascii_case(kind)
                || r.descriptor.resource_plural.eq_ignore_ascii_case(kind)
        };
        self.resources
            .iter()
            .filter(matches)
            .find(|r| r.preferred)
            .or_else(|| self.resources.iter().find(matches))
            .map(|r| &r.descriptor)
    }
}

/// Where discovery documents come from
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Cluster host the documents describe; keys the cache.
    fn host(&self) -> &str;

    async fn fetch(&self) -> Result<DiscoveryDocument>;
}

/// Live discovery through the kube client
pub struct KubeDiscovery {
    client: Client,
    host: String,
    timeout: Duration,
}

impl KubeDiscovery {
    pub fn new(client: Client, host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            host: host.into(),
            timeout,
        }
    }
}

impl KubeDiscovery {
    async fn resources_of(&self, group_version: &str) -> Result<APIResourceList> {
        let label = format!("discovery of {}", group_version);
        if group_version.contains('/') {
            with_deadline(label, self.timeout, self.client.list_api_group_resources(group_version))
                .await
        } else {
            with_deadline(label, self.timeout, self.client.list_core_api_resources(group_version))
                .await
        }
    }
}

#[async_trait]
impl DiscoverySource for KubeDiscovery {
    fn host(&self) -> &str {
        &self.host
    }

    /// Walk every served group version.
    ///
    /// The core group must answer. A failing named group version (typically an
    /// aggregated API whose backing service is down) is logged and left out of
    /// the document.
    #[instrument(skip(self), fields(host = %self.host))]
    async fn fetch(&self) -> Result<DiscoveryDocument> {
        let core = with_deadline(
            "core api discovery".to_string(),
            self.timeout,
            self.client.list_core_api_versions(),
        )
        .await?;
        let groups = with_deadline(
            "api group discovery".to_string(),
            self.timeout,
            self.client.list_api_groups(),
        )
        .await?;

        let mut resources = Vec::new();
        for (i, version) in core.versions.iter().enumerate() {
            let list = self.resources_of(version).await?;
            push_resources(&mut resources, "", version, &list, i == 0);
        }

        let mut skipped = 0;
        for group in &groups.groups {
            let preferred = group
                .preferred_version
                .as_ref()
                .or_else(|| group.versions.first())
                .map(|gv| gv.version.as_str());
            for gv in &group.versions {
                match self.resources_of(&gv.group_version).await {
                    Ok(list) => push_resources(
                        &mut resources,
                        &group.name,
                        &gv.version,
                        &list,
                        preferred == Some(gv.version.as_str()),
                    ),
                    Err(e) => {
                        warn!(
                            group_version = %gv.group_version,
                            error = %e,
                            "Skipping unavailable API group version"
                        );
                        skipped += 1;
                    }
                }
            }
        }

        info!(
            "Discovered {} resource types ({} group versions skipped)",
            resources.len(),
            skipped
        );
        Ok(DiscoveryDocument::new(resources))
    }
}

/// Top-level resources of one group version; subresources such as
/// `deployments/scale` are dropped.
fn push_resources(
    out: &mut Vec<DiscoveredResource>,
    group: &str,
    version: &str,
    list: &APIResourceList,
    preferred: bool,
) {
    for resource in list.resources.iter().filter(|r| !r.name.contains('/')) {
        out.push(DiscoveredResource {
            descriptor: ResourceDescriptor {
                group: group.to_string(),
                version: version.to_string(),
                kind: resource.kind.clone(),
                resource_plural: resource.name.clone(),
                namespaced: resource.namespaced,
            },
            preferred,
        });
    }
}

struct CachedDocument {
    document: Arc<DiscoveryDocument>,
    fetched_at: Instant,
}

/// Discovery documents keyed by sanitized host, expiring after a TTL.
///
/// Shared by concurrent requests; two requests populating the same key race
/// harmlessly and the last write wins.
pub struct MappingCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedDocument>>,
}

impl MappingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh document for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<Arc<DiscoveryDocument>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.document.clone())
    }

    pub async fn insert(&self, key: &str, document: Arc<DiscoveryDocument>) {
        self.entries.write().await.insert(
            key.to_string(),
            CachedDocument {
                document,
                fetched_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// Turn a cluster URL into a cache key.
///
/// Strips one `https://` and one `http://`, then replaces every character
/// outside `[A-Za-z0-9_./]` with `_`. Collisions are possible but unlikely.
pub fn cache_key(host: &str) -> String {
    let schemeless = host.replacen("https://", "", 1).replacen("http://", "", 1);
    schemeless
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `apps/v1` -> (`apps`, `v1`); `v1` -> (``, `v1`)
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

pub struct MappingResolver {
    source: Arc<dyn DiscoverySource>,
    cache: Arc<MappingCache>,
    key: String,
}

impl MappingResolver {
    pub fn new(source: Arc<dyn DiscoverySource>, cache: Arc<MappingCache>) -> Self {
        let key = cache_key(source.host());
        Self { source, cache, key }
    }

    pub fn cache_key(&self) -> &str {
        &self.key
    }

    /// Resolve `kind` at `api_version` (`group/version` or core `version`).
    pub async fn resolve(&self, kind: &str, api_version: &str) -> Result<ResourceDescriptor> {
        let (group, version) = split_api_version(api_version);
        self.lookup(kind, api_version, |doc| doc.find(group, version, kind).cloned())
            .await
    }

    /// Resolve a bare kind to its preferred version.
    pub async fn resolve_kind(&self, kind: &str) -> Result<ResourceDescriptor> {
        self.lookup(kind, "", |doc| doc.find_kind(kind).cloned()).await
    }

    /// Drop the cached document so the next lookup refetches.
    pub async fn invalidate(&self) {
        info!(key = %self.key, "Invalidating discovery cache");
        #[cfg(feature = "metrics")]
        crate::metrics::record_discovery("refresh");
        self.cache.invalidate(&self.key).await;
    }

    async fn lookup<F>(&self, kind: &str, version_hint: &str, find: F) -> Result<ResourceDescriptor>
    where
        F: Fn(&DiscoveryDocument) -> Option<ResourceDescriptor>,
    {
        let (document, fresh) = self.document().await?;
        if let Some(found) = find(&document) {
            return Ok(found);
        }
        if !fresh {
            debug!(kind, version_hint, "Mapping miss on cached discovery, refreshing");
            self.invalidate().await;
            let (document, _) = self.document().await?;
            if let Some(found) = find(&document) {
                return Ok(found);
            }
        }
        Err(Error::MappingNotFound {
            kind: kind.to_string(),
            version: version_hint.to_string(),
        })
    }

    /// Cached document, fetching when absent or expired.
    ///
    /// The flag is true when the document was fetched by this call.
    async fn document(&self) -> Result<(Arc<DiscoveryDocument>, bool)> {
        if let Some(document) = self.cache.get(&self.key).await {
            #[cfg(feature = "metrics")]
            crate::metrics::record_discovery("hit");
            return Ok((document, false));
        }
        #[cfg(feature = "metrics")]
        crate::metrics::record_discovery("miss");
        let document = Arc::new(self.source.fetch().await?);
        self.cache.insert(&self.key, document.clone()).await;
        Ok((document, true))
    }
}
