//! Deletion by kind and name

use std::sync::Arc;

use tracing::{info, instrument};

use super::apply::DEFAULT_NAMESPACE;
use super::cluster::ClusterApi;
use super::mapping::MappingResolver;
use crate::error::{Error, Result};

/// Deletes objects addressed by bare kind, name and namespace.
///
/// Uses the server's default propagation policy. A missing object is reported
/// as [`Error::NotFoundOnDelete`]; whether that aborts anything is the
/// caller's decision.
pub struct Deleter {
    cluster: Arc<dyn ClusterApi>,
    resolver: Arc<MappingResolver>,
}

impl Deleter {
    pub fn new(cluster: Arc<dyn ClusterApi>, resolver: Arc<MappingResolver>) -> Self {
        Self { cluster, resolver }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, kind: &str, name: &str, namespace: &str) -> Result<()> {
        let result = self.delete_once(kind, name, namespace).await;

        #[cfg(feature = "metrics")]
        crate::metrics::record_delete(
            kind,
            match &result {
                Ok(()) => "deleted",
                Err(Error::NotFoundOnDelete { .. }) => "not_found",
                Err(_) => "error",
            },
        );

        result
    }

    async fn delete_once(&self, kind: &str, name: &str, namespace: &str) -> Result<()> {
        let resource = self.resolver.resolve_kind(kind).await?;
        let ns = resource.namespaced.then(|| {
            if namespace.is_empty() {
                DEFAULT_NAMESPACE
            } else {
                namespace
            }
        });

        match self.cluster.delete(&resource, ns, name).await {
            Ok(()) => {
                info!("Deleted {} {}", resource.resource_plural, name);
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(Error::NotFoundOnDelete {
                kind: resource.kind.clone(),
                namespace: ns.unwrap_or_default().to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}
