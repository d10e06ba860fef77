//! Apply/delete engine
//!
//! Resolves manifests to API resources through cached discovery and converges
//! them with create-or-three-way-patch, or deletes them by kind and name.

mod apply;
pub mod cluster;
mod delete;
pub mod mapping;


pub use apply::{AppliedResourceMetadata, Reconciler, DEFAULT_NAMESPACE};
pub use cluster::{create_client, ClusterApi, KubeCluster, ResourceDescriptor};
pub use delete::Deleter;
pub use mapping::{
    DiscoveredResource, DiscoveryDocument, DiscoverySource, KubeDiscovery, MappingCache,
    MappingResolver,
};
