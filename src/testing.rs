//! In-memory fakes for the cluster, discovery and the cache locator

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::cache::{CacheInstance, CacheLocator, LocatorCredentials};
use crate::engine::{
    ClusterApi, Deleter, DiscoveredResource, DiscoveryDocument, DiscoverySource, MappingCache,
    MappingResolver, Reconciler, ResourceDescriptor,
};
use crate::error::{Error, Result};
use crate::patch::strategy::{list_strategy, ListStrategy};
use crate::patch::PatchDocument;

pub fn descriptor(
    group: &str,
    version: &str,
    kind: &str,
    plural: &str,
    namespaced: bool,
) -> ResourceDescriptor {
    ResourceDescriptor {
        group: group.to_string(),
        version: version.to_string(),
        kind: kind.to_string(),
        resource_plural: plural.to_string(),
        namespaced,
    }
}

pub fn cache_instance(name: &str, status: &str, passwordless: bool) -> CacheInstance {
    CacheInstance {
        name: name.to_string(),
        host: format!("{}.redis.local", name),
        port: 6379,
        status: status.to_string(),
        passwordless,
    }
}

pub struct FakeDiscovery {
    host: String,
    resources: Mutex<Vec<DiscoveredResource>>,
    fetches: AtomicUsize,
}

impl FakeDiscovery {
    pub fn new(resources: Vec<ResourceDescriptor>) -> Self {
        Self {
            host: "https://127.0.0.1:6443".to_string(),
            resources: Mutex::new(
                resources
                    .into_iter()
                    .map(|descriptor| DiscoveredResource {
                        descriptor,
                        preferred: true,
                    })
                    .collect(),
            ),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Core kinds only; no custom resources installed.
    pub fn standard() -> Self {
        Self::new(vec![
            descriptor("", "v1", "Service", "services", true),
            descriptor("", "v1", "ConfigMap", "configmaps", true),
            descriptor("", "v1", "Namespace", "namespaces", false),
            descriptor("apps", "v1", "Deployment", "deployments", true),
        ])
    }

    /// Core kinds plus the Dapr component CRD.
    pub fn with_dapr() -> Self {
        let fake = Self::standard();
        fake.add(descriptor("dapr.io", "v1alpha1", "Component", "components", true));
        fake
    }

    pub fn add(&self, descriptor: ResourceDescriptor) {
        self.resources.lock().unwrap().push(DiscoveredResource {
            descriptor,
            preferred: true,
        });
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoverySource for FakeDiscovery {
    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch(&self) -> Result<DiscoveryDocument> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(DiscoveryDocument::new(self.resources.lock().unwrap().clone()))
    }
}

type ObjectKey = (String, String, String);

struct Failure {
    code: u16,
    remaining: Option<usize>,
}

/// API server stand-in storing objects by (plural, namespace, name).
///
/// Every call is logged as `"<op> <plural> <namespace>/<name>"` (or
/// `"<op> <plural> <name>"` when cluster-scoped). Failures can be injected
/// per call label.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<HashMap<ObjectKey, Value>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, Failure>>,
    revision: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than `get`
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get "))
            .collect()
    }

    pub fn patches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("patch "))
            .collect()
    }

    pub fn fail_always(&self, label: &str, code: u16) {
        self.failures.lock().unwrap().insert(
            label.to_string(),
            Failure {
                code,
                remaining: None,
            },
        );
    }

    pub fn fail_once(&self, label: &str, code: u16) {
        self.failures.lock().unwrap().insert(
            label.to_string(),
            Failure {
                code,
                remaining: Some(1),
            },
        );
    }

    pub fn object(&self, plural: &str, namespace: Option<&str>, name: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&key(plural, namespace, name))
            .cloned()
    }

    /// Seed an object as if someone else had created it.
    pub fn insert(&self, plural: &str, namespace: Option<&str>, object: Value) {
        let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.objects
            .lock()
            .unwrap()
            .insert(key(plural, namespace, &name), object);
    }

    fn record(&self, op: &str, plural: &str, namespace: Option<&str>, name: &str) -> Result<()> {
        let label = match namespace {
            Some(ns) => format!("{} {} {}/{}", op, plural, ns, name),
            None => format!("{} {} {}", op, plural, name),
        };
        self.calls.lock().unwrap().push(label.clone());

        let mut failures = self.failures.lock().unwrap();
        let Some(failure) = failures.get_mut(&label) else {
            return Ok(());
        };
        let code = failure.code;
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                failures.remove(&label);
            }
        }
        Err(rejected(code, &format!("injected failure for {}", label)))
    }

    fn next_revision(&self) -> usize {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn key(plural: &str, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        plural.to_string(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

fn rejected(code: u16, message: &str) -> Error {
    let reason = match code {
        404 => "NotFound",
        409 => "AlreadyExists",
        422 => "Invalid",
        _ => "InternalError",
    };
    Error::ServerRejected {
        code,
        reason: reason.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>> {
        self.record("get", &resource.resource_plural, namespace, name)?;
        Ok(self.object(&resource.resource_plural, namespace, name))
    }

    async fn create(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value> {
        let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.record("create", &resource.resource_plural, namespace, &name)?;

        let k = key(&resource.resource_plural, namespace, &name);
        if self.objects.lock().unwrap().contains_key(&k) {
            return Err(rejected(409, &format!("{} already exists", name)));
        }

        let revision = self.next_revision();
        let mut stored = object.clone();
        let metadata = stored["metadata"].as_object_mut().unwrap();
        metadata.insert("uid".to_string(), json!(format!("uid-{}", revision)));
        metadata.insert("resourceVersion".to_string(), json!(revision.to_string()));
        metadata.insert("creationTimestamp".to_string(), json!("2024-01-01T00:00:00Z"));
        stored
            .as_object_mut()
            .unwrap()
            .entry("status")
            .or_insert_with(|| json!({}));

        self.objects.lock().unwrap().insert(k, stored.clone());
        Ok(stored)
    }

    async fn patch(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
        patch: &PatchDocument,
    ) -> Result<Value> {
        self.record("patch", &resource.resource_plural, namespace, name)?;

        let mut objects = self.objects.lock().unwrap();
        let k = key(&resource.resource_plural, namespace, name);
        let Some(live) = objects.get_mut(&k) else {
            return Err(rejected(404, &format!("{} not found", name)));
        };
        match patch {
            PatchDocument::Merge(body) => json_patch::merge(live, body),
            PatchDocument::Strategic(body) => apply_strategic(live, body, None),
        }
        live["metadata"]["resourceVersion"] = json!(self.next_revision().to_string());
        Ok(live.clone())
    }

    async fn delete(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        self.record("delete", &resource.resource_plural, namespace, name)?;
        match self
            .objects
            .lock()
            .unwrap()
            .remove(&key(&resource.resource_plural, namespace, name))
        {
            Some(_) => Ok(()),
            None => Err(rejected(404, &format!("{} not found", name))),
        }
    }
}

/// Minimal server-side strategic merge: keyed lists, `$patch: delete`,
/// scalar set lists with `$deleteFromPrimitiveList`, `null` removal.
/// `$setElementOrder` directives are ignored.
pub fn apply_strategic(target: &mut Value, patch: &Value, parent: Option<&str>) {
    let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), patch.as_object()) else {
        *target = patch.clone();
        return;
    };
    for (field, value) in patch_map {
        if field.starts_with("$setElementOrder/") {
            continue;
        }
        if let Some(list) = field.strip_prefix("$deleteFromPrimitiveList/") {
            if let (Some(Value::Array(live)), Some(removed)) =
                (target_map.get_mut(list), value.as_array())
            {
                live.retain(|v| !removed.contains(v));
            }
            continue;
        }
        if value.is_null() {
            target_map.remove(field);
            continue;
        }
        match (target_map.get_mut(field), value, list_strategy(parent, field)) {
            (Some(Value::Array(live)), Value::Array(items), ListStrategy::MergePrimitive) => {
                for item in items {
                    if !live.contains(item) {
                        live.push(item.clone());
                    }
                }
            }
            (Some(Value::Array(live)), Value::Array(items), ListStrategy::MergeByKey(k)) => {
                for item in items {
                    let id = &item[k];
                    let position = live.iter().position(|l| &l[k] == id);
                    if item.get("$patch").and_then(Value::as_str) == Some("delete") {
                        if let Some(i) = position {
                            live.remove(i);
                        }
                        continue;
                    }
                    match position {
                        Some(i) => apply_strategic(&mut live[i], item, Some(field.as_str())),
                        None => live.push(item.clone()),
                    }
                }
            }
            (Some(existing), Value::Object(_), _) if existing.is_object() => {
                apply_strategic(existing, value, Some(field.as_str()));
            }
            _ => {
                target_map.insert(field.clone(), strip_directives(value));
            }
        }
    }
}

fn strip_directives(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('$'))
                .map(|(k, v)| (k.clone(), strip_directives(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_directives).collect()),
        other => other.clone(),
    }
}

/// Locator returning a fixed catalogue
pub struct FakeLocator {
    instances: Vec<CacheInstance>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeLocator {
    pub fn new(instances: Vec<CacheInstance>) -> Self {
        Self {
            instances,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            instances: Vec::new(),
            failure: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheLocator for FakeLocator {
    async fn list_instances(&self, _credentials: &LocatorCredentials) -> Result<Vec<CacheInstance>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(Error::LocatorError(message.clone())),
            None => Ok(self.instances.clone()),
        }
    }
}

/// Reconciler and deleter over the given fakes, sharing one resolver.
pub fn engine(discovery: Arc<FakeDiscovery>, cluster: Arc<FakeCluster>) -> (Reconciler, Deleter) {
    let cache = Arc::new(MappingCache::new(Duration::from_secs(600)));
    let resolver = Arc::new(MappingResolver::new(discovery, cache));
    (
        Reconciler::new(cluster.clone(), resolver.clone()),
        Deleter::new(cluster, resolver),
    )
}
