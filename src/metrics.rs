//! Prometheus metrics for dapr-automation
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `dapr_automation_apply_total` (counter): applies labeled by kind and
//!   outcome (`created`, `patched`, `unchanged`, `error`).
//! - `dapr_automation_delete_total` (counter): deletes labeled by kind and
//!   outcome (`deleted`, `not_found`, `error`).
//! - `dapr_automation_discovery_cache_total` (counter): discovery cache
//!   lookups labeled by result (`hit`, `miss`, `refresh`).
//! - `dapr_automation_workflow_duration_seconds` (histogram): workflow
//!   duration labeled by workflow.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResourceLabels {
    pub kind: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DiscoveryLabels {
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct WorkflowLabels {
    /// Workflow name, e.g. "create-app"
    pub workflow: String,
}

pub static APPLY_TOTAL: Lazy<Family<ResourceLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static DELETE_TOTAL: Lazy<Family<ResourceLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static DISCOVERY_CACHE_TOTAL: Lazy<Family<DiscoveryLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Histogram tracking workflow duration (seconds)
pub static WORKFLOW_DURATION_SECONDS: Lazy<Family<WorkflowLabels, Histogram>> = Lazy::new(|| {
    fn workflow_histogram() -> Histogram {
        // 10ms .. ~327s across 16 buckets; the request timeout is 180s.
        Histogram::new(exponential_buckets(0.01, 2.0, 16))
    }

    Family::new_with_constructor(workflow_histogram)
});

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "dapr_automation_apply",
        "Total number of manifest applies",
        APPLY_TOTAL.clone(),
    );
    registry.register(
        "dapr_automation_delete",
        "Total number of resource deletes",
        DELETE_TOTAL.clone(),
    );
    registry.register(
        "dapr_automation_discovery_cache",
        "Discovery cache lookups by result",
        DISCOVERY_CACHE_TOTAL.clone(),
    );
    registry.register(
        "dapr_automation_workflow_duration_seconds",
        "Duration of orchestrated workflows in seconds",
        WORKFLOW_DURATION_SECONDS.clone(),
    );

    registry
});

pub fn record_apply(kind: &str, outcome: &str) {
    APPLY_TOTAL
        .get_or_create(&ResourceLabels {
            kind: kind.to_string(),
            outcome: outcome.to_string(),
        })
        .inc();
}

pub fn record_delete(kind: &str, outcome: &str) {
    DELETE_TOTAL
        .get_or_create(&ResourceLabels {
            kind: kind.to_string(),
            outcome: outcome.to_string(),
        })
        .inc();
}

pub fn record_discovery(result: &str) {
    DISCOVERY_CACHE_TOTAL
        .get_or_create(&DiscoveryLabels {
            result: result.to_string(),
        })
        .inc();
}

pub fn observe_workflow(workflow: &str, seconds: f64) {
    WORKFLOW_DURATION_SECONDS
        .get_or_create(&WorkflowLabels {
            workflow: workflow.to_string(),
        })
        .observe(seconds);
}

/// Text exposition of every registered metric.
pub fn encode_registry() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}
