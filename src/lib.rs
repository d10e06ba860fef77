//! Dapr-Automation: one-shot Kubernetes apply/delete and state-store workflows
//!
//! This crate converges arbitrary manifests against a cluster with
//! `kubectl apply` semantics and wires application deployments to an
//! externally located Redis cache through a Dapr state-store component.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod patch;
pub mod telemetry;
pub mod workflow;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "rest-api")]
pub mod rest_api;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::config::AutomationConfig;
pub use crate::error::{Error, Result};
pub use crate::workflow::{Orchestrator, WorkflowSummary};
