//! Dapr state-store workflows
//!
//! create-app, delete-app, connect-cache and disconnect-cache, each an
//! ordered list of named steps over the apply/delete engine and the cache
//! locator.

mod orchestrator;
pub mod steps;
pub mod synth;


pub use orchestrator::{OrchestrationRequest, Orchestrator, WorkflowSummary};
pub use steps::{Step, Workflow};
