//! Workflow runner
//!
//! Each request maps to a [`Workflow`], a fixed list of [`Step`]s run in
//! order. The first failing step aborts the run and its error is returned
//! unchanged; steps that already succeeded are not rolled back.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::steps::{Step, Workflow};
use super::synth::{
    build_service, build_state_store, extract_deployment_facts, COMPONENT_KIND, STATE_STORE_NAME,
};
use crate::cache::{locate, CacheConnectParams, CacheLocator, DcsLocator};
use crate::config::{AutomationConfig, DeletePolicy};
use crate::engine::{
    create_client, AppliedResourceMetadata, ClusterApi, Deleter, KubeCluster, KubeDiscovery,
    MappingCache, MappingResolver, Reconciler, DEFAULT_NAMESPACE,
};
use crate::error::{Error, Result};
use crate::manifest::ManifestDocument;

/// One unit of work for the orchestrator
#[derive(Clone, Debug)]
pub enum OrchestrationRequest {
    AppCreate {
        manifest: ManifestDocument,
        cache: CacheConnectParams,
    },
    AppDelete {
        namespace: String,
        name: String,
    },
    CacheConnect {
        cache: CacheConnectParams,
    },
    CacheDisconnect,
}

impl OrchestrationRequest {
    pub fn workflow(&self) -> Workflow {
        match self {
            OrchestrationRequest::AppCreate { .. } => Workflow::CreateApp,
            OrchestrationRequest::AppDelete { .. } => Workflow::DeleteApp,
            OrchestrationRequest::CacheConnect { .. } => Workflow::ConnectCache,
            OrchestrationRequest::CacheDisconnect => Workflow::DisconnectCache,
        }
    }

    fn cache_params(&self) -> Option<&CacheConnectParams> {
        match self {
            OrchestrationRequest::AppCreate { cache, .. }
            | OrchestrationRequest::CacheConnect { cache } => Some(cache),
            _ => None,
        }
    }

    fn manifest(&self) -> Option<&ManifestDocument> {
        match self {
            OrchestrationRequest::AppCreate { manifest, .. } => Some(manifest),
            _ => None,
        }
    }

    fn target(&self) -> Option<(&str, &str)> {
        match self {
            OrchestrationRequest::AppDelete { namespace, name } => Some((namespace, name)),
            _ => None,
        }
    }
}

/// Result of a completed workflow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub workflow: Workflow,
    pub message: String,
    /// Objects applied, in step order
    pub applied: Vec<AppliedResourceMetadata>,
    pub completed_steps: Vec<Step>,
    /// Deletes whose target was already gone under `DeletePolicy::IgnoreNotFound`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_steps: Vec<Step>,
}

enum StepOutcome {
    Done,
    Skipped,
}

#[derive(Default)]
struct RunState {
    applied: Vec<AppliedResourceMetadata>,
    completed: Vec<Step>,
    skipped: Vec<Step>,
    service: Option<ManifestDocument>,
}

pub struct Orchestrator {
    reconciler: Arc<Reconciler>,
    deleter: Arc<Deleter>,
    locator: Arc<dyn CacheLocator>,
    cache_backend: String,
    delete_policy: DeletePolicy,
}

impl Orchestrator {
    pub fn new(
        reconciler: Arc<Reconciler>,
        deleter: Arc<Deleter>,
        locator: Arc<dyn CacheLocator>,
        cache_backend: impl Into<String>,
        delete_policy: DeletePolicy,
    ) -> Self {
        Self {
            reconciler,
            deleter,
            locator,
            cache_backend: cache_backend.into(),
            delete_policy,
        }
    }

    /// Wire the live kube client, discovery cache and DCS locator.
    pub async fn connect(config: &AutomationConfig) -> Result<Self> {
        let (client, host) =
            create_client(config.kubeconfig.as_deref(), config.request_timeout).await?;
        info!("Connected to cluster {}", host);

        let cluster: Arc<dyn ClusterApi> =
            Arc::new(KubeCluster::new(client.clone(), config.request_timeout));
        let discovery = Arc::new(KubeDiscovery::new(client, host, config.request_timeout));
        let resolver = Arc::new(MappingResolver::new(
            discovery,
            Arc::new(MappingCache::new(config.discovery_ttl)),
        ));
        let locator = Arc::new(DcsLocator::new(&config.locator, config.request_timeout)?);

        Ok(Self::new(
            Arc::new(Reconciler::new(cluster.clone(), resolver.clone())),
            Arc::new(Deleter::new(cluster, resolver)),
            locator,
            config.cache_backend.clone(),
            config.delete_policy,
        ))
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn deleter(&self) -> &Deleter {
        &self.deleter
    }

    pub async fn create_app(
        &self,
        manifest: ManifestDocument,
        cache: CacheConnectParams,
    ) -> Result<WorkflowSummary> {
        self.run(OrchestrationRequest::AppCreate { manifest, cache })
            .await
    }

    pub async fn delete_app(&self, namespace: &str, name: &str) -> Result<WorkflowSummary> {
        self.run(OrchestrationRequest::AppDelete {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
        .await
    }

    pub async fn connect_cache(&self, cache: CacheConnectParams) -> Result<WorkflowSummary> {
        self.run(OrchestrationRequest::CacheConnect { cache }).await
    }

    pub async fn disconnect_cache(&self) -> Result<WorkflowSummary> {
        self.run(OrchestrationRequest::CacheDisconnect).await
    }

    pub async fn run(&self, request: OrchestrationRequest) -> Result<WorkflowSummary> {
        let workflow = request.workflow();
        let started = Instant::now();
        let result = self.run_steps(workflow, &request).await;

        #[cfg(feature = "metrics")]
        crate::metrics::observe_workflow(workflow.as_str(), started.elapsed().as_secs_f64());

        info!(
            workflow = %workflow,
            ok = result.is_ok(),
            "Workflow finished in {:?}",
            started.elapsed()
        );
        result
    }

    #[instrument(skip(self, request), fields(workflow = %workflow))]
    async fn run_steps(
        &self,
        workflow: Workflow,
        request: &OrchestrationRequest,
    ) -> Result<WorkflowSummary> {
        let mut state = RunState::default();
        for &step in workflow.steps() {
            info!(%step, "Starting step");
            match self.execute(step, request, &mut state).await {
                Ok(StepOutcome::Done) => {
                    info!(%step, "Step completed");
                    state.completed.push(step);
                }
                Ok(StepOutcome::Skipped) => state.skipped.push(step),
                Err(e) => {
                    error!(%step, error = %e, "Step failed, aborting workflow");
                    return Err(e);
                }
            }
        }

        Ok(WorkflowSummary {
            workflow,
            message: workflow.success_message().to_string(),
            applied: state.applied,
            completed_steps: state.completed,
            skipped_steps: state.skipped,
        })
    }

    async fn execute(
        &self,
        step: Step,
        request: &OrchestrationRequest,
        state: &mut RunState,
    ) -> Result<StepOutcome> {
        match step {
            Step::ConnectCache => {
                let params = request.cache_params().ok_or_else(|| missing_input(step))?;
                let connection = locate(self.locator.as_ref(), params).await?;
                let component = build_state_store(&connection, &self.cache_backend)?;
                let applied = self
                    .reconciler
                    .apply(&component, Some(DEFAULT_NAMESPACE))
                    .await?;
                state.applied.push(applied);
            }
            Step::SynthesizeService => {
                let deployment = request.manifest().ok_or_else(|| missing_input(step))?;
                let facts = extract_deployment_facts(deployment)?;
                state.service = Some(build_service(deployment, &facts)?);
            }
            Step::ApplyService => {
                let service = state.service.take().ok_or_else(|| missing_input(step))?;
                let applied = self
                    .reconciler
                    .apply(&service, Some(DEFAULT_NAMESPACE))
                    .await?;
                state.applied.push(applied);
            }
            Step::ApplyDeployment => {
                let deployment = request.manifest().ok_or_else(|| missing_input(step))?;
                let applied = self
                    .reconciler
                    .apply(deployment, Some(DEFAULT_NAMESPACE))
                    .await?;
                state.applied.push(applied);
            }
            Step::DeleteService => {
                let (namespace, name) = request.target().ok_or_else(|| missing_input(step))?;
                return self.delete_with_policy("Service", name, namespace).await;
            }
            Step::DeleteDeployment => {
                let (namespace, name) = request.target().ok_or_else(|| missing_input(step))?;
                return self.delete_with_policy("Deployment", name, namespace).await;
            }
            Step::DisconnectCache => {
                return self
                    .delete_with_policy(COMPONENT_KIND, STATE_STORE_NAME, DEFAULT_NAMESPACE)
                    .await;
            }
        }
        Ok(StepOutcome::Done)
    }

    async fn delete_with_policy(&self, kind: &str, name: &str, namespace: &str) -> Result<StepOutcome> {
        match self.deleter.delete(kind, name, namespace).await {
            Ok(()) => Ok(StepOutcome::Done),
            Err(e @ Error::NotFoundOnDelete { .. })
                if self.delete_policy == DeletePolicy::IgnoreNotFound =>
            {
                warn!("{}, treating as already deleted", e);
                Ok(StepOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }
}

fn missing_input(step: Step) -> Error {
    Error::ConfigError(format!("step {} has no input in this request", step))
}
