//! Named workflow steps

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    ConnectCache,
    SynthesizeService,
    ApplyService,
    ApplyDeployment,
    DeleteService,
    DeleteDeployment,
    DisconnectCache,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::ConnectCache => "connect-cache",
            Step::SynthesizeService => "synthesize-service",
            Step::ApplyService => "apply-service",
            Step::ApplyDeployment => "apply-deployment",
            Step::DeleteService => "delete-service",
            Step::DeleteDeployment => "delete-deployment",
            Step::DisconnectCache => "disconnect-cache",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workflow {
    CreateApp,
    DeleteApp,
    ConnectCache,
    DisconnectCache,
}

impl Workflow {
    /// Steps in execution order. Execution stops at the first failure and
    /// nothing already done is undone.
    pub fn steps(self) -> &'static [Step] {
        match self {
            Workflow::CreateApp => &[
                Step::ConnectCache,
                Step::SynthesizeService,
                Step::ApplyService,
                Step::ApplyDeployment,
            ],
            Workflow::DeleteApp => &[
                Step::DeleteService,
                Step::DeleteDeployment,
                Step::DisconnectCache,
            ],
            Workflow::ConnectCache => &[Step::ConnectCache],
            Workflow::DisconnectCache => &[Step::DisconnectCache],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Workflow::CreateApp => "create-app",
            Workflow::DeleteApp => "delete-app",
            Workflow::ConnectCache => "connect-cache",
            Workflow::DisconnectCache => "disconnect-cache",
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            Workflow::CreateApp => "App Created",
            Workflow::DeleteApp => "App has been deleted.",
            Workflow::ConnectCache => "Dapr StateStore Connected.",
            Workflow::DisconnectCache => "Dapr StateStore Disconnected.",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_app_connects_cache_first() {
        assert_eq!(Workflow::CreateApp.steps()[0], Step::ConnectCache);
        assert_eq!(Workflow::CreateApp.steps().last(), Some(&Step::ApplyDeployment));
    }

    #[test]
    fn test_delete_app_order() {
        assert_eq!(
            Workflow::DeleteApp.steps(),
            &[Step::DeleteService, Step::DeleteDeployment, Step::DisconnectCache]
        );
    }

    #[test]
    fn test_step_names_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_value(Step::ApplyService).unwrap(),
            serde_json::json!("apply-service")
        );
        assert_eq!(Workflow::DisconnectCache.to_string(), "disconnect-cache");
    }
}
