//! Build metadata attached to every uploaded report archive.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

pub type EnvVars = HashMap<String, String>;

const GIT_COMMIT: &str = "GIT_COMMIT";
const GIT_BRANCH: &str = "GIT_BRANCH";
const SVN_REVISION: &str = "SVN_REVISION";

/// The build execution a report belongs to.
///
/// Environment variables are resolved at most once. A caller that already
/// holds them (a pipeline step, a test) hands them over with
/// [`BuildRun::with_env_vars`]; otherwise they are read from the process
/// environment on first use.
#[derive(Debug)]
pub struct BuildRun {
    start_time_millis: i64,
    env_vars: OnceLock<EnvVars>,
}

impl BuildRun {
    pub fn new(start_time_millis: i64) -> Self {
        Self {
            start_time_millis,
            env_vars: OnceLock::new(),
        }
    }

    pub fn with_env_vars(start_time_millis: i64, env_vars: EnvVars) -> Self {
        let run = Self::new(start_time_millis);
        let _ = run.env_vars.set(env_vars);
        run
    }

    pub fn start_time_millis(&self) -> i64 {
        self.start_time_millis
    }

    pub fn env_vars(&self) -> &EnvVars {
        self.env_vars.get_or_init(|| std::env::vars().collect())
    }
}

/// Immutable per-build metadata, built once before categories fan out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BuildMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(rename = "executionDate")]
    pub execution_timestamp_millis: i64,
    #[serde(rename = "dataWorkspace")]
    pub workspace_remote_path: String,
}

impl BuildMetadata {
    pub fn build(run: &BuildRun, workspace_remote_path: impl Into<String>) -> Self {
        let env = run.env_vars();
        let (commit, branch) = match (env.get(GIT_COMMIT), env.get(SVN_REVISION)) {
            (Some(commit), _) => (Some(commit.clone()), env.get(GIT_BRANCH).cloned()),
            (None, Some(revision)) => (Some(revision.clone()), None),
            (None, None) => (None, None),
        };

        BuildMetadata {
            commit,
            branch,
            execution_timestamp_millis: run.start_time_millis(),
            workspace_remote_path: workspace_remote_path.into(),
        }
    }

    /// An owned copy tagged with the category's data type.
    pub fn derive_for(&self, category: &str) -> CategoryMetadata {
        CategoryMetadata {
            data_type: category.to_string(),
            build: self.clone(),
        }
    }
}

/// Metadata sent alongside a single category's archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryMetadata {
    #[serde(rename = "dataType")]
    pub data_type: String,
    #[serde(flatten)]
    pub build: BuildMetadata,
}

impl CategoryMetadata {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
