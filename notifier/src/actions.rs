//! The two operations a build can run against a service instance.
//!
//! Both follow the same failure policy: with `fail_build` set, any error is
//! returned as an [`ActionError`]; otherwise it is logged and the action
//! completes.

use crate::categories::ReportCategories;
use crate::client::{ClientError, ServiceClient};
use crate::config::{Config, Instance};
use crate::counter;
use crate::dispatch::DispatchEngine;
use crate::metadata::{BuildMetadata, BuildRun};
use crate::metrics_defs::REFRESH_REQUESTS;
use crate::report::{Report, render};
use crate::workspace::Workspace;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ActionError {
    #[error("unknown instance: {0}")]
    UnknownInstance(String),
    #[error("could not reach instance {instance}: {source}")]
    Unreachable {
        instance: String,
        source: ClientError,
    },
    #[error("refresh failed with HTTP {status}: {body}")]
    RefreshRejected { status: u16, body: String },
    /// First failed category of a report run.
    #[error("{0}")]
    ReportFailed(String),
}

fn fail(fail_build: bool, error: ActionError) -> Result<(), ActionError> {
    if fail_build {
        return Err(error);
    }
    tracing::error!("{}", error);
    Ok(())
}

fn resolve<'a>(
    config: &'a Config,
    instance_name: &str,
    fail_build: bool,
) -> Result<Option<&'a Instance>, ActionError> {
    match config.instance(instance_name) {
        Ok(instance) => Ok(Some(instance)),
        Err(_) => fail(
            fail_build,
            ActionError::UnknownInstance(instance_name.to_string()),
        )
        .map(|()| None),
    }
}

fn client_for(config: &Config, instance: &Instance) -> Result<ServiceClient, ActionError> {
    ServiceClient::new(instance, config.http.timeout()).map_err(|source| {
        ActionError::Unreachable {
            instance: instance.name.clone(),
            source,
        }
    })
}

/// Sends report files to an instance, one archive per category.
#[derive(Clone, Debug)]
pub struct ReportAction {
    pub instance_name: String,
    pub source_key: String,
    pub reports: ReportCategories,
    pub fail_build: bool,
}

impl ReportAction {
    pub async fn perform(
        &self,
        config: &Config,
        run: &BuildRun,
        workspace: Arc<dyn Workspace>,
    ) -> Result<Report, ActionError> {
        let Some(instance) = resolve(config, &self.instance_name, self.fail_build)? else {
            return Ok(Report::default());
        };

        let client = match client_for(config, instance) {
            Ok(client) => client,
            Err(e) => {
                fail(self.fail_build, e)?;
                return Ok(Report::default());
            }
        };

        let metadata = BuildMetadata::build(run, workspace.remote_path());
        let mut engine =
            DispatchEngine::new(client, &self.source_key, config.dispatch.pipe_capacity);
        if let Some(max) = config.dispatch.max_concurrent_uploads {
            engine = engine.with_max_concurrent(max);
        }

        tracing::info!(
            instance = %instance.name,
            source = %self.source_key,
            categories = self.reports.len(),
            "sending reports"
        );
        let results = engine.dispatch(&self.reports, &metadata, workspace).await;

        let report = render(&results, self.fail_build);
        report.emit();
        if let Some(message) = &report.fatal {
            return Err(ActionError::ReportFailed(message.clone()));
        }
        Ok(report)
    }
}

/// Asks an instance to refresh a project's computed data.
#[derive(Clone, Debug)]
pub struct RefreshAction {
    pub instance_name: String,
    pub project_key: String,
    pub fail_build: bool,
}

impl RefreshAction {
    /// Returns the service's summary line on success.
    pub async fn perform(&self, config: &Config) -> Result<Option<String>, ActionError> {
        let Some(instance) = resolve(config, &self.instance_name, self.fail_build)? else {
            return Ok(None);
        };

        let response = match client_for(config, instance) {
            Ok(client) => client
                .refresh_project(&self.project_key)
                .await
                .map_err(|source| ActionError::Unreachable {
                    instance: instance.name.clone(),
                    source,
                }),
            Err(e) => Err(e),
        };

        match response {
            Ok(response) if response.is_ok() => {
                counter!(REFRESH_REQUESTS, "outcome" => "success").increment(1);
                let displayed = response.data_displayed().unwrap_or_default();
                let line = format!("project refreshed: {displayed}");
                tracing::info!("{}", line);
                Ok(Some(line))
            }
            Ok(response) => {
                counter!(REFRESH_REQUESTS, "outcome" => "rejected").increment(1);
                let error = ActionError::RefreshRejected {
                    status: response.status,
                    body: response.body,
                };
                fail(self.fail_build, error).map(|()| None)
            }
            Err(e) => {
                counter!(REFRESH_REQUESTS, "outcome" => "error").increment(1);
                fail(self.fail_build, e).map(|()| None)
            }
        }
    }
}
