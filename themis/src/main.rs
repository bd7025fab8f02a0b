use clap::Parser;
use notifier::client::{ConnectionStatus, ServiceClient};
use notifier::config::{Config, ConfigError, LoggingConfig};
use notifier::{ActionError, BuildRun, LocalWorkspace, RefreshAction, ReportAction};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

mod cli;
mod observability;

use cli::{Cli, CliCommand, RefreshArgs, ReportArgs};

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("build failed: {0}")]
    Action(#[from] ActionError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("connection test failed: {0}")]
    Connection(String),
    #[error("could not resolve workspace {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config);
    let logging = match &config {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig::default(),
    };
    observability::init_logging(&logging);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: CliCommand, config: Result<Config, ConfigError>) -> Result<(), CliError> {
    let config = config?;
    if let Some(metrics) = &config.metrics {
        observability::init_metrics(metrics).map_err(CliError::Metrics)?;
    }

    match command {
        CliCommand::Report(args) => report(&config, args).await,
        CliCommand::Refresh(args) => refresh(&config, args).await,
        CliCommand::TestConnection { instance } => test_connection(&config, &instance).await,
    }
}

async fn report(config: &Config, args: ReportArgs) -> Result<(), CliError> {
    let action = ReportAction {
        instance_name: args.instance,
        source_key: args.source_key,
        reports: args.reports.into_iter().collect(),
        fail_build: args.fail_build,
    };
    let run = BuildRun::new(args.start_time.unwrap_or_else(now_millis));
    let workspace = Arc::new(LocalWorkspace::new(workspace_root(&args.workspace)?));

    action.perform(config, &run, workspace).await?;
    Ok(())
}

async fn refresh(config: &Config, args: RefreshArgs) -> Result<(), CliError> {
    let action = RefreshAction {
        instance_name: args.instance,
        project_key: args.project_key,
        fail_build: args.fail_build,
    };
    action.perform(config).await?;
    Ok(())
}

async fn test_connection(config: &Config, name: &str) -> Result<(), CliError> {
    let instance = config.instance(name)?;
    let client = ServiceClient::new(instance, config.http.timeout())
        .map_err(|e| CliError::Connection(e.to_string()))?;

    match client.test_connection().await {
        ConnectionStatus::Ok => {
            tracing::info!(instance = %instance.name, "connection ok");
            Ok(())
        }
        ConnectionStatus::AuthenticationError => {
            Err(CliError::Connection("authentication rejected".into()))
        }
        ConnectionStatus::UnexpectedStatus(status) => Err(CliError::Connection(format!(
            "unexpected HTTP status {status}"
        ))),
        ConnectionStatus::NoConnection => {
            Err(CliError::Connection(format!("cannot connect to {}", instance.url)))
        }
        ConnectionStatus::Error(e) => Err(CliError::Connection(e)),
    }
}

/// The service records the workspace by its absolute path.
fn workspace_root(path: &Path) -> Result<PathBuf, CliError> {
    std::path::absolute(path).map_err(|source| CliError::Workspace {
        path: path.to_path_buf(),
        source,
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn unknown_instance_is_reported() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(
            tmp,
            r#"
instances:
    - name: main
      url: "http://127.0.0.1:1"
      api_key: secret
"#
        )
        .expect("write yaml");

        let config = Config::from_file(tmp.path());
        let command = CliCommand::TestConnection {
            instance: "other".into(),
        };
        let err = run(command, config).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown instance: other");
    }

    #[test]
    fn relative_workspace_is_made_absolute() {
        let root = workspace_root(Path::new(".")).unwrap();
        assert!(root.is_absolute());
        assert_eq!(root, std::env::current_dir().unwrap());

        let nested = workspace_root(Path::new("build/reports")).unwrap();
        assert!(nested.is_absolute());
        assert!(nested.ends_with("build/reports"));
    }

    #[tokio::test]
    async fn missing_config_file() {
        let config = Config::from_file(std::path::Path::new("/no/such/themis.yaml"));
        let command = CliCommand::TestConnection {
            instance: "main".into(),
        };
        assert!(matches!(
            run(command, config).await,
            Err(CliError::Config(ConfigError::LoadError(_)))
        ));
    }
}
