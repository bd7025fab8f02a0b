use clap::{Args, Parser, Subcommand};
use notifier::ReportFile;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "themis", about = "Notify a Themis instance about build artifacts")]
pub struct Cli {
    /// Instance configuration file
    #[arg(long, short, default_value = "themis.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Archive report files by category and upload them
    Report(ReportArgs),
    /// Ask the instance to refresh a project
    Refresh(RefreshArgs),
    /// Check that the instance is reachable and accepts the API key
    TestConnection {
        #[arg(long)]
        instance: String,
    },
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[arg(long)]
    pub instance: String,

    #[arg(long)]
    pub source_key: String,

    /// Report declaration as type=pattern, repeatable
    #[arg(long = "report", required = true)]
    pub reports: Vec<ReportFile>,

    /// Build workspace the patterns are relative to
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Build start time in epoch milliseconds, defaults to now
    #[arg(long)]
    pub start_time: Option<i64>,

    /// Exit with an error when any category fails
    #[arg(long)]
    pub fail_build: bool,
}

#[derive(Args, Debug)]
pub struct RefreshArgs {
    #[arg(long)]
    pub instance: String,

    #[arg(long)]
    pub project_key: String,

    #[arg(long)]
    pub fail_build: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_arguments() {
        let cli = Cli::try_parse_from([
            "themis",
            "--config",
            "/etc/themis.yaml",
            "report",
            "--instance",
            "main",
            "--source-key",
            "src",
            "--report",
            "cobertura=**/coverage.xml",
            "--report",
            "pmd=target/pmd.xml",
            "--fail-build",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/themis.yaml"));
        let CliCommand::Report(args) = cli.command else {
            panic!("expected report command");
        };
        assert_eq!(args.reports.len(), 2);
        assert_eq!(args.reports[1].r#type, "pmd");
        assert_eq!(args.workspace, PathBuf::from("."));
        assert!(args.fail_build);
        assert!(args.start_time.is_none());
    }

    #[test]
    fn malformed_report_is_rejected() {
        let result = Cli::try_parse_from([
            "themis",
            "report",
            "--instance",
            "main",
            "--source-key",
            "src",
            "--report",
            "cobertura",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn refresh_arguments() {
        let cli = Cli::try_parse_from([
            "themis",
            "refresh",
            "--instance",
            "main",
            "--project-key",
            "proj",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("themis.yaml"));
        assert!(matches!(
            cli.command,
            CliCommand::Refresh(RefreshArgs { ref project_key, fail_build: false, .. }) if project_key == "proj"
        ));
    }
}
