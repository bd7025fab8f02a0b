//! Turns dispatch results into user-facing log lines and a fail-build decision.

use crate::dispatch::DispatchResult;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
}

impl LogLine {
    fn info(message: String) -> Self {
        LogLine {
            level: Level::Info,
            message,
        }
    }

    fn error(message: String) -> Self {
        LogLine {
            level: Level::Error,
            message,
        }
    }

    pub fn emit(&self) {
        match self.level {
            Level::Info => tracing::info!("{}", self.message),
            Level::Error => tracing::error!("{}", self.message),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One line per category and, when the build must fail, the reason.
#[derive(Debug, Default)]
pub struct Report {
    pub lines: Vec<LogLine>,
    pub fatal: Option<String>,
}

impl Report {
    pub fn emit(&self) {
        self.lines.iter().for_each(LogLine::emit);
    }

    pub fn has_errors(&self) -> bool {
        self.lines.iter().any(|l| l.level == Level::Error)
    }
}

pub fn render(results: &[DispatchResult], fail_build: bool) -> Report {
    let mut report = Report::default();

    for result in results {
        let line = match result {
            DispatchResult::Success {
                category,
                data_displayed: Some(displayed),
            } => LogLine::info(format!("report sent: {category} ({displayed})")),
            DispatchResult::Success { category, .. } => {
                LogLine::info(format!("report sent: {category}"))
            }
            DispatchResult::Aborted { category } => {
                LogLine::info(format!("no files for: {category}"))
            }
            DispatchResult::Failed { category, cause } => {
                LogLine::error(format!("report failed: {category}: {cause}"))
            }
        };

        if fail_build && line.level == Level::Error && report.fatal.is_none() {
            report.fatal = Some(line.message.clone());
        }
        report.lines.push(line);
    }

    report
}
