//! Ships build reports to a Themis instance.
//!
//! A [`ReportAction`] collects report files from a build workspace by
//! category, streams each category as a zip archive into a multipart upload
//! and reports one outcome per category. A [`RefreshAction`] asks the
//! instance to recompute a project.

pub mod actions;
pub mod archive_stream;
pub mod categories;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod metadata;
pub mod metrics_defs;
pub mod report;
pub mod workspace;

#[cfg(test)]
mod testutils;

pub use actions::{ActionError, RefreshAction, ReportAction};
pub use categories::{ReportCategories, ReportFile};
pub use config::Config;
pub use dispatch::{DispatchEngine, DispatchResult};
pub use metadata::{BuildMetadata, BuildRun};
pub use workspace::{LocalWorkspace, Workspace};
