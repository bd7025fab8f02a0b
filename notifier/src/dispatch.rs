//! Concurrent archive-and-upload of report categories.
//!
//! Every category runs as its own task. Within a task the workspace is
//! archived on a blocking thread that writes into an [`archive_stream`],
//! while the upload request reads the other end as its body. Each category
//! yields exactly one [`DispatchResult`], whatever happens to its task.

use crate::archive_stream::archive_stream;
use crate::categories::ReportCategories;
use crate::client::{ClientError, ServiceClient, ServiceResponse};
use crate::errors::{DispatchError, Result, WorkspaceError};
use crate::metadata::{BuildMetadata, CategoryMetadata};
use crate::metrics_defs::{REPORTS_ABORTED, REPORTS_FAILED, REPORTS_SENT, UPLOAD_DURATION};
use crate::workspace::Workspace;
use crate::{counter, histogram};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

#[derive(Debug)]
pub enum DispatchResult {
    /// The service accepted the archive (HTTP 200).
    Success {
        category: String,
        data_displayed: Option<String>,
    },
    /// No file matched the category's patterns; nothing was sent.
    Aborted { category: String },
    Failed {
        category: String,
        cause: DispatchError,
    },
}

impl DispatchResult {
    pub fn category(&self) -> &str {
        match self {
            DispatchResult::Success { category, .. }
            | DispatchResult::Aborted { category }
            | DispatchResult::Failed { category, .. } => category,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchResult::Failed { .. })
    }
}

#[derive(Clone)]
pub struct DispatchEngine {
    client: ServiceClient,
    source_key: Arc<str>,
    pipe_capacity: usize,
    limit: Option<Arc<Semaphore>>,
}

impl DispatchEngine {
    pub fn new(client: ServiceClient, source_key: &str, pipe_capacity: usize) -> Self {
        Self {
            client,
            source_key: source_key.into(),
            pipe_capacity,
            limit: None,
        }
    }

    /// Cap the number of categories in flight at once.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }

    /// Dispatch every category concurrently and return one result per category.
    ///
    /// Failures stay scoped to their category; this never returns early.
    pub async fn dispatch(
        &self,
        categories: &ReportCategories,
        base: &BuildMetadata,
        workspace: Arc<dyn Workspace>,
    ) -> Vec<DispatchResult> {
        let mut join_set = JoinSet::new();
        let mut pending = HashSet::new();

        for (category, patterns) in categories.iter() {
            let job = CategoryJob {
                engine: self.clone(),
                workspace: workspace.clone(),
                patterns: patterns.into(),
                metadata: base.derive_for(category),
            };

            pending.insert(category.to_string());
            join_set.spawn(job.run());
        }

        let results = join_all(join_set, pending).await;
        for result in &results {
            record_metrics(result);
        }
        results
    }
}

/// Collect every task's result. Categories whose task was lost still get one.
async fn join_all(
    mut join_set: JoinSet<DispatchResult>,
    mut pending: HashSet<String>,
) -> Vec<DispatchResult> {
    let mut results = Vec::with_capacity(pending.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => {
                pending.remove(result.category());
                results.push(result);
            }
            Err(e) => tracing::error!("Dispatch task panicked: {}", e),
        }
    }

    // Whatever is still pending lost its task.
    for category in pending.drain() {
        results.push(DispatchResult::Failed {
            category,
            cause: DispatchError::Task("dispatch task did not complete".into()),
        });
    }
    results
}

struct CategoryJob {
    engine: DispatchEngine,
    workspace: Arc<dyn Workspace>,
    patterns: Arc<[String]>,
    metadata: CategoryMetadata,
}

impl CategoryJob {
    async fn run(self) -> DispatchResult {
        let category = self.metadata.data_type.clone();

        let _permit = match &self.engine.limit {
            Some(limit) => match limit.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    return DispatchResult::Failed {
                        category,
                        cause: DispatchError::Task(e.to_string()),
                    };
                }
            },
            None => None,
        };

        match self.has_files().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(category = %category, "no file matched");
                return DispatchResult::Aborted { category };
            }
            Err(cause) => return DispatchResult::Failed { category, cause },
        }

        let started = Instant::now();
        let outcome = self.archive_and_send().await;
        histogram!(UPLOAD_DURATION).record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(response) if response.is_ok() => DispatchResult::Success {
                category,
                data_displayed: response.data_displayed(),
            },
            Ok(response) => DispatchResult::Failed {
                category,
                cause: DispatchError::Service {
                    status: response.status,
                    body: response.body,
                },
            },
            Err(cause) => DispatchResult::Failed { category, cause },
        }
    }

    async fn has_files(&self) -> Result<bool> {
        let workspace = self.workspace.clone();
        let patterns = self.patterns.clone();

        tokio::task::spawn_blocking(move || workspace.has_matches(&patterns))
            .await
            .map_err(|e| DispatchError::Task(e.to_string()))?
            .map_err(DispatchError::Enumeration)
    }

    async fn archive_and_send(self) -> Result<ServiceResponse> {
        let (writer, stream) = archive_stream(self.engine.pipe_capacity);
        let workspace = self.workspace;
        let patterns = self.patterns;

        let producer = tokio::task::spawn_blocking(move || {
            let mut writer = writer;
            match workspace.archive(&patterns, &mut writer) {
                Ok(()) => writer.finish().map_err(WorkspaceError::from),
                Err(e) => {
                    writer.abort(&e);
                    Err(e)
                }
            }
        });

        let consumer = self
            .engine
            .client
            .upload_report(&self.engine.source_key, &self.metadata, stream)
            .await;

        reduce(producer.await, consumer)
    }
}

/// Combine the archiver's and the uploader's outcomes into one.
///
/// An archiver failure wins over any HTTP outcome, except when the archiver
/// only failed because the upload side closed the stream first.
fn reduce(
    producer: std::result::Result<std::result::Result<(), WorkspaceError>, JoinError>,
    consumer: std::result::Result<ServiceResponse, ClientError>,
) -> Result<ServiceResponse> {
    match (producer, consumer) {
        (Err(e), _) => Err(DispatchError::Task(format!("archiver task failed: {e}"))),
        (Ok(Err(e)), Ok(response)) if e.is_stream_closed() && !response.is_ok() => Ok(response),
        (Ok(Err(e)), Err(upload)) if e.is_stream_closed() => Err(upload.into()),
        (Ok(Err(e)), _) => Err(DispatchError::Archive(e)),
        (Ok(Ok(())), consumer) => Ok(consumer?),
    }
}

fn record_metrics(result: &DispatchResult) {
    let category = result.category().to_string();
    match result {
        DispatchResult::Success { .. } => {
            counter!(REPORTS_SENT, "category" => category).increment(1)
        }
        DispatchResult::Aborted { .. } => {
            counter!(REPORTS_ABORTED, "category" => category).increment(1)
        }
        DispatchResult::Failed { .. } => {
            counter!(REPORTS_FAILED, "category" => category).increment(1)
        }
    }
}
