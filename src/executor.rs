//! Download executor: runs a planned task list under a bounded worker pool.
//!
//! Each task is idempotent and atomic: a file that already exists at its
//! destination is skipped without touching the network, and a fetched
//! body is streamed to a `.part` sibling that is only renamed into place
//! on clean completion. Re-running the same plan after a partial run
//! therefore fetches only what is missing.
//!
//! Unlike the crawl, the executor is fail-isolated: one task's failure is
//! recorded and its siblings keep going. Every task returns its
//! [`Outcome`]; aggregation is a single fold after all tasks settle, so
//! no counter is shared across concurrent tasks.
//!
//! Two limits compose here: a task must hold a worker-pool slot (the
//! semaphore, bounding open connections and file handles) and a rate
//! limiter token (bounding request rate) before its GET goes out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::plan::DownloadTask;
use crate::session::{Session, SessionError};

/// Default number of tasks in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Suffix marking an in-progress download next to its destination.
const PART_SUFFIX: &str = ".part";

/// Terminal state of one download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// File fetched and committed to its destination.
    Succeeded,
    /// Destination already existed; no network access.
    Skipped,
    /// Transport, filesystem, or content-anomaly failure. Details are
    /// logged; siblings are unaffected.
    Failed,
}

/// Errors that fail a single download task.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request could not be issued or completed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] SessionError),

    /// The response declared page content where a file was expected -
    /// typically an expired session or an interstitial silently
    /// substituted for the real file.
    #[error("expected a file but {url} returned page content ({content_type})")]
    ContentAnomaly {
        /// The URL that answered with a page.
        url: String,
        /// The declared content type.
        content_type: String,
    },

    /// Directory creation, write, or rename failure.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Executes every task with at most `max_concurrency` in flight.
///
/// Returns one [`Outcome`] per task, order-aligned with `tasks`. Never
/// errors as a whole: individual failures (including task panics) are
/// classified as [`Outcome::Failed`] and the rest proceed.
#[instrument(skip(session, tasks), fields(tasks = tasks.len()))]
pub async fn execute(
    session: &Session,
    tasks: &[DownloadTask],
    max_concurrency: usize,
) -> Vec<Outcome> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut handles = Vec::with_capacity(tasks.len());

    for task in tasks {
        let semaphore = Arc::clone(&semaphore);
        let session = session.clone();
        let task = task.clone();
        handles.push(tokio::spawn(async move {
            // Permit held for the task's whole lifetime (RAII); the
            // semaphore is never closed while handles are pending.
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return Outcome::Failed;
            };
            run_task(&session, &task).await
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (handle, task) in handles.into_iter().zip(tasks) {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                warn!(destination = %task.destination.display(), error = %e, "download task panicked");
                outcomes.push(Outcome::Failed);
            }
        }
    }
    outcomes
}

/// Runs one task to its terminal state, logging the decision.
async fn run_task(session: &Session, task: &DownloadTask) -> Outcome {
    match download(session, task).await {
        Ok(Delivery::Skipped) => {
            info!(destination = %task.destination.display(), "exists, skipped");
            Outcome::Skipped
        }
        Ok(Delivery::Fetched) => {
            info!(destination = %task.destination.display(), "downloaded");
            Outcome::Succeeded
        }
        Err(e) => {
            warn!(
                destination = %task.destination.display(),
                url = %task.href,
                error = %e,
                "download failed"
            );
            Outcome::Failed
        }
    }
}

enum Delivery {
    Skipped,
    Fetched,
}

async fn download(session: &Session, task: &DownloadTask) -> Result<Delivery, DownloadError> {
    if let Some(parent) = task.destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::filesystem(parent, e))?;
    }

    // Resumability: an existing destination means a prior run committed
    // this file. Skip before any network access.
    if tokio::fs::metadata(&task.destination).await.is_ok() {
        return Ok(Delivery::Skipped);
    }

    let url = session.resolve(&task.href)?;
    let response = session.get(&url).await?;

    // Inspect headers before consuming any of the body: page content in
    // place of a file must abort before a temp file is even created.
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if is_page_content_type(&content_type) {
        return Err(DownloadError::ContentAnomaly {
            url: url.to_string(),
            content_type,
        });
    }

    let temp = part_path(&task.destination);
    debug!(temp = %temp.display(), "streaming to temp file");

    let result = stream_to_temp(response, &url, &temp).await;
    if result.is_err() {
        // Never leave a partial file behind.
        let _ = tokio::fs::remove_file(&temp).await;
        result?;
    }

    if let Err(e) = tokio::fs::rename(&temp, &task.destination).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(DownloadError::filesystem(&task.destination, e));
    }

    Ok(Delivery::Fetched)
}

/// Streams the response body into the temp file and flushes it.
async fn stream_to_temp(
    response: reqwest::Response,
    url: &url::Url,
    temp: &Path,
) -> Result<(), DownloadError> {
    let file = File::create(temp)
        .await
        .map_err(|e| DownloadError::filesystem(temp, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| SessionError::transport(url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::filesystem(temp, e))?;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::filesystem(temp, e))?;
    Ok(())
}

/// Sibling path marking this destination's in-progress download.
fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    name.push_str(PART_SUFFIX);
    destination.with_file_name(name)
}

/// True when the declared content type is a page rather than a file.
fn is_page_content_type(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    lowered.contains("text/html") || lowered.contains("application/xhtml")
}
