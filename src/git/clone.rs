use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

use super::scratch::ScratchDir;
use crate::error::PipelineError;
use crate::models::Document;

/// File-name suffixes worth feeding to the README generator.
pub const ALLOWED_SUFFIXES: [&str; 7] = [".py", ".js", ".ts", "Dockerfile", ".md", ".txt", ".json"];

/// Files above this size are skipped.
const MAX_FILE_BYTES: u64 = 1_048_576;

/// Knobs for one fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// `None` clones whatever the remote HEAD points at
    pub branch: Option<String>,
    pub git_token: Option<String>,
    pub timeout: Option<Duration>,
}

/// Clone `url` into `scratch` and return the documents matching [`ALLOWED_SUFFIXES`].
///
/// On an empty result the scratch directory is removed before
/// [`PipelineError::EmptyRepository`] is returned.
pub async fn fetch_repository(
    url: &str,
    scratch: &ScratchDir,
    options: &FetchOptions,
) -> Result<Vec<Document>, PipelineError> {
    let fetch_err = |source: anyhow::Error| PipelineError::Fetch {
        url: url.to_string(),
        source,
    };

    let url_owned = url.to_string();
    let target = scratch.path().to_path_buf();
    let branch = options.branch.clone();
    let token = options.git_token.clone();
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();
    let mut clone_task = tokio::task::spawn_blocking(move || {
        clone_repo(
            &url_owned,
            &target,
            branch.as_deref(),
            token.as_deref(),
            &cancel_flag,
        )
    });

    let clone_result = match options.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, &mut clone_task).await {
            Ok(joined) => joined,
            Err(_) => {
                // The blocking clone keeps writing into the scratch directory
                // until it notices the flag, so wait for it before the guard drops
                cancel.store(true, Ordering::Relaxed);
                if let Err(e) = clone_task.await {
                    tracing::warn!("Cancelled clone of {url} did not shut down cleanly: {e}");
                }
                return Err(fetch_err(anyhow::anyhow!(
                    "Clone timed out after {:.1}s",
                    timeout.as_secs_f64()
                )));
            }
        },
        None => clone_task.await,
    };

    match clone_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(fetch_err(e)),
        Err(e) => return Err(fetch_err(anyhow::anyhow!("Clone task failed: {e}"))),
    }

    let repo_dir = scratch.path().to_path_buf();
    let documents = tokio::task::spawn_blocking(move || collect_documents(&repo_dir))
        .await
        .map_err(|e| fetch_err(anyhow::anyhow!("File walk task failed: {e}")))?;

    if documents.is_empty() {
        if let Err(e) = scratch.remove() {
            tracing::warn!("Failed to remove {}: {e}", scratch.path().display());
        }
        return Err(PipelineError::EmptyRepository {
            url: url.to_string(),
        });
    }

    tracing::info!("Loaded {} documents from {}", documents.len(), url);
    Ok(documents)
}

/// Clone a git repository to the target directory.
///
/// Setting `cancel` aborts the transfer at the next progress report.
pub fn clone_repo(
    url: &str,
    target: &Path,
    branch: Option<&str>,
    token: Option<&str>,
    cancel: &AtomicBool,
) -> Result<()> {
    tracing::info!("Cloning {} into {}", url, target.display());

    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.transfer_progress(|_| !cancel.load(Ordering::Relaxed));
    callbacks.sideband_progress(|_| !cancel.load(Ordering::Relaxed));
    if let Some(token) = token {
        let token = token.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            git2::Cred::userpass_plaintext("x-access-token", &token)
        });
    }
    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_options);
    if let Some(branch) = branch {
        builder.branch(branch);
    }

    builder.clone(url, target).with_context(|| match branch {
        Some(b) => format!("Failed to clone {url} (branch {b})"),
        None => format!("Failed to clone {url}"),
    })?;

    tracing::info!("Clone complete: {}", target.display());
    Ok(())
}

/// Walk a cloned repo and read every file whose name ends with an allowed suffix.
pub fn collect_documents(repo_dir: &Path) -> Vec<Document> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(repo_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();
        let Some(extension) = matched_suffix(&file_name) else {
            continue;
        };

        if let Ok(meta) = entry.metadata() {
            if meta.len() > MAX_FILE_BYTES {
                tracing::debug!("Skipping oversized file {}", path.display());
                continue;
            }
        }

        let relative = path
            .strip_prefix(repo_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        match std::fs::read_to_string(path) {
            Ok(content) => documents.push(Document {
                source_path: relative,
                content,
                extension: extension.to_string(),
            }),
            Err(_) => {
                // Not UTF-8
                continue;
            }
        }
    }

    documents
}

fn matched_suffix(file_name: &str) -> Option<&'static str> {
    ALLOWED_SUFFIXES
        .iter()
        .copied()
        .find(|suffix| file_name.ends_with(suffix))
}
