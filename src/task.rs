//! Background-task boundary: every pipeline outcome becomes a result string.

use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::error::PipelineError;
use crate::models::RepoJob;
use crate::pipeline::ReadmeGenerator;

/// Prefix of every captured failure.
pub const FAILURE_MARKER: &str = "TASK FAILED:";

/// Run the pipeline for `job`, turning errors and panics into a failure report.
///
/// Never fails: the job backend records whatever this returns as a success.
pub async fn run_readme_task(generator: &ReadmeGenerator, job: &RepoJob) -> String {
    tracing::info!("Starting README task for {}", job.url);
    match AssertUnwindSafe(generator.generate_readme(job))
        .catch_unwind()
        .await
    {
        Ok(result) => into_task_output(result),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!("README task for {} panicked: {message}", job.url);
            format!("{FAILURE_MARKER}\n\npanic in README pipeline: {message}")
        }
    }
}

/// Map a pipeline outcome onto the text stored as the job result.
pub fn into_task_output(result: Result<String, PipelineError>) -> String {
    match result {
        Ok(readme) => readme,
        Err(err) => {
            let report = failure_report(&err);
            tracing::error!("README task failed: {report}");
            format!("{FAILURE_MARKER}\n\n{report}")
        }
    }
}

/// Kind, stage, message, and the numbered cause chain.
pub fn failure_report(err: &PipelineError) -> String {
    let mut report = format!("{} (stage: {}): {err}", err.kind(), err.stage());

    let mut cause = std::error::Error::source(err);
    if cause.is_some() {
        report.push_str("\n\nCaused by:");
    }
    let mut depth = 0;
    while let Some(current) = cause {
        report.push_str(&format!("\n    {depth}: {current}"));
        cause = current.source();
        depth += 1;
    }
    report
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_success_passes_through() {
        assert_eq!(into_task_output(Ok("## Usage Guide".into())), "## Usage Guide");
    }

    #[test]
    fn test_failure_names_kind_and_stage() {
        let output = into_task_output(Err(PipelineError::EmptyRepository {
            url: "https://github.com/acme/empty".into(),
        }));
        assert!(output.starts_with("TASK FAILED:\n\n"));
        assert!(output.contains("EmptyRepositoryError (stage: fetch)"));
        assert!(!output.contains("Caused by"));
    }

    #[test]
    fn test_failure_includes_cause_chain() {
        let source = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("Failed to reach Qdrant at http://localhost:6333")
            .unwrap_err();
        let output = into_task_output(Err(PipelineError::Index {
            collection: "acme_widget".into(),
            source,
        }));

        assert!(output.contains("IndexError (stage: indexing)"));
        assert!(output.contains("0: Failed to reach Qdrant at http://localhost:6333"));
        assert!(output.contains("1: connection refused"));
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
