use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{ErrorBody, GenerateRequest, JobStatus, RepoJob, StatusResponse, TaskResponse};
use crate::state::AppState;

/// Result text reported for jobs that died outside the pipeline.
pub const GENERIC_FAILURE: &str = "Task failed. Please check the logs for details.";

/// GET / - Welcome message
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the README generator API" }))
}

/// POST /generate - Queue README generation for a repository
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), (StatusCode, Json<ErrorBody>)> {
    let job = RepoJob::parse(req.repo_url.trim()).map_err(|e| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody {
                error: format!("Invalid repo_url: {e}"),
            }),
        )
    })?;

    let task_id = state.jobs.enqueue(job);
    Ok((StatusCode::ACCEPTED, Json(TaskResponse { task_id })))
}

/// GET /status/{task_id} - Poll a job
///
/// Ids that are unknown, expired or not even UUIDs all read as pending.
pub async fn poll(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<StatusResponse> {
    let Ok(id) = Uuid::parse_str(&task_id) else {
        return Json(StatusResponse {
            task_id,
            status: JobStatus::Pending,
            result: None,
        });
    };

    let snapshot = state.jobs.status(id);
    let result = match snapshot.status {
        JobStatus::Success => snapshot.result,
        JobStatus::Failure => Some(GENERIC_FAILURE.to_string()),
        JobStatus::Pending | JobStatus::Started => None,
    };

    Json(StatusResponse {
        task_id,
        status: snapshot.status,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::jobs::{JobQueue, TaskRunner};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedRunner;

    #[async_trait]
    impl TaskRunner for FixedRunner {
        async fn run(&self, job: RepoJob) -> String {
            format!("# {}", job.collection)
        }
    }

    fn state() -> AppState {
        let jobs = JobQueue::new(Arc::new(FixedRunner), 1, Duration::from_secs(3600));
        AppState::new(Arc::new(Config::default()), jobs)
    }

    #[tokio::test]
    async fn test_submit_rejects_malformed_url() {
        let err = submit(
            State(state()),
            Json(GenerateRequest {
                repo_url: "not a url".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.1.error.starts_with("Invalid repo_url"));
    }

    #[tokio::test]
    async fn test_submit_then_poll() {
        let state = state();
        let (status, Json(resp)) = submit(
            State(state.clone()),
            Json(GenerateRequest {
                repo_url: "https://github.com/acme/widget".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);

        let mut last = None;
        for _ in 0..100 {
            let Json(polled) = poll(State(state.clone()), Path(resp.task_id.to_string())).await;
            if polled.status == JobStatus::Success {
                last = Some(polled);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let polled = last.expect("job did not finish");
        assert_eq!(polled.task_id, resp.task_id.to_string());
        assert_eq!(polled.result.as_deref(), Some("# acme_widget"));
    }

    #[tokio::test]
    async fn test_poll_unknown_id_is_pending() {
        let Json(polled) = poll(State(state()), Path(Uuid::new_v4().to_string())).await;
        assert_eq!(polled.status, JobStatus::Pending);
        assert!(polled.result.is_none());
    }

    #[tokio::test]
    async fn test_poll_malformed_id_is_pending() {
        let Json(polled) = poll(State(state()), Path("not-a-task".to_string())).await;
        assert_eq!(polled.task_id, "not-a-task");
        assert_eq!(polled.status, JobStatus::Pending);
        assert!(polled.result.is_none());

        let body = serde_json::to_value(&polled).unwrap();
        assert_eq!(
            body,
            json!({ "task_id": "not-a-task", "status": "pending", "result": null })
        );
    }
}
