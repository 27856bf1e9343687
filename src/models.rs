use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One README generation request, identified by its repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoJob {
    pub url: String,
    /// Vector collection name and scratch directory name derived from the URL
    pub collection: String,
}

impl RepoJob {
    /// Validate a repository URL and derive its collection identifier.
    pub fn parse(url: &str) -> Result<Self, String> {
        let trimmed = url.trim();
        let parsed = reqwest::Url::parse(trimmed).map_err(|e| format!("invalid URL: {e}"))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err("only http:// and https:// URLs are allowed".to_string());
        }
        let host = match parsed.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err("URL must include a host".to_string()),
        };

        let path = parsed.path().trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let source = if path.is_empty() { host.as_str() } else { path };

        Ok(Self {
            url: trimmed.to_string(),
            collection: collection_identifier(source),
        })
    }

    /// Scratch directory this job clones into.
    pub fn scratch_path(&self, scratch_root: &std::path::Path) -> PathBuf {
        scratch_root.join(&self.collection)
    }
}

/// Collection ids double as directory names, so a leading `.` (and with it
/// `.` and `..`) is rewritten to `_`.
fn collection_identifier(path: &str) -> String {
    let mut id: String = path
        .chars()
        .map(|c| match c {
            '/' => '_',
            c if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') => c,
            _ => '_',
        })
        .collect();
    let dots = id.len() - id.trim_start_matches('.').len();
    id.replace_range(..dots, &"_".repeat(dots));
    id
}

/// A file pulled out of a cloned repository.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Path relative to the repository root
    pub source_path: String,
    pub content: String,
    /// Matched suffix from the allowed set, e.g. ".py" or "Dockerfile"
    pub extension: String,
}

/// A window of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    pub chunk_index: usize,
}

/// A chunk paired with its embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub text: String,
    pub source_path: String,
    pub embedding: Vec<f32>,
}

/// README sections, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Overview,
    KeyFeatures,
    Installation,
    Usage,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Overview,
        Section::KeyFeatures,
        Section::Installation,
        Section::Usage,
    ];

    /// Display name, also used verbatim as the retrieval query.
    pub fn name(&self) -> &'static str {
        match self {
            Section::Overview => "Project Title and Overview",
            Section::KeyFeatures => "Key Features",
            Section::Installation => "Installation Instructions",
            Section::Usage => "Usage Guide",
        }
    }
}

/// Streamed text for one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionResult {
    pub section: Section,
    pub markdown: String,
    /// The stream ended early and `markdown` holds only what arrived
    pub truncated: bool,
}

/// Job lifecycle as reported to pollers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Started,
    Success,
    Failure,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }
}

/// Generate request
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub repo_url: String,
}

/// Returned by `POST /generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: Uuid,
}

/// Returned by `GET /status/{task_id}`, echoing the id as given
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub task_id: String,
    pub status: JobStatus,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
