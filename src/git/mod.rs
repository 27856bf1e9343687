//! Repository fetching: clone into a scratch directory, keep the text-like files.

mod clone;
mod scratch;

pub use clone::{clone_repo, collect_documents, fetch_repository, FetchOptions, ALLOWED_SUFFIXES};
pub use scratch::ScratchDir;
