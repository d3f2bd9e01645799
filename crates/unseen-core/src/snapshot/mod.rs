use std::future::Future;

use anyhow::Result;

use crate::models::ConversationSummary;

pub mod http;

pub use http::{HttpLoaderConfig, HttpSnapshotLoader};

/// Source of conversation summaries (initial load and periodic refresh).
///
/// The runtime stamps each result with the instant the fetch was issued, so
/// implementations only return the list.
pub trait SnapshotLoader: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Vec<ConversationSummary>>> + Send;
}
