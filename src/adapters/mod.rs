//! Source adapters
//!
//! Each adapter wraps one external capability (vector documents, live web
//! search, conversational memory) and normalizes provider responses into the
//! common [`Source`] shape. Adapters never error outward: a provider failure
//! is logged and yields an empty list, so one failing source degrades answer
//! quality but never aborts the turn.

pub mod cache;
pub mod documents;
pub mod memory;
pub mod web;

pub use cache::CacheStats;
pub use cache::SearchCache;
pub use documents::DocumentSearchAdapter;
pub use documents::VectorIndexClient;
pub use memory::MemoryAdapter;
pub use memory::MemoryClient;
pub use web::WebSearchAdapter;
pub use web::WebSearchClient;

use async_trait::async_trait;

use crate::intent::QueryIntent;
use crate::models::Source;

/// Everything an adapter may need to scope one fetch. Each adapter picks the
/// fields it cares about and ignores the rest.
#[derive(Debug, Clone)]
pub struct FetchScope {
    pub query: String,
    pub namespace: Option<String>,
    pub user_id: Option<String>,
    pub company_name: Option<String>,
    pub intent: QueryIntent,
}

/// Common adapter seam: `fetch` must never fail the turn.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name used in status events and logs
    fn name(&self) -> &'static str;

    /// Fetch normalized sources for the scope. Provider errors are handled
    /// internally; an empty vec is the only failure mode visible here.
    async fn fetch(&self, scope: &FetchScope) -> Vec<Source>;
}
