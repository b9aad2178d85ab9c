//! Concurrent source fan-out
//!
//! All applicable adapters are invoked without waiting on each other; results
//! are collected at a join barrier. Each adapter runs behind its own timeout
//! so a hung provider contributes an empty list instead of stalling the turn,
//! and total wall-clock time tracks the slowest adapter rather than the sum.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use crate::adapters::FetchScope;
use crate::adapters::SourceAdapter;
use crate::models::Source;
use crate::pipeline::ChatEvent;

/// Per-group fan-out results, still in adapter order
#[derive(Debug, Clone, Default)]
pub struct SourceBundle {
    pub documents: Vec<Source>,
    pub web: Vec<Source>,
    pub memory: Vec<Source>,
}

impl SourceBundle {
    pub fn total(&self) -> usize {
        self.documents.len() + self.web.len() + self.memory.len()
    }
}

/// Fans out to the configured adapters and joins their results
pub struct FanoutOrchestrator {
    documents: Option<Arc<dyn SourceAdapter>>,
    web: Option<Arc<dyn SourceAdapter>>,
    memory: Option<Arc<dyn SourceAdapter>>,
    adapter_timeout: Duration,
}

impl FanoutOrchestrator {
    pub fn new(
        documents: Option<Arc<dyn SourceAdapter>>,
        web: Option<Arc<dyn SourceAdapter>>,
        memory: Option<Arc<dyn SourceAdapter>>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            documents,
            web,
            memory,
            adapter_timeout,
        }
    }

    /// Run all configured adapters concurrently. A status event is emitted
    /// as each adapter completes; event-send failures mean the caller went
    /// away and are ignored here (the pipeline notices on its own sends).
    pub async fn gather(
        &self,
        scope: &FetchScope,
        events: &mpsc::Sender<ChatEvent>,
    ) -> SourceBundle {
        let (documents, web, memory) = tokio::join!(
            self.run_adapter(self.documents.as_ref(), scope, events),
            self.run_adapter(self.web.as_ref(), scope, events),
            self.run_adapter(self.memory.as_ref(), scope, events),
        );

        let bundle = SourceBundle {
            documents,
            web,
            memory,
        };
        debug!("Fan-out gathered {} sources", bundle.total());
        bundle
    }

    async fn run_adapter(
        &self,
        adapter: Option<&Arc<dyn SourceAdapter>>,
        scope: &FetchScope,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Vec<Source> {
        let Some(adapter) = adapter else {
            return Vec::new();
        };

        let sources = match tokio::time::timeout(self.adapter_timeout, adapter.fetch(scope)).await {
            Ok(sources) => sources,
            Err(_) => {
                warn!(
                    "Adapter {} timed out after {:?}, contributing no sources",
                    adapter.name(),
                    self.adapter_timeout
                );
                Vec::new()
            }
        };

        let _ = events
            .send(ChatEvent::Status {
                message: format!("{}: {} result(s)", adapter.name(), sources.len()),
            })
            .await;

        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::models::SourceKind;

    /// Test adapter with a configurable delay and payload
    struct StubAdapter {
        name: &'static str,
        delay: Duration,
        sources: Vec<Source>,
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _scope: &FetchScope) -> Vec<Source> {
            tokio::time::sleep(self.delay).await;
            self.sources.clone()
        }
    }

    fn stub(name: &'static str, delay_ms: u64, kind: SourceKind) -> Arc<dyn SourceAdapter> {
        Arc::new(StubAdapter {
            name,
            delay: Duration::from_millis(delay_ms),
            sources: vec![Source::new(name, format!("#{name}"), "text", kind)],
        })
    }

    fn scope() -> FetchScope {
        FetchScope {
            query: "q".to_string(),
            namespace: Some("ns".to_string()),
            user_id: Some("u".to_string()),
            company_name: None,
            intent: crate::intent::classify("q", None, Some("ns"), None),
        }
    }

    #[tokio::test]
    async fn slow_adapters_run_concurrently() {
        let orchestrator = FanoutOrchestrator::new(
            Some(stub("documents", 50, SourceKind::Document)),
            Some(stub("web", 50, SourceKind::Web)),
            Some(stub("memory", 50, SourceKind::Memory)),
            Duration::from_secs(5),
        );
        let (tx, _rx) = mpsc::channel(16);

        let start = std::time::Instant::now();
        let bundle = orchestrator.gather(&scope(), &tx).await;
        // Wall clock tracks the slowest adapter, not the sum
        assert!(start.elapsed() < Duration::from_millis(140));
        assert_eq!(bundle.total(), 3);
    }

    #[tokio::test]
    async fn hung_adapter_contributes_empty_on_timeout() {
        let orchestrator = FanoutOrchestrator::new(
            Some(stub("documents", 10, SourceKind::Document)),
            Some(stub("web", 10_000, SourceKind::Web)), // hangs past the timeout
            Some(stub("memory", 10, SourceKind::Memory)),
            Duration::from_millis(100),
        );
        let (tx, _rx) = mpsc::channel(16);

        let bundle = orchestrator.gather(&scope(), &tx).await;
        assert_eq!(bundle.documents.len(), 1);
        assert!(bundle.web.is_empty());
        assert_eq!(bundle.memory.len(), 1);
    }

    #[tokio::test]
    async fn status_event_emitted_per_adapter() {
        let orchestrator = FanoutOrchestrator::new(
            Some(stub("documents", 1, SourceKind::Document)),
            Some(stub("web", 1, SourceKind::Web)),
            None,
            Duration::from_secs(1),
        );
        let (tx, mut rx) = mpsc::channel(16);

        orchestrator.gather(&scope(), &tx).await;
        drop(tx);

        let mut statuses = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, ChatEvent::Status { .. }) {
                statuses += 1;
            }
        }
        assert_eq!(statuses, 2);
    }

    #[tokio::test]
    async fn missing_adapters_yield_empty_groups() {
        let orchestrator = FanoutOrchestrator::new(None, None, None, Duration::from_secs(1));
        let (tx, _rx) = mpsc::channel(16);
        let bundle = orchestrator.gather(&scope(), &tx).await;
        assert_eq!(bundle.total(), 0);
    }
}
