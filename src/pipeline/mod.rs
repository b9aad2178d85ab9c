//! Answer-synthesis pipeline
//!
//! One turn flows through classify, concurrent source fan-out, context
//! assembly, prompt construction and a streamed completion, with every stage
//! reporting progress on the event channel. The pipeline owns the event
//! ordering contract: status events first, then exactly one sources event,
//! then content deltas, then done (or a terminal error).

pub mod context;
pub mod orchestrator;
pub mod prompts;

pub use context::AssembledContext;
pub use context::ContextAssembler;
pub use orchestrator::FanoutOrchestrator;
pub use orchestrator::SourceBundle;
pub use prompts::PromptBuilder;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::adapters::FetchScope;
use crate::adapters::SourceAdapter;
use crate::errors::RepChatError;
use crate::errors::Result;
use crate::intent;
use crate::llm::CompletionOptions;
use crate::llm::LlmProvider;
use crate::models::ChatMessage;
use crate::models::CompanyContext;
use crate::models::Source;
use crate::models::Turn;
use crate::persistence::TurnGuard;
use crate::persistence::TurnSink;

/// Event emitted while a turn is being synthesized. Serialized as the data
/// payload of the matching SSE event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Status { message: String },
    Sources { sources: Vec<Source> },
    Content { text: String },
    Done,
    Error { message: String },
}

impl ChatEvent {
    /// SSE event name for this variant
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Sources { .. } => "sources",
            Self::Content { .. } => "content",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }
}

/// Per-request source toggles. A disabled capability skips its adapter even
/// when the adapter is configured.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub documents: bool,
    pub web: bool,
    pub memory: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            documents: true,
            web: true,
            memory: true,
        }
    }
}

/// Everything one turn needs, already validated by the API layer
#[derive(Debug, Clone)]
pub struct ChatRequestCtx {
    pub query: String,
    pub history: Vec<ChatMessage>,
    pub namespace: Option<String>,
    pub user_id: Option<String>,
    pub chatbot_id: Option<String>,
    pub company: Option<CompanyContext>,
    pub capabilities: Capabilities,
}

/// A fully collected (non-streamed) answer
#[derive(Debug, Clone)]
pub struct CollectedAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// The turn driver. Built once at startup and shared across requests.
pub struct ChatPipeline {
    documents: Option<Arc<dyn SourceAdapter>>,
    web: Option<Arc<dyn SourceAdapter>>,
    memory: Option<Arc<dyn SourceAdapter>>,
    provider: Option<Arc<dyn LlmProvider>>,
    sink: Arc<dyn TurnSink>,
    assembler: ContextAssembler,
    prompt_builder: PromptBuilder,
    options: CompletionOptions,
    adapter_timeout: Duration,
    stream_timeout: Duration,
}

impl ChatPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: Option<Arc<dyn SourceAdapter>>,
        web: Option<Arc<dyn SourceAdapter>>,
        memory: Option<Arc<dyn SourceAdapter>>,
        provider: Option<Arc<dyn LlmProvider>>,
        sink: Arc<dyn TurnSink>,
        options: CompletionOptions,
        history_window: usize,
        adapter_timeout: Duration,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            documents,
            web,
            memory,
            provider,
            sink,
            assembler: ContextAssembler::default(),
            prompt_builder: PromptBuilder::new(history_window),
            options,
            adapter_timeout,
            stream_timeout,
        }
    }

    /// Run one turn, emitting events until done. A pipeline failure becomes
    /// a terminal error event instead of propagating; the channel closing on
    /// the receiver side is treated as client cancellation.
    pub async fn run(&self, ctx: ChatRequestCtx, events: mpsc::Sender<ChatEvent>) {
        if let Err(e) = self.drive(ctx, &events).await {
            info!("Turn ended with error: {e}");
            let _ = events
                .send(ChatEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
    }

    /// Run one turn to completion and return the collected answer. Used by
    /// the non-streaming endpoint.
    pub async fn run_collect(&self, ctx: ChatRequestCtx) -> Result<CollectedAnswer> {
        let (tx, mut rx) = mpsc::channel(64);

        let driver = async {
            let result = self.drive(ctx, &tx).await;
            if let Err(e) = &result {
                let _ = tx
                    .send(ChatEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
            result
        };

        let collector = async {
            let mut answer = String::new();
            let mut sources = Vec::new();
            while let Some(event) = rx.recv().await {
                match event {
                    ChatEvent::Content { text } => answer.push_str(&text),
                    ChatEvent::Sources { sources: s } => sources = s,
                    ChatEvent::Done | ChatEvent::Error { .. } => break,
                    ChatEvent::Status { .. } => {}
                }
            }
            (answer, sources)
        };

        let (result, (answer, sources)) = tokio::join!(driver, collector);
        result?;
        Ok(CollectedAnswer { answer, sources })
    }

    async fn drive(&self, ctx: ChatRequestCtx, events: &mpsc::Sender<ChatEvent>) -> Result<()> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(RepChatError::NoProviderConfigured)?;

        let company_name = ctx.company.as_ref().map(|c| c.name.clone());
        let namespace = ctx
            .namespace
            .clone()
            .or_else(|| ctx.company.as_ref().and_then(|c| c.namespace.clone()));

        let query_intent = intent::classify(
            &ctx.query,
            ctx.company.as_ref(),
            namespace.as_deref(),
            ctx.chatbot_id.as_deref(),
        );
        debug!("Classified query as {:?}", query_intent.kind);

        let _ = events
            .send(ChatEvent::Status {
                message: "Gathering sources".to_string(),
            })
            .await;

        let scope = FetchScope {
            query: ctx.query.clone(),
            namespace,
            user_id: ctx.user_id.clone(),
            company_name,
            intent: query_intent,
        };

        // Per-request orchestrator over the enabled subset; the adapters
        // themselves are shared
        let orchestrator = FanoutOrchestrator::new(
            enabled(&self.documents, ctx.capabilities.documents),
            enabled(&self.web, ctx.capabilities.web),
            enabled(&self.memory, ctx.capabilities.memory),
            self.adapter_timeout,
        );
        let bundle = orchestrator.gather(&scope, events).await;
        let assembled = self.assembler.assemble(bundle);

        // The sources event precedes all content so clients can render the
        // source list before the first token arrives
        let _ = events
            .send(ChatEvent::Sources {
                sources: assembled.sources.clone(),
            })
            .await;

        let mut turn = Turn::new(&ctx.query);
        turn.user_id = ctx.user_id;
        turn.chatbot_id = ctx.chatbot_id;
        let mut guard = TurnGuard::new(self.sink.clone(), turn);
        guard.set_sources(assembled.sources.clone());

        let messages = self.prompt_builder.build(
            &ctx.query,
            &ctx.history,
            ctx.company.as_ref(),
            &assembled.block,
        );

        let mut response = provider.stream_complete(&messages, &self.options).await?;

        let started = Instant::now();
        loop {
            let remaining = self.stream_timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                // Guard drop persists whatever arrived, marked incomplete
                return Err(RepChatError::StreamTimeout(self.stream_timeout.as_secs()));
            }
            match response.next_token(remaining).await {
                None => break,
                Some(Ok(token)) => {
                    if token.is_empty() {
                        continue;
                    }
                    guard.push_token(&token);
                    if events
                        .send(ChatEvent::Content { text: token })
                        .await
                        .is_err()
                    {
                        // Client went away; the guard persists the partial
                        debug!("Event channel closed mid-stream, stopping turn");
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(e),
            }
        }

        // Citation markers outside 1..=N signal a model that ignored the
        // context block; logged for operators, never rewritten
        let dangling = context::citation_indices(guard.answer())
            .into_iter()
            .filter(|&n| n == 0 || n > assembled.sources.len())
            .count();
        if dangling > 0 {
            warn!("Answer contains {dangling} citation markers with no matching source");
        }

        info!(
            "Turn complete ({} chars, {} sources)",
            guard.answer_len(),
            assembled.sources.len()
        );
        guard.complete();
        let _ = events.send(ChatEvent::Done).await;
        Ok(())
    }
}

fn enabled(
    adapter: &Option<Arc<dyn SourceAdapter>>,
    capability: bool,
) -> Option<Arc<dyn SourceAdapter>> {
    if capability {
        adapter.clone()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::llm::StreamingResponse;
    use crate::models::SourceKind;

    struct StubAdapter(Vec<Source>);

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn fetch(&self, _scope: &FetchScope) -> Vec<Source> {
            self.0.clone()
        }
    }

    struct StubProvider {
        tokens: Vec<Result<String>>,
    }

    impl StubProvider {
        fn with_text(parts: &[&str]) -> Self {
            Self {
                tokens: parts.iter().map(|p| Ok((*p).to_string())).collect(),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn stream_complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<StreamingResponse> {
            let tokens: Vec<Result<String>> = self
                .tokens
                .iter()
                .map(|t| match t {
                    Ok(s) => Ok(s.clone()),
                    Err(_) => Err(RepChatError::Http("stream broke".to_string())),
                })
                .collect();
            Ok(StreamingResponse::new(Box::pin(futures::stream::iter(
                tokens,
            ))))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        turns: Mutex<Vec<Turn>>,
    }

    #[async_trait]
    impl crate::persistence::TurnSink for RecordingSink {
        async fn persist(&self, turn: Turn) {
            self.turns.lock().await.push(turn);
        }
    }

    fn pipeline(
        provider: Option<Arc<dyn LlmProvider>>,
        sink: Arc<RecordingSink>,
    ) -> ChatPipeline {
        let doc = Source::new("doc", "https://example.com/doc", "doc text", SourceKind::Document);
        ChatPipeline::new(
            Some(Arc::new(StubAdapter(vec![doc]))),
            None,
            None,
            provider,
            sink,
            CompletionOptions::default(),
            5,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    fn ctx(query: &str) -> ChatRequestCtx {
        ChatRequestCtx {
            query: query.to_string(),
            history: Vec::new(),
            namespace: Some("ns".to_string()),
            user_id: Some("u1".to_string()),
            chatbot_id: None,
            company: None,
            capabilities: Capabilities::default(),
        }
    }

    async fn collect_events(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn events_arrive_in_contract_order() {
        let sink = Arc::new(RecordingSink::default());
        let provider: Arc<dyn LlmProvider> =
            Arc::new(StubProvider::with_text(&["Hello", " world"]));
        let pipeline = pipeline(Some(provider), sink.clone());

        let (tx, rx) = mpsc::channel(64);
        pipeline.run(ctx("what is this?"), tx).await;
        let events = collect_events(rx).await;

        let sources_at = events
            .iter()
            .position(|e| matches!(e, ChatEvent::Sources { .. }))
            .unwrap();
        let first_content = events
            .iter()
            .position(|e| matches!(e, ChatEvent::Content { .. }))
            .unwrap();
        assert!(sources_at < first_content);
        assert!(matches!(events.last(), Some(ChatEvent::Done)));

        // Concatenated deltas reproduce the full answer in order
        let answer: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Content { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(answer, "Hello world");
    }

    #[tokio::test]
    async fn completed_turn_is_persisted_with_sources() {
        let sink = Arc::new(RecordingSink::default());
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider::with_text(&["answer [1]"]));
        let pipeline = pipeline(Some(provider), sink.clone());

        let (tx, rx) = mpsc::channel(64);
        pipeline.run(ctx("q"), tx).await;
        collect_events(rx).await;
        tokio::task::yield_now().await;

        let turns = sink.turns.lock().await;
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].answer, "answer [1]");
        assert_eq!(turns[0].sources.len(), 1);
        assert!(!turns[0].incomplete);
    }

    #[tokio::test]
    async fn missing_provider_fails_fast_with_error_event() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(None, sink.clone());

        let (tx, rx) = mpsc::channel(64);
        pipeline.run(ctx("q"), tx).await;
        let events = collect_events(rx).await;

        assert!(matches!(events.last(), Some(ChatEvent::Error { .. })));
        assert!(!events.iter().any(|e| matches!(e, ChatEvent::Done)));
        assert!(sink.turns.lock().await.is_empty());
    }

    #[tokio::test]
    async fn mid_stream_failure_persists_partial_as_incomplete() {
        let sink = Arc::new(RecordingSink::default());
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider {
            tokens: vec![
                Ok("partial ".to_string()),
                Err(RepChatError::Http("boom".to_string())),
            ],
        });
        let pipeline = pipeline(Some(provider), sink.clone());

        let (tx, rx) = mpsc::channel(64);
        pipeline.run(ctx("q"), tx).await;
        let events = collect_events(rx).await;
        tokio::task::yield_now().await;

        assert!(matches!(events.last(), Some(ChatEvent::Error { .. })));
        let turns = sink.turns.lock().await;
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].answer, "partial ");
        assert!(turns[0].incomplete);
    }

    #[tokio::test]
    async fn dropped_receiver_persists_partial_as_incomplete() {
        let sink = Arc::new(RecordingSink::default());
        let provider: Arc<dyn LlmProvider> =
            Arc::new(StubProvider::with_text(&["a", "b", "c", "d"]));
        let pipeline = pipeline(Some(provider), sink.clone());

        // Tiny channel, receiver dropped immediately: sends fail mid-stream
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        pipeline.run(ctx("q"), tx).await;
        tokio::task::yield_now().await;

        let turns = sink.turns.lock().await;
        assert_eq!(turns.len(), 1);
        assert!(turns[0].incomplete);
    }

    #[tokio::test]
    async fn disabled_capability_skips_its_adapter() {
        let sink = Arc::new(RecordingSink::default());
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider::with_text(&["ok"]));
        let pipeline = pipeline(Some(provider), sink);

        let mut request = ctx("q");
        request.capabilities.documents = false;

        let (tx, rx) = mpsc::channel(64);
        pipeline.run(request, tx).await;
        let events = collect_events(rx).await;

        let sources = events.iter().find_map(|e| match e {
            ChatEvent::Sources { sources } => Some(sources.clone()),
            _ => None,
        });
        assert!(sources.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_collect_returns_full_answer_and_sources() {
        let sink = Arc::new(RecordingSink::default());
        let provider: Arc<dyn LlmProvider> =
            Arc::new(StubProvider::with_text(&["full ", "answer"]));
        let pipeline = pipeline(Some(provider), sink);

        let collected = pipeline.run_collect(ctx("q")).await.unwrap();
        assert_eq!(collected.answer, "full answer");
        assert_eq!(collected.sources.len(), 1);
    }

    #[tokio::test]
    async fn run_collect_propagates_provider_absence() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(None, sink);
        let result = pipeline.run_collect(ctx("q")).await;
        assert!(matches!(result, Err(RepChatError::NoProviderConfigured)));
    }
}
