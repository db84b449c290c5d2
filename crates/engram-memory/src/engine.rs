// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine handle: all per-process state behind the four host hooks.
//!
//! Nothing thrown escapes a hook. Every failure is caught at the hook's
//! top level and logged with source context; the user-visible failure
//! mode is reduced context injection, never a broken prompt. Without an
//! embedding adapter the engine is dormant and every hook is a no-op.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use engram_config::EngramConfig;
use engram_context::{BudgetItem, BudgetManager, BudgetTier, CompactionStrategy, OutputCompactor};
use engram_core::{
    ChatMessage, EmbeddingAdapter, EmbeddingInput, EmbeddingTask, EngramError, ExternalTools,
    MessageRole, PromptInjection, SummarizerAdapter, Table, VectorStoreAdapter,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::active::{assess_uncertainty, ActiveRetriever};
use crate::decay::DecayManager;
use crate::episode::{AddOutcome, EpisodeBuilder};
use crate::extractor::SemanticExtractor;
use crate::feedback::FeedbackTuner;
use crate::observe::{ObservabilityReport, ObservabilityRing};
use crate::preload::{build_preload_rules, PreloadRule};
use crate::profile::ProfileBuilder;
use crate::retriever::TopDownRetriever;
use crate::temporal::{
    build_durative_memories, extract_semantic_time, parse_temporal_intent, rerank_episodes,
    TemporalEventRing,
};
use crate::theme::ThemeManager;
use crate::toolkit::MemoryToolkit;
use crate::types::{
    DurativeMemory, Episode, RetrievalTrace, Satisfaction, Semantic, TemporalEvent,
};

/// Minimum prompt length for retrieval to engage.
const MIN_PROMPT_CHARS: usize = 4;
/// Recent queries kept for repeated-question detection.
const RECENT_QUERY_WINDOW: usize = 8;
/// Fact preview length in traces.
const PREVIEW_CHARS: usize = 80;

/// The hierarchical conversational-memory engine.
///
/// One handle per process; per-session state (episode buffers) lives in
/// an internal map keyed by session id. All shared mutable state is
/// owned here explicitly, never in process-level singletons.
pub struct MemoryEngine {
    config: EngramConfig,
    store: Arc<dyn VectorStoreAdapter>,
    embedder: Option<Arc<dyn EmbeddingAdapter>>,
    summarizer: Option<Arc<dyn SummarizerAdapter>>,
    tools: ExternalTools,

    themes: ThemeManager,
    retriever: TopDownRetriever,
    extractor: SemanticExtractor,
    toolkit: MemoryToolkit,
    active: ActiveRetriever,
    decay: DecayManager,
    profiles: ProfileBuilder,
    compactor: OutputCompactor,

    builders: DashMap<String, EpisodeBuilder>,
    temporal_ring: Mutex<TemporalEventRing>,
    duratives: Mutex<Vec<DurativeMemory>>,
    traces: Mutex<ObservabilityRing>,
    tuner: Mutex<FeedbackTuner>,
    preload_rules: RwLock<Vec<PreloadRule>>,
    recent_queries: Mutex<VecDeque<String>>,

    dormant_logged: AtomicBool,
    summarizer_missing_logged: AtomicBool,
}

impl MemoryEngine {
    pub fn new(
        config: EngramConfig,
        store: Arc<dyn VectorStoreAdapter>,
        embedder: Option<Arc<dyn EmbeddingAdapter>>,
        summarizer: Option<Arc<dyn SummarizerAdapter>>,
        tools: ExternalTools,
    ) -> Self {
        let themes = ThemeManager::new(store.clone(), config.engine.max_themes);
        let retriever = TopDownRetriever::new(store.clone(), config.budget.token_budget)
            .with_decay(config.decay.clone());
        let decay = DecayManager::new(store.clone(), config.decay.clone());
        let profiles = ProfileBuilder::new(store.clone());
        Self {
            themes,
            retriever,
            extractor: SemanticExtractor::new(),
            toolkit: MemoryToolkit::new(),
            active: ActiveRetriever::new(tools.clone()),
            decay,
            profiles,
            compactor: OutputCompactor::default(),
            builders: DashMap::new(),
            temporal_ring: Mutex::new(TemporalEventRing::new()),
            duratives: Mutex::new(Vec::new()),
            traces: Mutex::new(ObservabilityRing::new()),
            tuner: Mutex::new(FeedbackTuner::new()),
            preload_rules: RwLock::new(Vec::new()),
            recent_queries: Mutex::new(VecDeque::new()),
            dormant_logged: AtomicBool::new(false),
            summarizer_missing_logged: AtomicBool::new(false),
            config,
            store,
            embedder,
            summarizer,
            tools,
        }
    }

    /// Whether the engine can do anything at all this process.
    pub fn is_dormant(&self) -> bool {
        !self.config.engine.enabled || self.embedder.is_none()
    }

    fn note_dormant(&self) -> bool {
        if !self.is_dormant() {
            return false;
        }
        if !self.dormant_logged.swap(true, Ordering::Relaxed) {
            info!("engram engine dormant: disabled or no embedding adapter configured");
        }
        true
    }

    fn summarizer_or_note(&self) -> Option<&Arc<dyn SummarizerAdapter>> {
        match &self.summarizer {
            Some(s) => Some(s),
            None => {
                if !self.summarizer_missing_logged.swap(true, Ordering::Relaxed) {
                    info!("summarizer callback absent; episode building disabled");
                }
                None
            }
        }
    }

    // ---- Hook: before_prompt_build ----

    /// Retrieve and render a context bundle for the incoming prompt.
    ///
    /// Returns `None` for prompts under four characters, on any internal
    /// failure, or when nothing relevant is stored.
    pub async fn before_prompt_build(
        &self,
        session_id: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Option<PromptInjection> {
        if self.note_dormant() {
            return None;
        }
        if prompt.chars().count() < MIN_PROMPT_CHARS {
            return None;
        }
        match self.retrieve_and_render(session_id, prompt, cancel).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, hook = "before_prompt_build", "hook failed, skipping injection");
                None
            }
        }
    }

    async fn retrieve_and_render(
        &self,
        session_id: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<PromptInjection>, EngramError> {
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(None);
        };
        let output = embedder
            .embed(EmbeddingInput {
                texts: vec![prompt.to_string()],
                task: EmbeddingTask::Query,
            })
            .await?;
        let query_embedding = output.embeddings.into_iter().next().ok_or_else(|| {
            EngramError::Embedding {
                message: "embedding returned no results".into(),
                source: None,
            }
        })?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let alpha = self.tuner.lock().unwrap().alpha();
        let mut bundle = self
            .retriever
            .retrieve(
                prompt,
                &query_embedding,
                self.summarizer.as_deref(),
                alpha,
            )
            .await?;

        let now = chrono::Utc::now().timestamp_millis();
        let intent = parse_temporal_intent(prompt, now);
        if intent.is_temporal {
            let events = self.temporal_ring.lock().unwrap().snapshot();
            bundle.episodes = rerank_episodes(std::mem::take(&mut bundle.episodes), &events, &intent);
        }

        self.push_recent_query(prompt);
        self.record_trace(session_id, prompt, &bundle, now);

        if bundle.is_empty() {
            return Ok(None);
        }

        let injection = self.render_injection(session_id, &bundle, now).await;
        if injection.system_prompt.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(injection))
    }

    async fn render_injection(
        &self,
        session_id: &str,
        bundle: &crate::types::RetrievalBundle,
        now: i64,
    ) -> PromptInjection {
        let mut items = Vec::new();

        if let Ok(Some(profile)) = self.profiles.latest(session_id, now).await {
            let mut text = String::from("## User profile\n");
            if !profile.behavioral.is_empty() {
                text.push_str(&profile.behavioral);
                text.push('\n');
            }
            if !profile.global_summary.is_empty() {
                text.push_str(&profile.global_summary);
                text.push('\n');
            }
            items.push(BudgetItem::new(BudgetTier::Identity, "profile", text));
        }

        if !bundle.semantics.is_empty() {
            let mut text = String::from("## Relevant memories\n");
            for theme in &bundle.themes {
                text.push_str(&format!("### {}\n", theme.name));
                for semantic in &bundle.semantics {
                    if semantic.theme_id == theme.id {
                        text.push_str(&format!("- {}\n", semantic.content));
                    }
                }
            }
            items.push(BudgetItem::new(BudgetTier::Memory, "facts", text));
        }

        if !bundle.episodes.is_empty() {
            let mut text = String::from("## Earlier conversations\n");
            for episode in &bundle.episodes {
                text.push_str(&format!("- {}\n", episode.summary));
            }
            items.push(BudgetItem::new(BudgetTier::Extras, "episodes", text));
        }

        let report = BudgetManager::with_total(self.config.budget.token_budget).allocate(items);
        let system_prompt = report
            .items
            .iter()
            .map(|item| item.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        PromptInjection {
            system_prompt,
            tokens: report.total_used,
        }
    }

    fn push_recent_query(&self, query: &str) {
        let mut recent = self.recent_queries.lock().unwrap();
        if recent.len() >= RECENT_QUERY_WINDOW {
            recent.pop_front();
        }
        recent.push_back(query.to_string());
    }

    fn record_trace(
        &self,
        session_id: &str,
        query: &str,
        bundle: &crate::types::RetrievalBundle,
        now: i64,
    ) {
        let trace = RetrievalTrace {
            query: query.to_string(),
            timestamp: now,
            theme_ids: bundle.themes.iter().map(|t| t.id.clone()).collect(),
            fact_previews: bundle
                .semantics
                .iter()
                .map(|s| s.content.chars().take(PREVIEW_CHARS).collect())
                .collect(),
            episode_ids: bundle.episodes.iter().map(|e| e.id.clone()).collect(),
            decision: bundle.decision,
            tokens: bundle.estimated_tokens,
            satisfaction: Satisfaction::Unknown,
            agent_id: session_id.to_string(),
        };
        self.traces.lock().unwrap().record(trace);
    }

    // ---- Hook: tool_result_persist ----

    /// Compact a tool result before it re-enters the prompt. Returns a
    /// replacement only when compaction actually changed the text.
    pub async fn tool_result_persist(
        &self,
        tool_name: &str,
        result: &str,
        _cancel: &CancellationToken,
    ) -> Option<String> {
        if self.note_dormant() {
            return None;
        }
        let outcome = self
            .compactor
            .compact(result, self.summarizer.as_deref())
            .await;
        debug!(
            tool = tool_name,
            strategy = ?outcome.strategy,
            original = outcome.original_tokens,
            compacted = outcome.final_tokens,
            "tool result compaction"
        );
        if outcome.strategy == CompactionStrategy::Passthrough {
            return None;
        }
        Some(outcome.text)
    }

    // ---- Hook: agent_end ----

    /// Fold a finished turn into memory: buffer messages, flush episodes,
    /// extract facts, maintain themes, update the temporal overlay, and
    /// run the toolkit and active-retrieval passes.
    pub async fn agent_end(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) {
        if self.note_dormant() {
            return;
        }
        let mut builder = self
            .builders
            .remove(session_id)
            .map(|(_, b)| b)
            .unwrap_or_else(|| {
                EpisodeBuilder::new(session_id, self.config.engine.episode_batch_size)
            });

        if let Err(e) = self.ingest(&mut builder, messages, cancel).await {
            if e.is_transient() {
                warn!(error = %e, hook = "agent_end", "build step skipped this turn");
            } else {
                warn!(error = %e, hook = "agent_end", "memory build failed");
            }
        }
        // The buffer (including anything uncommitted after cancellation)
        // survives for the next turn.
        self.builders.insert(session_id.to_string(), builder);

        if let Err(e) = self.post_turn(messages, cancel).await {
            warn!(error = %e, hook = "agent_end", "post-turn pass failed");
        }
    }

    async fn ingest(
        &self,
        builder: &mut EpisodeBuilder,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<(), EngramError> {
        let Some(summarizer) = self.summarizer_or_note().cloned() else {
            return Ok(());
        };
        for message in messages {
            if cancel.is_cancelled() {
                // Keep buffering (cheap, synchronous); only the outbound
                // flush work stops. The buffer flushes next turn.
                builder.buffer_message(message.clone());
                continue;
            }
            match builder.add(message.clone()) {
                AddOutcome::Buffered => {}
                AddOutcome::BatchReady => {
                    self.flush_and_index(builder, &summarizer).await?;
                }
                AddOutcome::TopicSwitch => {
                    self.flush_and_index(builder, &summarizer).await?;
                    // Start the new buffer with the switching message.
                    builder.add(message.clone());
                }
            }
        }
        Ok(())
    }

    async fn flush_and_index(
        &self,
        builder: &mut EpisodeBuilder,
        summarizer: &Arc<dyn SummarizerAdapter>,
    ) -> Result<(), EngramError> {
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(());
        };
        let Some(episode) = builder.flush(summarizer.as_ref(), embedder.as_ref()).await? else {
            return Ok(());
        };
        self.store.add(Table::Episodes, &episode.to_record()).await?;

        let mut facts = self
            .extractor
            .extract(&episode, summarizer.as_ref(), embedder.as_ref(), self.store.as_ref())
            .await?;
        for fact in &mut facts {
            self.themes.assign(fact, summarizer.as_ref()).await?;
        }
        self.themes.rebuild_knn().await?;

        self.index_temporal(&episode);
        Ok(())
    }

    fn index_temporal(&self, episode: &Episode) {
        let (semantic_time, duration_ms) =
            extract_semantic_time(&episode.summary, episode.created_at);
        let event = TemporalEvent {
            id: episode.id.clone(),
            content: episode.summary.clone(),
            semantic_time,
            dialogue_time: episode.created_at,
            duration_ms,
            episode_id: episode.id.clone(),
            embedding: episode.embedding.clone(),
        };
        let mut ring = self.temporal_ring.lock().unwrap();
        ring.push(event);
        let rebuilt = build_durative_memories(&ring.snapshot());
        drop(ring);
        *self.duratives.lock().unwrap() = rebuilt;
    }

    /// Toolkit decisions and uncertainty-driven verification for the turn.
    async fn post_turn(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<(), EngramError> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let user_query = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let answer = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if answer.is_empty() {
            return Ok(());
        }

        // Verification first: the chain must see the memory as it was
        // when the answer was produced, not what this turn stores.
        let recent: Vec<String> = self.recent_queries.lock().unwrap().iter().cloned().collect();
        let signal = assess_uncertainty(answer, user_query, &recent);
        let outcome = self.active.investigate(&signal, user_query, answer).await?;
        if outcome.verified && !outcome.proposed_facts.is_empty() {
            if let Some(memory) = &self.tools.memory {
                for fact in &outcome.proposed_facts {
                    if let Err(e) = memory.store(fact, "verified", 0.8).await {
                        warn!(error = %e, "failed to store verified fact");
                    }
                }
            }
        }

        let existing = match &self.tools.memory {
            Some(memory) => memory.recall(user_query).await.unwrap_or_default(),
            None => vec![],
        };
        let decisions = self.toolkit.decide(user_query, answer, &existing);
        if !decisions.is_empty() {
            let report = self.toolkit.execute(&decisions, &self.tools).await;
            debug!(
                decisions = decisions.len(),
                applied = report.applied,
                failed = report.failed,
                "toolkit pass complete"
            );
        }
        Ok(())
    }

    // ---- Hook: cron_weekly ----

    /// Weekly maintenance: decay and dedup sweeps, profile rebuilds,
    /// feedback tuning, and preload-rule learning.
    pub async fn cron_weekly(&self, cancel: &CancellationToken) {
        if self.note_dormant() {
            return;
        }
        if let Err(e) = self.weekly_inner(cancel).await {
            warn!(error = %e, hook = "cron_weekly", "weekly maintenance failed");
        }
    }

    async fn weekly_inner(&self, cancel: &CancellationToken) -> Result<(), EngramError> {
        let now = chrono::Utc::now().timestamp_millis();
        let report = self.decay.sweep(now).await?;
        let removed = self.decay.dedup_sweep().await?;
        debug!(?report, dedup_removed = removed, "weekly sweeps done");
        if cancel.is_cancelled() {
            return Ok(());
        }

        if let Some(summarizer) = self.summarizer.clone() {
            self.rebuild_profiles(summarizer.as_ref(), now).await?;
        }
        if cancel.is_cancelled() {
            return Ok(());
        }

        let traces = self.traces.lock().unwrap().snapshot();
        self.tuner.lock().unwrap().tune(&traces);

        let observations = self.preload_observations().await?;
        *self.preload_rules.write().unwrap() = build_preload_rules(&observations);
        Ok(())
    }

    async fn rebuild_profiles(
        &self,
        summarizer: &dyn SummarizerAdapter,
        now: i64,
    ) -> Result<(), EngramError> {
        const WEEK_MS: i64 = 7 * 86_400_000;
        let mut by_session: std::collections::HashMap<String, Vec<Episode>> =
            std::collections::HashMap::new();
        for record in self.store.scan_all(Table::Episodes).await? {
            let episode = Episode::from_record(&record);
            if now - episode.created_at <= WEEK_MS {
                by_session
                    .entry(episode.session_id.clone())
                    .or_default()
                    .push(episode);
            }
        }
        for (session_id, episodes) in by_session {
            self.profiles
                .rebuild_weekly(&session_id, &episodes, summarizer, now)
                .await?;
        }
        Ok(())
    }

    async fn preload_observations(&self) -> Result<Vec<(i64, String)>, EngramError> {
        let mut episode_times: std::collections::HashMap<String, i64> =
            std::collections::HashMap::new();
        for record in self.store.scan_all(Table::Episodes).await? {
            let episode = Episode::from_record(&record);
            episode_times.insert(episode.id, episode.created_at);
        }
        let mut observations = Vec::new();
        for record in self.store.scan_all(Table::Semantics).await? {
            let semantic = Semantic::from_record(&record);
            for episode_id in &semantic.episode_ids {
                if let Some(created_at) = episode_times.get(episode_id) {
                    observations.push((*created_at, semantic.theme_id.clone()));
                }
            }
        }
        Ok(observations)
    }

    // ---- Introspection ----

    pub fn observability_report(&self) -> ObservabilityReport {
        self.traces.lock().unwrap().report()
    }

    pub fn alpha(&self) -> f64 {
        self.tuner.lock().unwrap().alpha()
    }

    pub fn preload_rules(&self) -> Vec<PreloadRule> {
        self.preload_rules.read().unwrap().clone()
    }

    pub fn durative_memories(&self) -> Vec<DurativeMemory> {
        self.duratives.lock().unwrap().clone()
    }

    pub async fn sparsity(&self) -> Result<f64, EngramError> {
        self.themes.sparsity().await
    }

    /// A stable id helper for hosts that need one.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_store::SqliteVectorStore;
    use engram_test_utils::{MockEmbedder, MockSummarizer};

    async fn engine_with(
        summarizer: MockSummarizer,
    ) -> (Arc<MemoryEngine>, Arc<SqliteVectorStore>) {
        let store = Arc::new(SqliteVectorStore::open(None).await.unwrap());
        let engine = MemoryEngine::new(
            EngramConfig::default(),
            store.clone(),
            Some(Arc::new(MockEmbedder::new(32))),
            Some(Arc::new(summarizer)),
            ExternalTools::default(),
        );
        (Arc::new(engine), store)
    }

    fn user(text: &str) -> ChatMessage {
        ChatMessage::new(MessageRole::User, text)
    }

    fn assistant(text: &str) -> ChatMessage {
        ChatMessage::new(MessageRole::Assistant, text)
    }

    #[tokio::test]
    async fn dormant_without_embedder() {
        let store = Arc::new(SqliteVectorStore::open(None).await.unwrap());
        let engine = MemoryEngine::new(
            EngramConfig::default(),
            store,
            None,
            None,
            ExternalTools::default(),
        );
        assert!(engine.is_dormant());
        let cancel = CancellationToken::new();
        assert!(engine.before_prompt_build("s1", "hello there", &cancel).await.is_none());
        engine.agent_end("s1", &[user("hi")], &cancel).await;
        engine.cron_weekly(&cancel).await;
    }

    #[tokio::test]
    async fn short_prompt_is_a_noop() {
        let (engine, _store) = engine_with(MockSummarizer::new()).await;
        let cancel = CancellationToken::new();
        assert!(engine.before_prompt_build("s1", "hi", &cancel).await.is_none());
    }

    #[tokio::test]
    async fn first_run_builds_one_episode_one_theme() {
        let summarizer = MockSummarizer::new();
        // Flush summary, fact extraction, theme name.
        summarizer.push_response("Discussed the new billing dashboard rollout.");
        summarizer.push_response("The billing dashboard rolls out next month");
        summarizer.push_response("Billing dashboard");
        let (engine, store) = engine_with(summarizer).await;
        let cancel = CancellationToken::new();

        // Empty store: retrieval finds nothing, no injection.
        let injection = engine.before_prompt_build("s1", "hello there", &cancel).await;
        assert!(injection.is_none());

        let messages = vec![
            user("we need a billing dashboard"),
            assistant("agreed, what data should it show?"),
            user("invoices and payment status"),
            assistant("I'll sketch the schema"),
            user("ship it next month"),
        ];
        engine.agent_end("s1", &messages, &cancel).await;

        assert_eq!(store.count_rows(Table::Episodes).await.unwrap(), 1);
        assert!(store.count_rows(Table::Semantics).await.unwrap() >= 1);
        assert_eq!(store.count_rows(Table::Themes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn agent_end_then_retrieval_sees_new_memory() {
        let summarizer = MockSummarizer::new();
        summarizer.push_response("Discussed the gateway port configuration: port 8443.");
        summarizer.push_response("The gateway listens on port 8443");
        summarizer.push_response("Gateway config");
        let (engine, _store) = engine_with(summarizer).await;
        let cancel = CancellationToken::new();

        let messages = vec![
            user("which port should the gateway use"),
            assistant("let's use 8443"),
            user("ok, set the gateway port to 8443"),
            assistant("done"),
            user("thanks, gateway all set"),
        ];
        engine.agent_end("s1", &messages, &cancel).await;

        // The next prompt about the gateway picks the memory up.
        let injection = engine
            .before_prompt_build("s1", "what port does the gateway listen on", &cancel)
            .await
            .expect("expected an injection");
        assert!(injection.system_prompt.contains("8443"));
        assert!(injection.tokens > 0);
        assert!(injection.tokens <= 500);
    }

    #[tokio::test]
    async fn under_batch_size_keeps_buffering() {
        let summarizer = MockSummarizer::new();
        let (engine, store) = engine_with(summarizer).await;
        let cancel = CancellationToken::new();

        let messages = vec![user("one"), assistant("two"), user("three")];
        engine.agent_end("s1", &messages, &cancel).await;
        assert_eq!(store.count_rows(Table::Episodes).await.unwrap(), 0);
        // Buffer survives for the next turn.
        assert_eq!(engine.builders.get("s1").unwrap().buffered(), 3);
    }

    #[tokio::test]
    async fn tool_result_small_passthrough_returns_none() {
        let (engine, _store) = engine_with(MockSummarizer::new()).await;
        let cancel = CancellationToken::new();
        let replacement = engine
            .tool_result_persist("grep", "short output", &cancel)
            .await;
        assert!(replacement.is_none());
    }

    #[tokio::test]
    async fn tool_result_large_is_compacted() {
        let (engine, _store) = engine_with(MockSummarizer::new()).await;
        let cancel = CancellationToken::new();
        let noisy = format!(
            "<div>{}</div>",
            "a line of tool output with words\n".repeat(40)
        );
        let replacement = engine.tool_result_persist("web", &noisy, &cancel).await;
        let text = replacement.expect("large output must be rewritten");
        assert!(!text.contains("<div>"));
    }

    #[tokio::test]
    async fn trace_recorded_per_retrieval() {
        let (engine, _store) = engine_with(MockSummarizer::new()).await;
        let cancel = CancellationToken::new();
        engine.before_prompt_build("s1", "tell me about the gateway", &cancel).await;
        let report = engine.observability_report();
        assert_eq!(report.traces, 1);
    }

    #[tokio::test]
    async fn cron_weekly_runs_clean_on_fresh_store() {
        let (engine, _store) = engine_with(MockSummarizer::new()).await;
        let cancel = CancellationToken::new();
        engine.cron_weekly(&cancel).await;
        assert!(engine.preload_rules().is_empty());
        assert_eq!(engine.alpha(), crate::feedback::ALPHA_DEFAULT);
    }
}
