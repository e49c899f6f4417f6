//! Synthesize stage: one external agent invocation per item, bounded parallelism.
//!
//! We orchestrate; the agent reasons. Every input produces exactly one
//! `SynthesizedItem`. Agent failures (spawn error, non-zero exit, timeout,
//! malformed output) degrade that item to a zero-confidence placeholder.

use super::agent::{AgentRunner, ProcessAgent};
use super::options::{Mode, SynthesizeOpts};
use super::pool::WorkerPool;
use super::types::{
    FetchedItem, ItemFailure, SKIPPED_NO_AGENT, SKIPPED_OVER_LIMIT, SKIPPED_QUICK_MODE, Stage,
    StageOutput, Synthesis, SynthesizedItem,
};
use crate::config::SynthesisConfig;
use crate::error::{AgentError, SynthesisError};
use chrono::Utc;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_PARALLELISM: usize = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_BALANCED_LIMIT: usize = 10;
/// Fetched content beyond this many characters is truncated in the prompt.
const MAX_CONTENT_CHARS: usize = 2000;
const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Spawns agent instances to interpret fetched items.
#[derive(Clone)]
pub struct Synthesizer {
    agent: Option<Arc<dyn AgentRunner>>,
    parallelism: usize,
    timeout: Duration,
    balanced_limit: usize,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("agent", &self.agent.as_ref().map(|a| a.name().to_string()))
            .field("parallelism", &self.parallelism)
            .field("timeout", &self.timeout)
            .field("balanced_limit", &self.balanced_limit)
            .finish()
    }
}

impl Synthesizer {
    /// Create a synthesizer for an agent command line. An empty command
    /// disables synthesis. Zero parallelism or timeout select the defaults.
    pub fn new(agent_command: &str, parallelism: usize, timeout: Duration) -> Self {
        let agent = ProcessAgent::from_command(agent_command)
            .ok()
            .map(|a| Arc::new(a) as Arc<dyn AgentRunner>);
        Self::build(agent, parallelism, timeout)
    }

    /// Create a synthesizer around any agent runner.
    pub fn with_agent(agent: Arc<dyn AgentRunner>, parallelism: usize, timeout: Duration) -> Self {
        Self::build(Some(agent), parallelism, timeout)
    }

    /// A synthesizer with no agent; every item is skipped.
    pub fn disabled() -> Self {
        Self::build(None, 0, Duration::ZERO)
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(
            &config.agent,
            config.parallelism,
            Duration::from_secs(config.timeout_secs),
        )
        .with_balanced_limit(config.balanced_limit)
    }

    fn build(agent: Option<Arc<dyn AgentRunner>>, parallelism: usize, timeout: Duration) -> Self {
        Self {
            agent,
            parallelism: if parallelism == 0 {
                DEFAULT_PARALLELISM
            } else {
                parallelism
            },
            timeout: if timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                timeout
            },
            balanced_limit: DEFAULT_BALANCED_LIMIT,
        }
    }

    pub fn with_balanced_limit(mut self, limit: usize) -> Self {
        self.balanced_limit = limit;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.agent.is_some()
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of leading items that receive an agent call for this mode.
    /// A balanced limit of 0 means no cap.
    pub fn synthesis_cap(&self, mode: Mode, limit: Option<usize>, len: usize) -> usize {
        match mode {
            Mode::Quick => 0,
            Mode::Balanced => match limit.unwrap_or(self.balanced_limit) {
                0 => len,
                cap => cap.min(len),
            },
            Mode::Deep => len,
        }
    }

    /// Synthesize a batch, returning one item per input in input order.
    pub async fn synthesize_batch(
        &self,
        items: Vec<FetchedItem>,
        query: &str,
        opts: &SynthesizeOpts,
        cancel: &CancellationToken,
    ) -> StageOutput<SynthesizedItem> {
        if items.is_empty() {
            return StageOutput::default();
        }

        let Some(agent) = self.agent.clone() else {
            debug!(items = items.len(), "No agent configured, skipping synthesis");
            return StageOutput {
                items: skip_all(items, SKIPPED_NO_AGENT),
                failures: Vec::new(),
            };
        };

        let cap = self.synthesis_cap(opts.mode, opts.limit, items.len());
        let mut items = items;
        let rest = items.split_off(cap);
        let skip_reason = if opts.mode == Mode::Quick {
            SKIPPED_QUICK_MODE
        } else {
            SKIPPED_OVER_LIMIT
        };

        let parallelism = if opts.parallelism == 0 {
            self.parallelism
        } else {
            opts.parallelism
        };
        let timeout = opts.timeout.unwrap_or(self.timeout);
        let pool = WorkerPool::new("synthesize", parallelism);

        let runner = self.clone();
        let task_query: Arc<str> = Arc::from(query);
        let task_cancel = cancel.clone();

        let mut synthesized = pool
            .run(
                items,
                cancel,
                move |idx, item| {
                    let runner = runner.clone();
                    let agent = Arc::clone(&agent);
                    let query = Arc::clone(&task_query);
                    let cancel = task_cancel.clone();
                    async move {
                        let synthesis =
                            match runner.run_agent(&*agent, &item, &query, timeout, &cancel).await {
                                Ok(synthesis) => synthesis,
                                Err(SynthesisError::Parse { message }) => {
                                    warn!(index = idx, item = %item.raw.id, error = %message, "Unparseable agent response");
                                    Synthesis::unparseable(message)
                                }
                                Err(e) => {
                                    warn!(index = idx, item = %item.raw.id, error = %e, "Synthesis failed");
                                    Synthesis::failed(e)
                                }
                            };
                        SynthesizedItem {
                            fetched: Arc::unwrap_or_clone(item),
                            synthesis,
                        }
                    }
                },
                |_, item, reason| SynthesizedItem {
                    fetched: Arc::unwrap_or_clone(item),
                    synthesis: Synthesis::failed(reason),
                },
            )
            .await;
        synthesized.extend(skip_all(rest, skip_reason));

        let failures: Vec<ItemFailure> = synthesized
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                item.synthesis.failure.as_ref().map(|reason| ItemFailure {
                    index,
                    item_id: item.fetched.raw.id.clone(),
                    stage: Stage::Synthesize,
                    reason: reason.clone(),
                })
            })
            .collect();

        info!(
            total = synthesized.len(),
            synthesized = cap,
            failed = failures.len(),
            mode = %opts.mode,
            "Synthesize stage complete"
        );

        StageOutput {
            items: synthesized,
            failures,
        }
    }

    /// Synthesize one item with this synthesizer's agent and default timeout.
    pub async fn synthesize_one(
        &self,
        item: &FetchedItem,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Synthesis, SynthesisError> {
        let agent = self.agent.as_deref().ok_or(AgentError::EmptyCommand)?;
        self.run_agent(agent, item, query, self.timeout, cancel).await
    }

    async fn run_agent(
        &self,
        agent: &dyn AgentRunner,
        item: &FetchedItem,
        query: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Synthesis, SynthesisError> {
        let prompt = build_prompt(item, query);
        let output = agent.invoke(&prompt, timeout, cancel).await?;
        let mut synthesis = parse_agent_response(&output.stdout)?;
        synthesis.agent_used = Some(agent.name().to_string());
        synthesis.synthesized_at = Some(Utc::now());
        Ok(synthesis)
    }
}

fn skip_all(items: Vec<FetchedItem>, summary: &str) -> Vec<SynthesizedItem> {
    items
        .into_iter()
        .map(|fetched| SynthesizedItem {
            fetched,
            synthesis: Synthesis::skipped(summary),
        })
        .collect()
}

/// Build the full agent prompt for one item.
pub fn build_prompt(item: &FetchedItem, query: &str) -> String {
    format!(
        "Analyze this {kind} for relevance to: \"{query}\"\n\n\
         {brief}\n\
         Respond with ONLY valid JSON (no markdown, no explanation):\n\
         {{\"summary\": \"...\", \"key_features\": [\"...\", \"...\"], \
         \"relevance_rationale\": \"...\", \"recommendations\": [\"...\", \"...\"], \
         \"confidence\": 0.0-1.0}}",
        kind = item.raw.kind,
        brief = build_item_brief(item),
    )
}

/// Title, URL, type, known metadata and (truncated) fetched content.
pub fn build_item_brief(item: &FetchedItem) -> String {
    let raw = &item.raw;
    let mut brief = String::new();
    let _ = writeln!(brief, "Title: {}", raw.title);
    let _ = writeln!(brief, "URL: {}", raw.url);
    let _ = writeln!(brief, "Type: {}", raw.kind);

    if let Some(stars) = raw.meta_count("stars") {
        let _ = writeln!(brief, "Stars: {stars}");
    }
    if let Some(points) = raw.meta_count("points") {
        let _ = writeln!(brief, "Points: {points}");
    }
    if let Some(language) = raw.meta_str("language") {
        let _ = writeln!(brief, "Language: {language}");
    }
    let topics = raw.meta_strings("topics");
    if !topics.is_empty() {
        let _ = writeln!(brief, "Topics: {}", topics.join(", "));
    }
    if let Some(citations) = raw.meta_count("citations") {
        let _ = writeln!(brief, "Citations: {citations}");
    }
    if let Some(description) = raw.meta_str("description") {
        let _ = writeln!(brief, "Description: {description}");
    }

    if !item.content.is_empty() {
        let label = if item.content_type.is_empty() {
            "content"
        } else {
            item.content_type.as_str()
        };
        let _ = write!(brief, "\n{label}:\n{}\n", truncate_content(&item.content));
    }
    brief
}

fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}

/// Verdict shape the agent is asked to produce. Every field is optional so a
/// partial answer still parses.
#[derive(Debug, Deserialize)]
struct AgentVerdict {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    key_features: Option<Vec<String>>,
    #[serde(default)]
    relevance_rationale: Option<String>,
    #[serde(default)]
    recommendations: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// The substring from the first `{` to the last `}`, or the trimmed input if
/// there is no such pair.
pub fn extract_json_object(output: &str) -> &str {
    let trimmed = output.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Leniently parse agent stdout into a `Synthesis`, ignoring surrounding prose.
pub fn parse_agent_response(output: &str) -> Result<Synthesis, SynthesisError> {
    let json = extract_json_object(output);
    let verdict: AgentVerdict =
        serde_json::from_str(json).map_err(|e| SynthesisError::Parse {
            message: e.to_string(),
        })?;
    Ok(Synthesis {
        summary: verdict.summary.unwrap_or_default(),
        key_features: verdict.key_features.unwrap_or_default(),
        relevance_rationale: verdict.relevance_rationale.unwrap_or_default(),
        recommendations: verdict.recommendations.unwrap_or_default(),
        confidence: verdict.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        ..Synthesis::default()
    })
}
