//! End-to-end orchestration: Search → Fetch → Synthesize → Score.

use super::fetcher::Fetcher;
use super::options::{FetchOpts, Mode, ScoreOpts, SearchOpts, SynthesizeOpts};
use super::scorer::{self, Scorer};
use super::search::Searcher;
use super::synthesizer::Synthesizer;
use super::types::{ItemFailure, RawItem, ScoredItem};
use crate::config::PollardConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Per-run options for every stage.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: Mode,
    pub search: SearchOpts,
    pub fetch: FetchOpts,
    pub synthesize: SynthesizeOpts,
    pub score: ScoreOpts,
}

impl RunOptions {
    /// Options for `mode`, with fetch and scoring settings taken from config.
    pub fn for_mode(mode: Mode, config: &PollardConfig) -> Self {
        Self {
            mode,
            search: SearchOpts::default(),
            fetch: FetchOpts {
                mode,
                fetch_readme: config.fetch.fetch_readme,
                fetch_docs: config.fetch.fetch_docs,
                timeout: None,
            },
            synthesize: SynthesizeOpts {
                mode,
                limit: Some(config.synthesis.balanced_limit),
                parallelism: config.synthesis.parallelism,
                timeout: Some(Duration::from_secs(config.synthesis.timeout_secs)),
            },
            score: config.score.clone(),
        }
    }
}

/// The result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub query: String,
    pub mode: Mode,
    /// One entry per searched item, in search order.
    pub scored: Vec<ScoredItem>,
    /// Recoverable per-item failures from the fetch and synthesis stages.
    pub failures: Vec<ItemFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Items ordered by score, highest first.
    pub fn ranked(&self) -> Vec<&ScoredItem> {
        scorer::rank(&self.scored)
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Runs the stages in order over a single batch.
#[derive(Debug, Clone)]
pub struct Pipeline {
    fetcher: Fetcher,
    synthesizer: Synthesizer,
    clock: Option<DateTime<Utc>>,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, synthesizer: Synthesizer) -> Self {
        Self {
            fetcher,
            synthesizer,
            clock: None,
        }
    }

    pub fn from_config(config: &PollardConfig) -> Result<Self> {
        Ok(Self::new(
            Fetcher::from_config(&config.fetch)?,
            Synthesizer::from_config(&config.synthesis),
        ))
    }

    /// Score against a fixed clock.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    /// Search, then process whatever the searcher returned.
    pub async fn run(
        &self,
        searcher: &dyn Searcher,
        query: &str,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun> {
        let items = searcher.search(query, &opts.search).await?;
        info!(
            searcher = searcher.name(),
            query,
            found = items.len(),
            "Search stage complete"
        );
        Ok(self.process(items, query, opts, cancel).await)
    }

    /// Fetch, synthesize and score a batch. Never fails; item-level problems
    /// are reported in `PipelineRun::failures`.
    pub async fn process(
        &self,
        items: Vec<RawItem>,
        query: &str,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        let started_at = Utc::now();
        let total = items.len();

        let fetch_opts = FetchOpts {
            mode: opts.mode,
            ..opts.fetch.clone()
        };
        let fetched = self.fetcher.fetch_batch(items, &fetch_opts, cancel).await;

        let synth_opts = SynthesizeOpts {
            mode: opts.mode,
            ..opts.synthesize.clone()
        };
        let synthesized = self
            .synthesizer
            .synthesize_batch(fetched.items, query, &synth_opts, cancel)
            .await;

        let mut scorer = Scorer::new(opts.score.clone());
        if let Some(now) = self.clock {
            scorer = scorer.with_clock(now);
        }
        let scored = scorer.score_batch(synthesized.items, query);

        let mut failures = fetched.failures;
        failures.extend(synthesized.failures);

        let run = PipelineRun {
            query: query.to_string(),
            mode: opts.mode,
            scored,
            failures,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            mode = %opts.mode,
            total,
            failures = run.failures.len(),
            cancelled = cancel.is_cancelled(),
            elapsed_ms = run.duration().as_millis() as u64,
            "Pipeline run complete"
        );
        run
    }
}
