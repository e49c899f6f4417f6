//! Score stage: multi-factor weighted quality model with temporal decay.
//!
//! Five factors, each normalized to [0, 1] before weighting:
//!
//! | factor        | source                                                     |
//! |---------------|------------------------------------------------------------|
//! | `engagement`  | stars / points / upvotes, log-saturated against a per-kind cap |
//! | `citations`   | citation count for research kinds, log-saturated           |
//! | `recency`     | `exp(-ln 2 · age / half_life)`, half-life by content category |
//! | `query_match` | share of query terms found in title, content, description  |
//! | `synthesis`   | agent-reported confidence                                  |
//!
//! The weighted contributions are kept in `QualityScore::factors` and sum to
//! the final value.

use super::options::ScoreOpts;
use super::types::{ItemKind, QualityScore, ScoredItem, SynthesizedItem};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;
use tracing::info;

pub const FACTOR_ENGAGEMENT: &str = "engagement";
pub const FACTOR_CITATIONS: &str = "citations";
pub const FACTOR_RECENCY: &str = "recency";
pub const FACTOR_QUERY_MATCH: &str = "query_match";
pub const FACTOR_SYNTHESIS: &str = "synthesis";

const ENGAGEMENT_KEYS: &[&str] = &["stars", "points", "upvotes", "score"];
const REPO_STAR_CAP: f64 = 10_000.0;
const DEFAULT_ENGAGEMENT_CAP: f64 = 1_000.0;
const CITATION_CAP: f64 = 1_000.0;
const SIGNAL_COUNT: f64 = 5.0;

/// Normalized factor values for one item, before weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorSignals {
    pub engagement: f64,
    pub citations: f64,
    pub recency: f64,
    pub query_match: f64,
    pub synthesis: f64,
    /// Number of factors backed by real input data (0..=5).
    pub available: usize,
}

/// Computes explainable quality scores.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    opts: ScoreOpts,
    now: Option<DateTime<Utc>>,
}

impl Scorer {
    pub fn new(opts: ScoreOpts) -> Self {
        Self { opts, now: None }
    }

    /// Score against a fixed clock instead of the wall clock.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn opts(&self) -> &ScoreOpts {
        &self.opts
    }

    /// Score a batch, one output per input in input order.
    pub fn score_batch(&self, items: Vec<SynthesizedItem>, query: &str) -> Vec<ScoredItem> {
        let now = self.now.unwrap_or_else(Utc::now);
        let scored: Vec<ScoredItem> = items
            .into_iter()
            .map(|synthesized| {
                let score = self.score_at(&synthesized, query, now);
                ScoredItem { synthesized, score }
            })
            .collect();

        if !scored.is_empty() {
            let high = scored
                .iter()
                .filter(|s| s.score.value >= self.opts.thresholds.high)
                .count();
            info!(total = scored.len(), high, "Score stage complete");
        }
        scored
    }

    pub fn score_one(&self, item: &SynthesizedItem, query: &str) -> QualityScore {
        self.score_at(item, query, self.now.unwrap_or_else(Utc::now))
    }

    fn score_at(&self, item: &SynthesizedItem, query: &str, now: DateTime<Utc>) -> QualityScore {
        let signals = self.signals(item, query, now);
        let weights = self.opts.weights.normalized();

        let factors: BTreeMap<String, f64> = [
            (FACTOR_ENGAGEMENT, weights.engagement * signals.engagement),
            (FACTOR_CITATIONS, weights.citations * signals.citations),
            (FACTOR_RECENCY, weights.recency * signals.recency),
            (FACTOR_QUERY_MATCH, weights.query_match * signals.query_match),
            (FACTOR_SYNTHESIS, weights.synthesis * signals.synthesis),
        ]
        .into_iter()
        .map(|(name, contribution)| (name.to_string(), contribution))
        .collect();

        let value = factors.values().sum::<f64>().clamp(0.0, 1.0);

        QualityScore {
            value,
            level: self.opts.thresholds.level(value),
            factors,
            confidence: signals.available as f64 / SIGNAL_COUNT,
            scored_at: now,
        }
    }

    /// Normalized, unweighted factor values for one item.
    pub fn signals(&self, item: &SynthesizedItem, query: &str, now: DateTime<Utc>) -> FactorSignals {
        let raw = &item.fetched.raw;
        let mut available = 0;

        let engagement = ENGAGEMENT_KEYS
            .iter()
            .find_map(|key| raw.meta_count(key))
            .map(|count| {
                available += 1;
                saturating_log(count as f64, engagement_cap(&raw.kind))
            })
            .unwrap_or(0.0);

        let citations = if raw.kind.is_research() {
            raw.meta_count("citations")
                .map(|count| {
                    available += 1;
                    saturating_log(count as f64, CITATION_CAP)
                })
                .unwrap_or(0.0)
        } else {
            // Not applicable, so not missing.
            available += 1;
            0.0
        };

        let published = raw.published_at();
        if published.is_some() {
            available += 1;
        }
        let age = (now - published.unwrap_or(raw.collected_at))
            .to_std()
            .unwrap_or(Duration::ZERO);
        let recency = recency_factor(age, self.opts.half_lives.for_category(raw.kind.category()));

        let query_match = if query_terms(query).is_empty() {
            0.0
        } else {
            available += 1;
            let description = raw.meta_str("description").unwrap_or_default();
            let text = format!("{} {} {}", raw.title, item.fetched.content, description);
            query_match_factor(query, &text)
        };

        let synthesis = item.synthesis.confidence.clamp(0.0, 1.0);
        if synthesis > 0.0 {
            available += 1;
        }

        FactorSignals {
            engagement,
            citations,
            recency,
            query_match,
            synthesis,
            available,
        }
    }
}

fn engagement_cap(kind: &ItemKind) -> f64 {
    match kind {
        ItemKind::GithubRepo => REPO_STAR_CAP,
        _ => DEFAULT_ENGAGEMENT_CAP,
    }
}

/// `ln(1 + n) / ln(1 + cap)`, saturating at 1.
pub fn saturating_log(n: f64, cap: f64) -> f64 {
    if n <= 0.0 || cap <= 0.0 {
        return 0.0;
    }
    (n.ln_1p() / cap.ln_1p()).min(1.0)
}

/// Exponential decay: 1 at age zero, 0.5 after one half-life.
pub fn recency_factor(age: Duration, half_life: Duration) -> f64 {
    if half_life.is_zero() {
        return 0.0;
    }
    (-std::f64::consts::LN_2 * age.as_secs_f64() / half_life.as_secs_f64()).exp()
}

/// Distinct lower-cased alphanumeric terms of at least two characters.
fn query_terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query terms that appear in `text`.
pub fn query_match_factor(query: &str, text: &str) -> f64 {
    let wanted = query_terms(query);
    if wanted.is_empty() {
        return 0.0;
    }
    let present: HashSet<String> = query_terms(text).into_iter().collect();
    let hits = wanted.iter().filter(|t| present.contains(*t)).count();
    hits as f64 / wanted.len() as f64
}

/// Items ordered by score, highest first. Ties keep their input order.
pub fn rank(items: &[ScoredItem]) -> Vec<&ScoredItem> {
    let mut ranked: Vec<&ScoredItem> = items.iter().collect();
    ranked.sort_by(|a, b| b.score.value.total_cmp(&a.score.value));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::options::{HalfLives, ScoreThresholds, ScoreWeights};
    use crate::pipeline::types::{FetchedItem, QualityLevel, RawItem, Synthesis};
    use chrono::TimeZone;

    const DAY: u64 = 24 * 60 * 60;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn item(raw: RawItem, confidence: f64) -> SynthesizedItem {
        SynthesizedItem {
            fetched: FetchedItem::passthrough(raw),
            synthesis: Synthesis {
                confidence,
                ..Synthesis::default()
            },
        }
    }

    fn repo_aged(days: i64) -> RawItem {
        let published = now() - chrono::Duration::days(days);
        RawItem::new("gh-1", "github_repo", "acme/widget", "https://github.com/acme/widget")
            .with_meta("stars", 500)
            .with_meta("pushed_at", published.to_rfc3339())
    }

    #[test]
    fn test_recency_halves_after_one_half_life() {
        let half = Duration::from_secs(7 * DAY);
        assert!((recency_factor(Duration::ZERO, half) - 1.0).abs() < 1e-12);
        assert!((recency_factor(half, half) - 0.5).abs() < 1e-12);
        assert!((recency_factor(half * 2, half) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_recency_contribution_halves_with_age() {
        let scorer = Scorer::default().with_clock(now());
        let fresh = scorer.score_one(&item(repo_aged(0), 0.5), "widget");
        let old = scorer.score_one(&item(repo_aged(90), 0.5), "widget");
        let ratio = old.factors[FACTOR_RECENCY] / fresh.factors[FACTOR_RECENCY];
        assert!((ratio - 0.5).abs() < 1e-9, "ratio was {ratio}");
        assert_eq!(old.factors[FACTOR_ENGAGEMENT], fresh.factors[FACTOR_ENGAGEMENT]);
    }

    #[test]
    fn test_factors_sum_to_value() {
        let scorer = Scorer::default().with_clock(now());
        let score = scorer.score_one(&item(repo_aged(30), 0.8), "acme widget");
        let sum: f64 = score.factors.values().sum();
        assert!((sum - score.value).abs() < 1e-9);
        assert_eq!(score.factors.len(), 5);
    }

    #[test]
    fn test_negative_weight_keeps_factor_sum() {
        let opts = ScoreOpts {
            weights: ScoreWeights {
                synthesis: -0.5,
                ..ScoreWeights::default()
            },
            ..ScoreOpts::default()
        };
        let scorer = Scorer::new(opts).with_clock(now());
        let score = scorer.score_one(&item(repo_aged(0), 1.0), "acme widget");
        let sum: f64 = score.factors.values().sum();
        assert!((sum - score.value).abs() < 1e-9, "sum {sum} value {}", score.value);
        assert!(score.value <= 1.0);
        assert_eq!(score.factors[FACTOR_SYNTHESIS], 0.0);
        assert!(score.factors.values().all(|c| *c >= 0.0));
    }

    #[test]
    fn test_repo_recency_uses_last_push() {
        let scorer = Scorer::default().with_clock(now());
        let active = RawItem::new("gh-2", "github_repo", "acme/old", "https://github.com/acme/old")
            .with_meta("stars", 500)
            .with_meta("created_at", "2017-01-01T00:00:00Z")
            .with_meta("updated_at", "2025-05-31T00:00:00Z")
            .with_meta("pushed_at", "2025-05-31T00:00:00Z");
        let signals = scorer.signals(&item(active, 0.5), "acme", now());
        let one_day = recency_factor(Duration::from_secs(DAY), HalfLives::default().repos);
        assert!((signals.recency - one_day).abs() < 1e-12);
        assert!(signals.recency > 0.9);
    }

    #[test]
    fn test_level_labels_with_default_thresholds() {
        let t = ScoreThresholds::default();
        assert_eq!(t.level(0.75), QualityLevel::High);
        assert_eq!(t.level(0.5), QualityLevel::Medium);
        assert_eq!(t.level(0.2), QualityLevel::Low);
    }

    #[test]
    fn test_saturating_log_bounds() {
        assert_eq!(saturating_log(0.0, 1000.0), 0.0);
        assert!((saturating_log(1000.0, 1000.0) - 1.0).abs() < 1e-12);
        assert_eq!(saturating_log(1_000_000.0, 1000.0), 1.0);
        let mid = saturating_log(31.0, 1000.0);
        assert!(mid > 0.4 && mid < 0.6);
    }

    #[test]
    fn test_query_match_fraction() {
        assert_eq!(query_match_factor("rust tui", "A Rust TUI framework"), 1.0);
        assert_eq!(query_match_factor("rust tui", "a rust web server"), 0.5);
        assert_eq!(query_match_factor("", "anything"), 0.0);
        assert_eq!(query_match_factor("a", "a"), 0.0);
    }

    #[test]
    fn test_citations_only_for_research() {
        let scorer = Scorer::default().with_clock(now());
        let paper = RawItem::new("ax-1", "arxiv_paper", "Paper", "u")
            .with_meta("citations", 1000)
            .with_meta("published", "2025-05-01");
        let repo = repo_aged(1).with_meta("citations", 1000);

        let paper_score = scorer.score_one(&item(paper, 0.0), "paper");
        let repo_score = scorer.score_one(&item(repo, 0.0), "paper");
        assert!((paper_score.factors[FACTOR_CITATIONS] - 0.20).abs() < 1e-9);
        assert_eq!(repo_score.factors[FACTOR_CITATIONS], 0.0);
    }

    #[test]
    fn test_confidence_drops_with_missing_signals() {
        let scorer = Scorer::default().with_clock(now());
        let full = scorer.score_one(&item(repo_aged(3), 0.9), "widget");
        assert_eq!(full.confidence, 1.0);

        let bare = RawItem::new("x", "hn_story", "Something", "u");
        let sparse = scorer.score_one(&item(bare, 0.0), "");
        // Only citations (not applicable to stories) counts.
        assert!((sparse.confidence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_missing_date_uses_collected_at() {
        let scorer = Scorer::default().with_clock(now());
        let mut raw = RawItem::new("x", "hn_story", "t", "u");
        raw.collected_at = now() - chrono::Duration::days(7);
        let signals = scorer.signals(&item(raw, 0.0), "", now());
        assert!((signals.recency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_future_dates_clamp_to_full_recency() {
        let scorer = Scorer::default().with_clock(now());
        let signals = scorer.signals(&item(repo_aged(-10), 0.0), "", now());
        assert_eq!(signals.recency, 1.0);
    }

    #[test]
    fn test_score_batch_preserves_order() {
        let scorer = Scorer::default().with_clock(now());
        let items = vec![
            item(RawItem::new("a", "hn_story", "a", "u"), 0.1),
            item(repo_aged(1), 0.9),
            item(RawItem::new("c", "arxiv_paper", "c", "u"), 0.0),
        ];
        let scored = scorer.score_batch(items, "widget");
        let ids: Vec<_> = scored.iter().map(|s| s.raw().id.as_str()).collect();
        assert_eq!(ids, vec!["a", "gh-1", "c"]);
    }

    #[test]
    fn test_rank_orders_by_value_stably() {
        let scorer = Scorer::default().with_clock(now());
        let items = vec![
            item(RawItem::new("low-1", "hn_story", "x", "u"), 0.0),
            item(repo_aged(1), 0.9),
            item(RawItem::new("low-2", "hn_story", "x", "u"), 0.0),
        ];
        let scored = scorer.score_batch(items, "widget");
        let ranked: Vec<_> = rank(&scored).iter().map(|s| s.raw().id.clone()).collect();
        assert_eq!(ranked, vec!["gh-1", "low-1", "low-2"]);
    }
}
