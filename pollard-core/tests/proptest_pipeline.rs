//! Property-based tests for stage alignment and scoring using proptest.

use proptest::prelude::*;

use chrono::{TimeZone, Utc};
use pollard_core::pipeline::options::{ScoreThresholds, ScoreWeights};
use pollard_core::pipeline::scorer::{recency_factor, saturating_log};
use pollard_core::pipeline::{
    FetchedItem, QualityLevel, RawItem, ScoreOpts, Scorer, Synthesis, SynthesizedItem, WorkerPool,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn item(stars: u64, age_days: i64, confidence: f64, title: &str) -> SynthesizedItem {
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let published = now - chrono::Duration::days(age_days);
    let raw = RawItem::new("id", "github_repo", title, "https://github.com/a/b")
        .with_meta("stars", stars)
        .with_meta("pushed_at", published.to_rfc3339());
    SynthesizedItem {
        fetched: FetchedItem::passthrough(raw),
        synthesis: Synthesis {
            confidence,
            ..Synthesis::default()
        },
    }
}

// --- Stage alignment ---

proptest! {
    #[test]
    fn pool_output_is_index_aligned(
        delays in prop::collection::vec(0u64..5, 0..24),
        capacity in 0usize..6,
    ) {
        let pool = WorkerPool::new("prop", capacity);
        let inputs: Vec<(usize, u64)> = delays.iter().copied().enumerate().collect();
        let out = tokio_test::block_on(pool.run(
            inputs,
            &CancellationToken::new(),
            |_, input| async move {
                let (idx, delay) = *input;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                idx
            },
            |_, input, _| input.0,
        ));
        prop_assert_eq!(out, (0..delays.len()).collect::<Vec<_>>());
    }
}

// --- Scoring properties ---

proptest! {
    #[test]
    fn factors_sum_to_value(
        stars in 0u64..1_000_000,
        age in 0i64..2_000,
        confidence in 0.0f64..=1.0,
        engagement in -1.0f64..5.0,
        recency in 0.01f64..5.0,
        synthesis in -1.0f64..1.0,
    ) {
        let opts = ScoreOpts {
            weights: ScoreWeights { engagement, recency, synthesis, ..ScoreWeights::default() },
            ..ScoreOpts::default()
        };
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let scorer = Scorer::new(opts).with_clock(now);
        let score = scorer.score_one(&item(stars, age, confidence, "widget"), "widget tool");

        let sum: f64 = score.factors.values().sum();
        prop_assert!((sum - score.value).abs() < 1e-9);
        prop_assert!((0.0..=1.0).contains(&score.value));
        prop_assert!((0.0..=1.0).contains(&score.confidence));
        prop_assert!(score.factors.values().all(|c| *c >= 0.0));
    }

    #[test]
    fn level_matches_thresholds(value in 0.0f64..=1.0) {
        let t = ScoreThresholds::default();
        let level = t.level(value);
        let expected = if value >= 0.7 {
            QualityLevel::High
        } else if value >= 0.4 {
            QualityLevel::Medium
        } else {
            QualityLevel::Low
        };
        prop_assert_eq!(level, expected);
    }

    #[test]
    fn recency_halves_per_half_life(
        half_life_days in 1u64..1_000,
        age_days in 0u64..5_000,
    ) {
        let day = 24 * 60 * 60;
        let half_life = Duration::from_secs(half_life_days * day);
        let age = Duration::from_secs(age_days * day);
        let now = recency_factor(age, half_life);
        let later = recency_factor(age + half_life, half_life);
        prop_assert!((later - now / 2.0).abs() < 1e-12);
        prop_assert!(now <= 1.0 && now >= 0.0);
    }

    #[test]
    fn saturating_log_is_monotonic_and_bounded(a in 0u64..100_000, b in 0u64..100_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let f_lo = saturating_log(lo as f64, 1_000.0);
        let f_hi = saturating_log(hi as f64, 1_000.0);
        prop_assert!(f_lo <= f_hi);
        prop_assert!((0.0..=1.0).contains(&f_hi));
    }

    #[test]
    fn higher_confidence_never_lowers_score(c1 in 0.0f64..=1.0, c2 in 0.0f64..=1.0) {
        let (lo, hi) = if c1 <= c2 { (c1, c2) } else { (c2, c1) };
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let scorer = Scorer::default().with_clock(now);
        let low = scorer.score_one(&item(100, 10, lo, "x"), "widget");
        let high = scorer.score_one(&item(100, 10, hi, "x"), "widget");
        prop_assert!(low.value <= high.value + 1e-12);
    }
}
