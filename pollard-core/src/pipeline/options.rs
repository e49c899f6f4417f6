//! Per-stage option structs and scoring defaults.
//!
//! These are plain values constructed once per call; nothing here is global.

use super::types::{ContentCategory, QualityLevel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How much enrichment and synthesis work a run performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No content retrieval and no synthesis.
    Quick,
    /// Fetch everything, synthesize a capped prefix of the batch.
    #[default]
    Balanced,
    /// Fetch and synthesize everything.
    Deep,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Quick => "quick",
            Mode::Balanced => "balanced",
            Mode::Deep => "deep",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(Mode::Quick),
            "balanced" => Ok(Mode::Balanced),
            "deep" => Ok(Mode::Deep),
            other => Err(format!(
                "unknown mode '{other}' (expected quick, balanced or deep)"
            )),
        }
    }
}

/// Options for the search stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOpts {
    /// Maximum items returned (0 = unlimited).
    pub max_results: usize,
    /// Minimum stars for code repositories.
    pub min_stars: u64,
    /// Minimum points for discussion stories.
    pub min_points: u64,
    /// Item kinds or content categories to keep (empty = all).
    pub categories: Vec<String>,
}

/// Options for the fetch stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOpts {
    pub mode: Mode,
    /// Retrieve README text for code repositories.
    pub fetch_readme: bool,
    /// Recover paper abstracts from secondary metadata when missing.
    pub fetch_docs: bool,
    /// Per-request timeout overriding the client's default.
    #[serde(default, with = "duration_secs_opt")]
    pub timeout: Option<Duration>,
}

impl Default for FetchOpts {
    fn default() -> Self {
        Self {
            mode: Mode::Balanced,
            fetch_readme: true,
            fetch_docs: false,
            timeout: None,
        }
    }
}

/// Options for the synthesis stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizeOpts {
    pub mode: Mode,
    /// Items synthesized in balanced mode; `None` uses the synthesizer's
    /// default and 0 means no cap.
    pub limit: Option<usize>,
    /// Concurrent agent processes; 0 uses the synthesizer's default.
    pub parallelism: usize,
    /// Per-item timeout; `None` uses the synthesizer's default.
    #[serde(default, with = "duration_secs_opt")]
    pub timeout: Option<Duration>,
}

/// Options for the scoring stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreOpts {
    pub weights: ScoreWeights,
    pub half_lives: HalfLives,
    pub thresholds: ScoreThresholds,
}

/// Relative importance of the scoring factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Stars, points, upvotes.
    pub engagement: f64,
    /// Academic citations.
    pub citations: f64,
    /// Temporal decay.
    pub recency: f64,
    /// Lexical overlap with the query.
    pub query_match: f64,
    /// Agent confidence.
    pub synthesis: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            engagement: 0.25,
            citations: 0.20,
            recency: 0.25,
            query_match: 0.15,
            synthesis: 0.15,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.engagement + self.citations + self.recency + self.query_match + self.synthesis
    }

    /// Weights scaled to sum to 1, so factor contributions sum to the score.
    ///
    /// Negative and non-finite weights count as zero. If nothing positive is
    /// left the defaults apply.
    pub fn normalized(&self) -> Self {
        let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let weights = Self {
            engagement: clean(self.engagement),
            citations: clean(self.citations),
            recency: clean(self.recency),
            query_match: clean(self.query_match),
            synthesis: clean(self.synthesis),
        };
        let total = weights.total();
        if !total.is_finite() || total <= 0.0 {
            return Self::default();
        }
        if (total - 1.0).abs() < f64::EPSILON {
            return weights;
        }
        Self {
            engagement: weights.engagement / total,
            citations: weights.citations / total,
            recency: weights.recency / total,
            query_match: weights.query_match / total,
            synthesis: weights.synthesis / total,
        }
    }

    fn values(&self) -> [f64; 5] {
        [
            self.engagement,
            self.citations,
            self.recency,
            self.query_match,
            self.synthesis,
        ]
    }

    pub fn is_valid(&self) -> bool {
        self.values().iter().all(|w| w.is_finite() && *w >= 0.0) && self.total() > 0.0
    }
}

/// Temporal decay rates per content category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalfLives {
    #[serde(with = "duration_secs")]
    pub trends: Duration,
    #[serde(with = "duration_secs")]
    pub research: Duration,
    #[serde(with = "duration_secs")]
    pub repos: Duration,
}

const DAY: u64 = 24 * 60 * 60;

impl Default for HalfLives {
    fn default() -> Self {
        Self {
            trends: Duration::from_secs(7 * DAY),
            research: Duration::from_secs(365 * DAY),
            repos: Duration::from_secs(90 * DAY),
        }
    }
}

impl HalfLives {
    pub fn for_category(&self, category: ContentCategory) -> Duration {
        match category {
            ContentCategory::Trends => self.trends,
            ContentCategory::Research => self.research,
            ContentCategory::Repos | ContentCategory::General => self.repos,
        }
    }
}

/// Quality level cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            high: 0.7,
            medium: 0.4,
        }
    }
}

impl ScoreThresholds {
    pub fn level(&self, value: f64) -> QualityLevel {
        if value >= self.high {
            QualityLevel::High
        } else if value >= self.medium {
            QualityLevel::Medium
        } else {
            QualityLevel::Low
        }
    }
}

/// Serde adapter storing a `Duration` as whole seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

pub(crate) mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|secs| secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ScoreWeights::default();
        assert!((w.total() - 1.0).abs() < 1e-9);
        assert_eq!(w.normalized(), w);
    }

    #[test]
    fn test_normalized_weights() {
        let w = ScoreWeights {
            engagement: 2.0,
            citations: 0.0,
            recency: 1.0,
            query_match: 1.0,
            synthesis: 0.0,
        };
        let n = w.normalized();
        assert!((n.total() - 1.0).abs() < 1e-9);
        assert!((n.engagement - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights() {
        let negative = ScoreWeights {
            engagement: -0.1,
            ..ScoreWeights::default()
        };
        assert!(!negative.is_valid());
        let zero = ScoreWeights {
            engagement: 0.0,
            citations: 0.0,
            recency: 0.0,
            query_match: 0.0,
            synthesis: 0.0,
        };
        assert!(!zero.is_valid());
    }

    #[test]
    fn test_normalized_ignores_negative_and_non_finite() {
        let w = ScoreWeights {
            synthesis: -0.5,
            citations: f64::NAN,
            ..ScoreWeights::default()
        };
        let n = w.normalized();
        assert_eq!(n.synthesis, 0.0);
        assert_eq!(n.citations, 0.0);
        assert!((n.total() - 1.0).abs() < 1e-9);
        assert!((n.engagement - 0.25 / 0.65).abs() < 1e-9);

        let zero = ScoreWeights {
            engagement: 0.0,
            citations: 0.0,
            recency: -1.0,
            query_match: 0.0,
            synthesis: f64::INFINITY,
        };
        assert_eq!(zero.normalized(), ScoreWeights::default());
    }

    #[test]
    fn test_partial_stage_opts_deserialize() {
        let search: SearchOpts = serde_json::from_str(r#"{"min_stars": 50}"#).unwrap();
        assert_eq!(search.min_stars, 50);
        assert_eq!(search.max_results, 0);
        assert!(search.categories.is_empty());

        let fetch: FetchOpts = toml::from_str("mode = \"quick\"\n").unwrap();
        assert_eq!(fetch.mode, Mode::Quick);
        assert!(fetch.fetch_readme);
        assert_eq!(fetch.timeout, None);

        let synth: SynthesizeOpts = serde_json::from_str(r#"{"limit": 4}"#).unwrap();
        assert_eq!(synth.limit, Some(4));
        assert_eq!(synth.mode, Mode::Balanced);
    }

    #[test]
    fn test_default_thresholds_levels() {
        let t = ScoreThresholds::default();
        assert_eq!(t.level(0.75), QualityLevel::High);
        assert_eq!(t.level(0.7), QualityLevel::High);
        assert_eq!(t.level(0.5), QualityLevel::Medium);
        assert_eq!(t.level(0.2), QualityLevel::Low);
    }

    #[test]
    fn test_half_lives_by_category() {
        let h = HalfLives::default();
        assert_eq!(h.for_category(ContentCategory::Trends), Duration::from_secs(7 * DAY));
        assert_eq!(h.for_category(ContentCategory::Research), Duration::from_secs(365 * DAY));
        assert_eq!(h.for_category(ContentCategory::General), h.repos);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Deep".parse::<Mode>().unwrap(), Mode::Deep);
        assert_eq!(" quick ".parse::<Mode>().unwrap(), Mode::Quick);
        assert!("turbo".parse::<Mode>().is_err());
        assert_eq!(Mode::default(), Mode::Balanced);
    }

    #[test]
    fn test_half_lives_serialize_as_seconds() {
        let json = serde_json::to_value(HalfLives::default()).unwrap();
        assert_eq!(json["trends"], 7 * DAY);
        let back: HalfLives = serde_json::from_value(json).unwrap();
        assert_eq!(back, HalfLives::default());
    }
}
