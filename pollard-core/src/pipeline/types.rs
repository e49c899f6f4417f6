//! Shared data model passed between the pipeline stages.
//!
//! Every stage consumes the full output of its predecessor and produces an
//! index-aligned output of the same length: `RawItem` → `FetchedItem` →
//! `SynthesizedItem` → `ScoredItem`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Heterogeneous, string-keyed metadata attached to an item by its source.
pub type Metadata = BTreeMap<String, Value>;

/// Repositories age from their last activity, not their creation.
const REPO_DATE_KEYS: &[&str] = &["pushed_at", "updated_at", "published_at", "created_at"];
const RESEARCH_DATE_KEYS: &[&str] = &["published", "publication_date", "published_at", "created_at"];
const DEFAULT_DATE_KEYS: &[&str] = &[
    "published_at",
    "published",
    "publication_date",
    "created_at",
    "updated_at",
    "pushed_at",
];

/// The kind of source an item came from.
///
/// Serialized as its wire tag (`github_repo`, `hn_story`, ...). Unknown tags
/// round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemKind {
    GithubRepo,
    HnStory,
    ArxivPaper,
    OpenalexWork,
    Other(String),
}

impl ItemKind {
    pub fn as_str(&self) -> &str {
        match self {
            ItemKind::GithubRepo => "github_repo",
            ItemKind::HnStory => "hn_story",
            ItemKind::ArxivPaper => "arxiv_paper",
            ItemKind::OpenalexWork => "openalex_work",
            ItemKind::Other(tag) => tag,
        }
    }

    /// Content category, which selects the recency half-life.
    pub fn category(&self) -> ContentCategory {
        match self {
            ItemKind::GithubRepo => ContentCategory::Repos,
            ItemKind::HnStory => ContentCategory::Trends,
            ItemKind::ArxivPaper | ItemKind::OpenalexWork => ContentCategory::Research,
            ItemKind::Other(_) => ContentCategory::General,
        }
    }

    /// Whether citation counts are meaningful for this kind.
    pub fn is_research(&self) -> bool {
        self.category() == ContentCategory::Research
    }

    /// Metadata keys consulted, in order, for the date recency is measured from.
    pub fn date_keys(&self) -> &'static [&'static str] {
        match self.category() {
            ContentCategory::Repos => REPO_DATE_KEYS,
            ContentCategory::Research => RESEARCH_DATE_KEYS,
            ContentCategory::Trends | ContentCategory::General => DEFAULT_DATE_KEYS,
        }
    }
}

impl From<String> for ItemKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "github_repo" => ItemKind::GithubRepo,
            "hn_story" => ItemKind::HnStory,
            "arxiv_paper" => ItemKind::ArxivPaper,
            "openalex_work" => ItemKind::OpenalexWork,
            _ => ItemKind::Other(tag),
        }
    }
}

impl From<&str> for ItemKind {
    fn from(tag: &str) -> Self {
        ItemKind::from(tag.to_string())
    }
}

impl From<ItemKind> for String {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad content category used for temporal decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    /// News and discussion, decays fast.
    Trends,
    /// Code repositories.
    Repos,
    /// Papers and academic works, decays slowly.
    Research,
    /// Anything else.
    General,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Trends => "trends",
            ContentCategory::Repos => "repos",
            ContentCategory::Research => "research",
            ContentCategory::General => "general",
        }
    }
}

/// An unenriched search result. Immutable once produced by a search source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default = "Utc::now")]
    pub collected_at: DateTime<Utc>,
}

impl RawItem {
    /// Create an item with empty metadata, collected now.
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<ItemKind>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            title: title.into(),
            url: url.into(),
            metadata: Metadata::new(),
            collected_at: Utc::now(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A non-empty string metadata value.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// A non-negative count, accepting integer, float or numeric-string values.
    pub fn meta_count(&self, key: &str) -> Option<u64> {
        match self.metadata.get(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64),
            _ => None,
        }
    }

    /// A list of strings, from either an array or a comma-separated string.
    pub fn meta_strings(&self, key: &str) -> Vec<String> {
        match self.metadata.get(key) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The item's publication date, if the source recorded one. For
    /// repositories this is the most recent activity.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.kind
            .date_keys()
            .iter()
            .filter_map(|key| self.metadata.get(*key))
            .find_map(parse_timestamp)
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        // Unix seconds, as emitted by some discussion-site APIs.
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// A raw item enriched with content retrieved in the fetch stage.
///
/// Produced for every input item, including failed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedItem {
    pub raw: RawItem,
    /// README, story text, abstract, ...
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub extra_data: Metadata,
    pub fetched_at: DateTime<Utc>,
    pub fetch_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

impl FetchedItem {
    /// A successful fetch that added no content.
    pub fn passthrough(raw: RawItem) -> Self {
        Self {
            raw,
            content: String::new(),
            content_type: String::new(),
            extra_data: Metadata::new(),
            fetched_at: Utc::now(),
            fetch_success: true,
            fetch_error: None,
        }
    }

    /// A failed fetch; the item is kept with the error recorded.
    pub fn failed(raw: RawItem, error: impl fmt::Display) -> Self {
        Self {
            fetch_success: false,
            fetch_error: Some(error.to_string()),
            ..Self::passthrough(raw)
        }
    }
}

pub const SKIPPED_NO_AGENT: &str = "Synthesis skipped - no agent configured";
pub const SKIPPED_QUICK_MODE: &str = "Synthesis skipped - quick mode";
pub const SKIPPED_OVER_LIMIT: &str = "Synthesis skipped - outside balanced limit";
pub const PARSE_FAILED: &str = "Failed to parse agent response";
pub const SYNTHESIS_FAILED: &str = "Synthesis failed";

/// Agent-generated interpretation of one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default)]
    pub relevance_rationale: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Agent-reported confidence in [0, 1]; zero for placeholders.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesized_at: Option<DateTime<Utc>>,
    /// Why this is a zero-confidence placeholder rather than an agent verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Synthesis {
    /// Placeholder for an item that was deliberately not synthesized.
    pub fn skipped(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            ..Self::default()
        }
    }

    /// Placeholder for an item whose synthesis failed.
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self {
            summary: SYNTHESIS_FAILED.to_string(),
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Placeholder for an agent response that could not be parsed.
    pub fn unparseable(reason: impl fmt::Display) -> Self {
        Self {
            summary: PARSE_FAILED.to_string(),
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Whether an agent actually produced this synthesis.
    pub fn is_from_agent(&self) -> bool {
        self.synthesized_at.is_some() && self.failure.is_none()
    }
}

/// A fetched item with its synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedItem {
    pub fetched: FetchedItem,
    pub synthesis: Synthesis,
}

/// Quality level derived from a score value and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    High,
    Medium,
    Low,
}

impl QualityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::High => "high",
            QualityLevel::Medium => "medium",
            QualityLevel::Low => "low",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final, explainable quality assessment of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Final score in [0, 1].
    pub value: f64,
    pub level: QualityLevel,
    /// Weighted contribution of each factor; these sum to `value`.
    pub factors: BTreeMap<String, f64>,
    /// How many of the underlying signals were actually available, in [0, 1].
    pub confidence: f64,
    pub scored_at: DateTime<Utc>,
}

/// A synthesized item with its quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub synthesized: SynthesizedItem,
    pub score: QualityScore,
}

impl ScoredItem {
    pub fn raw(&self) -> &RawItem {
        &self.synthesized.fetched.raw
    }

    pub fn fetched(&self) -> &FetchedItem {
        &self.synthesized.fetched
    }

    pub fn synthesis(&self) -> &Synthesis {
        &self.synthesized.synthesis
    }
}

/// Pipeline stage names, used when recording per-item failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Synthesize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => f.write_str("fetch"),
            Stage::Synthesize => f.write_str("synthesize"),
        }
    }
}

/// A recoverable failure recorded against one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub index: usize,
    pub item_id: String,
    pub stage: Stage,
    pub reason: String,
}

/// The index-aligned output of a stage plus the failures observed along the way.
///
/// Failures are informational; `items` always has one entry per input.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub items: Vec<T>,
    pub failures: Vec<ItemFailure>,
}

impl<T> Default for StageOutput<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> StageOutput<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
