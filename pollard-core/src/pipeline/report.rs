//! Report generation for pipeline runs in multiple output formats.

use super::runner::PipelineRun;
use super::types::ScoredItem;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format for run reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// One line per item, ranked.
    #[default]
    Summary,
    /// Markdown with factors and synthesis per item.
    Detailed,
    /// The full run as pretty-printed JSON.
    Json,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Summary => "summary",
            ReportFormat::Detailed => "detailed",
            ReportFormat::Json => "json",
        })
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Ok(ReportFormat::Summary),
            "detailed" | "markdown" => Ok(ReportFormat::Detailed),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!(
                "unknown format '{other}' (expected summary, detailed or json)"
            )),
        }
    }
}

/// Generates run reports.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Render a run in the given format.
    pub fn render(run: &PipelineRun, format: ReportFormat) -> Result<String> {
        Ok(match format {
            ReportFormat::Summary => Self::generate_summary(run),
            ReportFormat::Detailed => Self::generate_detailed(run),
            ReportFormat::Json => serde_json::to_string_pretty(run)?,
        })
    }

    fn generate_summary(run: &PipelineRun) -> String {
        let mut out = format!(
            "Results for \"{}\" ({} mode, {} items)\n",
            run.query,
            run.mode,
            run.scored.len()
        );
        for item in run.ranked() {
            out.push_str(&format!(
                "[{}] {:.2} {}\n",
                item.score.level,
                item.score.value,
                item.raw().title
            ));
        }
        if !run.failures.is_empty() {
            out.push_str(&format!("{} item failure(s)\n", run.failures.len()));
        }
        out
    }

    fn generate_detailed(run: &PipelineRun) -> String {
        let mut out = format!("# Research Results: {}\n\n", run.query);
        out.push_str(&format!(
            "**Mode:** {} | **Items:** {} | **Failures:** {}\n\n",
            run.mode,
            run.scored.len(),
            run.failures.len()
        ));

        for (rank, item) in run.ranked().into_iter().enumerate() {
            Self::push_item(&mut out, rank + 1, item);
        }

        if !run.failures.is_empty() {
            out.push_str("## Failures\n\n");
            for failure in &run.failures {
                out.push_str(&format!(
                    "- `{}` ({}): {}\n",
                    failure.item_id, failure.stage, failure.reason
                ));
            }
        }
        out
    }

    fn push_item(out: &mut String, rank: usize, item: &ScoredItem) {
        let raw = item.raw();
        out.push_str(&format!("## {rank}. {}\n\n", raw.title));
        out.push_str(&format!("{}\n\n", raw.url));
        out.push_str(&format!(
            "**Score:** {:.2} ({}) | **Confidence:** {:.0}% | **Type:** {}\n\n",
            item.score.value,
            item.score.level,
            item.score.confidence * 100.0,
            raw.kind
        ));

        out.push_str("| Factor | Contribution |\n|---|---|\n");
        for (name, contribution) in &item.score.factors {
            out.push_str(&format!("| {name} | {contribution:.3} |\n"));
        }
        out.push('\n');

        let synthesis = item.synthesis();
        if !synthesis.summary.is_empty() {
            out.push_str(&format!("{}\n\n", synthesis.summary));
        }
        if !synthesis.key_features.is_empty() {
            out.push_str("**Key features:**\n");
            for feature in &synthesis.key_features {
                out.push_str(&format!("- {feature}\n"));
            }
            out.push('\n');
        }
        if !synthesis.relevance_rationale.is_empty() {
            out.push_str(&format!("**Relevance:** {}\n\n", synthesis.relevance_rationale));
        }
        if !synthesis.recommendations.is_empty() {
            out.push_str("**Recommendations:**\n");
            for rec in &synthesis.recommendations {
                out.push_str(&format!("- {rec}\n"));
            }
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::options::Mode;
    use crate::pipeline::types::{
        FetchedItem, ItemFailure, QualityLevel, QualityScore, RawItem, Stage, Synthesis,
        SynthesizedItem,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn scored(id: &str, title: &str, value: f64, level: QualityLevel) -> ScoredItem {
        ScoredItem {
            synthesized: SynthesizedItem {
                fetched: FetchedItem::passthrough(RawItem::new(id, "github_repo", title, "https://x")),
                synthesis: Synthesis {
                    summary: format!("About {title}"),
                    key_features: vec!["fast".into()],
                    recommendations: vec!["adopt".into()],
                    confidence: 0.8,
                    ..Synthesis::default()
                },
            },
            score: QualityScore {
                value,
                level,
                factors: BTreeMap::from([("recency".to_string(), value)]),
                confidence: 0.6,
                scored_at: Utc::now(),
            },
        }
    }

    fn make_run() -> PipelineRun {
        PipelineRun {
            query: "tui".into(),
            mode: Mode::Balanced,
            scored: vec![
                scored("a", "Alpha", 0.3, QualityLevel::Low),
                scored("b", "Beta", 0.8, QualityLevel::High),
            ],
            failures: vec![ItemFailure {
                index: 0,
                item_id: "a".into(),
                stage: Stage::Fetch,
                reason: "status 404".into(),
            }],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_is_ranked() {
        let out = ReportGenerator::render(&make_run(), ReportFormat::Summary).unwrap();
        let beta = out.find("[high] 0.80 Beta").unwrap();
        let alpha = out.find("[low] 0.30 Alpha").unwrap();
        assert!(beta < alpha);
        assert!(out.contains("1 item failure(s)"));
    }

    #[test]
    fn test_detailed_includes_factors_and_synthesis() {
        let out = ReportGenerator::render(&make_run(), ReportFormat::Detailed).unwrap();
        assert!(out.contains("## 1. Beta"));
        assert!(out.contains("| recency | 0.800 |"));
        assert!(out.contains("About Beta"));
        assert!(out.contains("- adopt"));
        assert!(out.contains("`a` (fetch): status 404"));
    }

    #[test]
    fn test_json_keeps_run_order() {
        let out = ReportGenerator::render(&make_run(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["scored"][0]["synthesized"]["fetched"]["raw"]["id"], "a");
        assert_eq!(value["scored"][1]["score"]["level"], "high");
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("markdown".parse::<ReportFormat>().unwrap(), ReportFormat::Detailed);
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
