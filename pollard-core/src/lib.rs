//! # Pollard Core
//!
//! Core library for the Pollard research pipeline.
//! Turns raw search results into enriched, agent-interpreted and scored
//! research items, plus the configuration and error types around them.

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types at the crate root.
pub use config::{FetchConfig, PollardConfig, SynthesisConfig};
pub use error::{AgentError, ConfigError, FetchError, PollardError, Result, SynthesisError};
pub use pipeline::{
    FetchOpts, FetchedItem, Fetcher, Mode, Pipeline, PipelineRun, QualityLevel, QualityScore,
    RawItem, ReportFormat, ReportGenerator, RunOptions, ScoreOpts, ScoredItem, Scorer,
    SearchOpts, Searcher, StaticSearcher, SynthesizeOpts, Synthesis, SynthesizedItem,
    Synthesizer,
};
