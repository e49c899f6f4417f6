//! Research pipeline: Search → Fetch → Synthesize → Score.
//!
//! 1. **Search**: a [`Searcher`] produces raw items
//! 2. **Fetch**: type-dispatched content enrichment with bounded parallelism
//! 3. **Synthesize**: one external agent process per item, lenient JSON parsing
//! 4. **Score**: weighted multi-factor quality with temporal decay
//!
//! Every stage returns exactly one output per input, in input order. Item-level
//! failures are recorded on the item and never abort the batch.

pub mod agent;
pub mod fetcher;
pub mod options;
pub mod pool;
pub mod report;
pub mod runner;
pub mod scorer;
pub mod search;
pub mod synthesizer;
pub mod types;

pub use agent::{AgentOutput, AgentRunner, ProcessAgent};
pub use fetcher::Fetcher;
pub use options::{
    FetchOpts, HalfLives, Mode, ScoreOpts, ScoreThresholds, ScoreWeights, SearchOpts,
    SynthesizeOpts,
};
pub use pool::{Interruption, WorkerPool};
pub use report::{ReportFormat, ReportGenerator};
pub use runner::{Pipeline, PipelineRun, RunOptions};
pub use scorer::{Scorer, rank};
pub use search::{Searcher, StaticSearcher};
pub use synthesizer::Synthesizer;
pub use types::{
    ContentCategory, FetchedItem, ItemFailure, ItemKind, QualityLevel, QualityScore, RawItem,
    ScoredItem, Stage, StageOutput, Synthesis, SynthesizedItem,
};
