//! Search stage seam.
//!
//! Source-specific clients live outside this crate; they implement
//! [`Searcher`] and hand the pipeline a batch of [`RawItem`]s.

use super::options::SearchOpts;
use super::types::{ItemKind, RawItem};
use crate::error::{PollardError, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Produces the raw items a run starts from.
#[async_trait]
pub trait Searcher: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, opts: &SearchOpts) -> Result<Vec<RawItem>>;
}

/// Serves a fixed, pre-collected batch, filtered by [`SearchOpts`].
#[derive(Debug, Clone, Default)]
pub struct StaticSearcher {
    items: Vec<RawItem>,
}

impl StaticSearcher {
    pub fn new(items: Vec<RawItem>) -> Self {
        Self { items }
    }

    /// Parse a JSON array of items.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let items: Vec<RawItem> = serde_json::from_str(json)?;
        Ok(Self::new(items))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| PollardError::Search {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    pub fn items(&self) -> &[RawItem] {
        &self.items
    }
}

#[async_trait]
impl Searcher for StaticSearcher {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, query: &str, opts: &SearchOpts) -> Result<Vec<RawItem>> {
        let mut items: Vec<RawItem> = self
            .items
            .iter()
            .filter(|item| passes(item, opts))
            .cloned()
            .collect();
        if opts.max_results > 0 {
            items.truncate(opts.max_results);
        }
        debug!(
            query,
            available = self.items.len(),
            returned = items.len(),
            "Static search"
        );
        Ok(items)
    }
}

fn passes(item: &RawItem, opts: &SearchOpts) -> bool {
    let popular_enough = match item.kind {
        ItemKind::GithubRepo => item.meta_count("stars").unwrap_or(0) >= opts.min_stars,
        ItemKind::HnStory => item.meta_count("points").unwrap_or(0) >= opts.min_points,
        _ => true,
    };
    if !popular_enough {
        return false;
    }
    opts.categories.is_empty()
        || opts.categories.iter().any(|wanted| {
            let wanted = wanted.trim().to_lowercase();
            wanted == item.kind.as_str() || wanted == item.kind.category().as_str()
        })
}
