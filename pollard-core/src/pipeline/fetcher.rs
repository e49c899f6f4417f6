//! Fetch stage: type-dispatched content enrichment with bounded parallelism.
//!
//! Every input produces exactly one `FetchedItem`. Failures are recorded on the
//! item (`fetch_success = false`, `fetch_error`) and never abort the batch.

use super::options::{FetchOpts, Mode};
use super::pool::WorkerPool;
use super::types::{FetchedItem, ItemFailure, ItemKind, Metadata, RawItem, Stage, StageOutput};
use crate::config::FetchConfig;
use crate::error::FetchError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_PARALLELISM: usize = 5;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const USER_AGENT: &str = "Pollard/1.0";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";
/// Body cap for direct page fetches.
const MAX_PAGE_BYTES: usize = 1024 * 1024;

/// Content retrieved for one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedContent {
    pub content: String,
    pub content_type: String,
    pub extra_data: Metadata,
}

impl FetchedContent {
    fn new(content: impl Into<String>, content_type: &str) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.to_string(),
            extra_data: Metadata::new(),
        }
    }
}

/// README payload returned by the code-host contents API.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadmeResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}

/// Retrieves type-specific content for raw items.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    parallelism: usize,
    github_api_base: String,
    github_token: Option<String>,
}

impl Fetcher {
    /// Create a fetcher with the default request timeout. A parallelism of zero
    /// uses the default of 5.
    pub fn new(parallelism: usize) -> Result<Self, FetchError> {
        Self::with_timeout(parallelism, REQUEST_TIMEOUT, USER_AGENT)
    }

    fn with_timeout(
        parallelism: usize,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            parallelism: if parallelism == 0 {
                DEFAULT_PARALLELISM
            } else {
                parallelism
            },
            github_api_base: GITHUB_API_BASE.to_string(),
            github_token: None,
        })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let fetcher = Self::with_timeout(
            config.parallelism,
            Duration::from_secs(config.request_timeout_secs.max(1)),
            &config.user_agent,
        )?
        .with_github_api_base(&config.github_api_base);
        Ok(match &config.github_token {
            Some(token) if !token.is_empty() => fetcher.with_github_token(token),
            _ => fetcher,
        })
    }

    /// Point README requests at a different API host (enterprise installs, tests).
    pub fn with_github_api_base(mut self, base: impl Into<String>) -> Self {
        self.github_api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_github_token(mut self, token: impl Into<String>) -> Self {
        self.github_token = Some(token.into());
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Fetch content for a batch of items concurrently.
    ///
    /// Always returns one item per input, in input order.
    pub async fn fetch_batch(
        &self,
        items: Vec<RawItem>,
        opts: &FetchOpts,
        cancel: &CancellationToken,
    ) -> StageOutput<FetchedItem> {
        if items.is_empty() {
            return StageOutput::default();
        }

        let pool = WorkerPool::new("fetch", self.parallelism);
        let fetcher = Arc::new(self.clone());
        let task_opts = opts.clone();
        let task_cancel = cancel.clone();

        let fetched = pool
            .run(
                items,
                cancel,
                move |_, item| {
                    let fetcher = Arc::clone(&fetcher);
                    let opts = task_opts.clone();
                    let cancel = task_cancel.clone();
                    async move {
                        fetcher
                            .fetch_item(Arc::unwrap_or_clone(item), &opts, &cancel)
                            .await
                    }
                },
                |_, item, reason| FetchedItem::failed(Arc::unwrap_or_clone(item), reason),
            )
            .await;

        let failures: Vec<ItemFailure> = fetched
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.fetch_success)
            .map(|(index, item)| ItemFailure {
                index,
                item_id: item.raw.id.clone(),
                stage: Stage::Fetch,
                reason: item.fetch_error.clone().unwrap_or_default(),
            })
            .collect();

        info!(
            total = fetched.len(),
            failed = failures.len(),
            mode = %opts.mode,
            "Fetch stage complete"
        );

        StageOutput {
            items: fetched,
            failures,
        }
    }

    /// Fetch a single item, converting any error into a failed `FetchedItem`.
    pub async fn fetch_item(
        &self,
        item: RawItem,
        opts: &FetchOpts,
        cancel: &CancellationToken,
    ) -> FetchedItem {
        match self.fetch_one(&item, opts, cancel).await {
            Ok(None) => FetchedItem::passthrough(item),
            Ok(Some(found)) => FetchedItem {
                content: found.content,
                content_type: found.content_type,
                extra_data: found.extra_data,
                fetched_at: Utc::now(),
                ..FetchedItem::passthrough(item)
            },
            Err(e) => {
                warn!(item = %item.id, kind = %item.kind, error = %e, "Fetch failed");
                FetchedItem::failed(item, e)
            }
        }
    }

    /// Retrieve content for one item.
    ///
    /// `Ok(None)` means the item passes through without added content.
    pub async fn fetch_one(
        &self,
        item: &RawItem,
        opts: &FetchOpts,
        cancel: &CancellationToken,
    ) -> Result<Option<FetchedContent>, FetchError> {
        if opts.mode == Mode::Quick {
            return Ok(None);
        }

        debug!(item = %item.id, kind = %item.kind, "Fetching item");

        match &item.kind {
            ItemKind::GithubRepo => {
                if !opts.fetch_readme {
                    return Ok(None);
                }
                let (owner, name) = github_repository(item).ok_or(FetchError::MissingRepository)?;
                let readme = self.fetch_readme(&owner, &name, opts.timeout, cancel).await?;
                let mut found = FetchedContent::new(readme, "readme");
                found.extra_data.insert("owner".into(), Value::String(owner));
                found.extra_data.insert("name".into(), Value::String(name));
                Ok(Some(found))
            }
            ItemKind::HnStory => Ok(item
                .meta_str("story_text")
                .map(|text| FetchedContent::new(text, "story_text"))),
            ItemKind::ArxivPaper => Ok(item
                .meta_str("abstract")
                .map(|text| FetchedContent::new(text, "abstract"))),
            ItemKind::OpenalexWork => {
                if let Some(text) = item.meta_str("abstract") {
                    return Ok(Some(FetchedContent::new(text, "abstract")));
                }
                if !opts.fetch_docs {
                    return Ok(None);
                }
                Ok(item
                    .metadata
                    .get("abstract_inverted_index")
                    .and_then(reconstruct_abstract)
                    .map(|text| {
                        let mut found = FetchedContent::new(text, "abstract");
                        found
                            .extra_data
                            .insert("abstract_source".into(), "inverted_index".into());
                        found
                    }))
            }
            ItemKind::Other(_) => Ok(None),
        }
    }

    /// Fetch and decode a repository README via the code-host API.
    pub async fn fetch_readme(
        &self,
        owner: &str,
        name: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let url = format!("{}/repos/{owner}/{name}/readme", self.github_api_base);
        debug!(url = %url, "Requesting README");

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT);
        if let Some(token) = &self.github_token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            res = request.send() => res.map_err(FetchError::request)?,
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body: ReadmeResponse = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            body = response.json() => body.map_err(|e| FetchError::Body {
                message: e.to_string(),
            })?,
        };
        decode_readme(body)
    }

    /// Fetch a page directly, keeping at most 1 MiB of the body.
    pub async fn fetch_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            res = self.client.get(url).send() => res.map_err(FetchError::request)?,
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let mut body = Vec::new();
        while body.len() < MAX_PAGE_BYTES {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                chunk = response.chunk() => chunk.map_err(FetchError::request)?,
            };
            let Some(chunk) = chunk else { break };
            let remaining = MAX_PAGE_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Resolve `(owner, name)` for a repository item from metadata or its URL.
pub fn github_repository(item: &RawItem) -> Option<(String, String)> {
    if let (Some(owner), Some(name)) = (item.meta_str("owner"), item.meta_str("name")) {
        return Some((owner.trim().to_string(), name.trim().to_string()));
    }

    let segments: Vec<String> = match url::Url::parse(item.url.trim()) {
        Ok(url) => {
            let host = url.host_str()?;
            if host != "github.com" && host != "www.github.com" {
                return None;
            }
            url.path_segments()?
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        }
        // Bare "owner/name" references.
        Err(_) => item
            .url
            .trim()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    };

    match segments.as_slice() {
        [owner, name, ..] if !owner.contains(' ') && !name.contains(' ') => {
            let name = name.trim_end_matches(".git");
            if name.is_empty() {
                None
            } else {
                Some((owner.clone(), name.to_string()))
            }
        }
        _ => None,
    }
}

/// Decode a README payload, handling base64 bodies with embedded line breaks.
pub fn decode_readme(response: ReadmeResponse) -> Result<String, FetchError> {
    if !response.encoding.eq_ignore_ascii_case("base64") {
        return Ok(response.content);
    }
    let cleaned: String = response
        .content
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect();
    let bytes = STANDARD.decode(cleaned).map_err(|e| FetchError::Decode {
        message: e.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Rebuild abstract text from a word → positions inverted index.
fn reconstruct_abstract(index: &Value) -> Option<String> {
    let map = index.as_object()?;
    let mut words: Vec<(u64, &str)> = map
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_u64)
                .map(move |pos| (pos, word.as_str()))
        })
        .collect();
    if words.is_empty() {
        return None;
    }
    words.sort_by_key(|(pos, _)| *pos);
    Some(
        words
            .into_iter()
            .map(|(_, word)| word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}
