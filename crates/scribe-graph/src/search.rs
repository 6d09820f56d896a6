use crate::config::SearchConfig;
use async_trait::async_trait;
use scribe_core::{ScribeError, ScribeResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One web search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Text of the result.
    pub snippet: String,
    /// Heading shown for the result.
    pub title: String,
    /// URL of the source.
    pub link: String,
}

/// The hits found for one planned subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectResults {
    /// Subject as the planner phrased it.
    pub subject: String,
    /// Hits in rank order; empty when the search failed.
    pub hits: Vec<SearchHit>,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Runs `query`.
    async fn search(&self, query: &str) -> ScribeResult<Vec<SearchHit>>;
}

/// Search through the DuckDuckGo Instant Answer API.
pub struct DuckDuckGoSearch {
    http: reqwest::Client,
    base_url: String,
    num_results: usize,
}

impl DuckDuckGoSearch {
    /// A client for the endpoint in `config`.
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            num_results: config.num_results,
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> ScribeResult<Vec<SearchHit>> {
        let resp = self
            .http
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ScribeError::Search(e.to_string()))?;

        let status = resp.status();
        // DuckDuckGo answers 202 instead of 429 when it throttles.
        if status.as_u16() == 429 || status.as_u16() == 202 {
            return Err(ScribeError::Search(format!("rate limited ({status})")));
        }
        if !status.is_success() {
            return Err(ScribeError::Search(format!("search API error {status}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ScribeError::Search(e.to_string()))?;
        let hits = parse_instant_answer(&body, self.num_results);
        debug!(query, hits = hits.len(), "Search finished");
        Ok(hits)
    }
}

/// Extracts up to `limit` hits from an Instant Answer response: the abstract
/// first, then related topics in order, descending into topic groups.
pub fn parse_instant_answer(body: &Value, limit: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let abstract_text = body["AbstractText"].as_str().unwrap_or_default();
    if !abstract_text.is_empty() {
        hits.push(SearchHit {
            snippet: abstract_text.to_string(),
            title: body["Heading"].as_str().unwrap_or_default().to_string(),
            link: body["AbstractURL"].as_str().unwrap_or_default().to_string(),
        });
    }

    let mut topics: Vec<&Value> = Vec::new();
    for topic in body["RelatedTopics"].as_array().into_iter().flatten() {
        match topic["Topics"].as_array() {
            Some(group) => topics.extend(group),
            None => topics.push(topic),
        }
    }

    for topic in topics {
        let (Some(text), Some(link)) = (topic["Text"].as_str(), topic["FirstURL"].as_str()) else {
            continue;
        };
        let title = text.split(" - ").next().unwrap_or(text);
        hits.push(SearchHit {
            snippet: text.to_string(),
            title: title.to_string(),
            link: link.to_string(),
        });
    }

    hits.truncate(limit);
    hits
}
