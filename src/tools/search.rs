//! Supplier Finder 工具：调用 Tavily 兼容搜索 API 查找供应商
//!
//! POST JSON（api_key / query / max_results / include_answer），把结果渲染为
//! `Search results for **q**:` 加若干 `- \[title\](url)` 条目；无结果时返回说明文本而非错误。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::tools::Tool;

pub const SUPPLIER_FINDER: &str = "Supplier Finder";

pub const DEFAULT_SEARCH_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

pub struct SupplierSearchTool {
    client: Client,
    api_url: String,
    api_key: String,
    max_results: usize,
}

impl SupplierSearchTool {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, max_results: usize, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            max_results,
        }
    }

    async fn search(&self, query: &str) -> Result<SearchResponse, String> {
        let body = SearchRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
            include_answer: true,
        };
        let resp = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Error during search: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("Error during search: HTTP {}", resp.status()));
        }
        resp.json::<SearchResponse>()
            .await
            .map_err(|e| format!("Error during search: {e}"))
    }
}

fn render_results(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results found for '{query}'.");
    }
    let mut out = format!("Search results for **{query}**:\n");
    for hit in hits {
        let title = hit.title.as_deref().unwrap_or("No title");
        out.push_str(&format!("- \\[{}\\]({})\n  {}\n\n", title, hit.url, hit.content));
    }
    out.trim().to_string()
}

#[async_trait]
impl Tool for SupplierSearchTool {
    fn name(&self) -> &str {
        SUPPLIER_FINDER
    }

    fn description(&self) -> &str {
        "Search suppliers by product name, barcode, or category."
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        let query = input.trim();
        if query.is_empty() {
            return Ok("No query provided.".to_string());
        }
        tracing::info!(query = %query, "supplier search");
        let resp = self.search(query).await?;
        Ok(render_results(query, &resp.results))
    }
}
