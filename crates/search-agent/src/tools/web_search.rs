use reqwest::{Client, StatusCode};
use schemars::{JsonSchema, schema_for};
use search_agent_core::tool::{Error as ToolError, Tool, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
const DEFAULT_MAX_RESULTS: usize = 3;
const MAX_CONTENT_CHARS: usize = 1000;
const NO_RESULT: &str = "No good search result found";

/// Input of [`WebSearchTool`].
#[derive(Deserialize, JsonSchema)]
pub struct WebSearchParameters {
    #[schemars(description = "The search query.")]
    query: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize, Serialize)]
struct SearchHit {
    title: String,
    url: String,
    content: String,
}

/// A web search tool backed by the Tavily search API.
///
/// The tool answers with a JSON array of `{title, url, content}` objects.
pub struct WebSearchTool {
    client: Client,
    api_key: String,
    base_url: String,
    max_results: usize,
    parameter_schema: Value,
}

impl WebSearchTool {
    /// Creates a new web search tool with the given API key.
    #[inline]
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        WebSearchTool {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            max_results: DEFAULT_MAX_RESULTS,
            parameter_schema: schema_for!(WebSearchParameters).to_value(),
        }
    }

    /// Sets the search endpoint, e.g. for a self-hosted gateway.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Sets the maximum number of results per search.
    #[inline]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

impl Tool for WebSearchTool {
    type Input = WebSearchParameters;

    fn name(&self) -> &str {
        "tavily_search_results_json"
    }

    fn description(&self) -> &str {
        "A search engine optimized for comprehensive, accurate, and trusted \
results. Useful for when you need to answer questions about current events. \
Input should be a search query."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: WebSearchParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let url = format!("{}/search", self.base_url);
        let api_key = self.api_key.clone();
        let max_results = self.max_results;

        async move {
            debug!("searching for {:?}", input.query);
            let resp = client
                .post(&url)
                .json(&SearchRequest {
                    api_key: &api_key,
                    query: &input.query,
                    max_results,
                })
                .send()
                .await
                .map_err(|err| {
                    ToolError::execution_error()
                        .with_reason(format!("search request failed: {err}"))
                })?;

            let status = resp.status();
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            {
                return Err(ToolError::unauthorized().with_reason(format!(
                    "search API rejected the credential ({status})"
                )));
            }
            if !status.is_success() {
                let mut body = resp.text().await.unwrap_or_default();
                truncate_chars(&mut body, MAX_CONTENT_CHARS);
                return Err(ToolError::execution_error().with_reason(format!(
                    "search API returned {status}: {body}"
                )));
            }

            let body: SearchResponse = resp.json().await.map_err(|err| {
                ToolError::execution_error()
                    .with_reason(format!("malformed search response: {err}"))
            })?;
            format_hits(body.results, max_results)
        }
    }
}

fn format_hits(mut hits: Vec<SearchHit>, max_results: usize) -> ToolResult {
    hits.truncate(max_results);
    if hits.is_empty() {
        return Ok(NO_RESULT.to_owned());
    }
    for hit in &mut hits {
        truncate_chars(&mut hit.content, MAX_CONTENT_CHARS);
    }
    serde_json::to_string(&hits).map_err(|err| {
        ToolError::execution_error().with_reason(err.to_string())
    })
}

/// Keeps at most `max` chars of `text`, cutting on a char boundary.
fn truncate_chars(text: &mut String, max: usize) {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
    }
}
