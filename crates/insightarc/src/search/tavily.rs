use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{SearchOptions, SearchProvider, SearchResponse, SearchResult};

pub const TAVILY_HOST: &str = "https://api.tavily.com";

#[derive(Debug, Clone)]
pub struct TavilySearchConfig {
    pub host: String,
    pub api_key: String,
}

pub struct TavilySearchProvider {
    client: Client,
    config: TavilySearchConfig,
}

impl TavilySearchProvider {
    pub fn new(config: TavilySearchConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config })
    }

    fn parse_response(data: &Value) -> SearchResponse {
        let answer = data
            .get("answer")
            .and_then(|a| a.as_str())
            .filter(|a| !a.is_empty())
            .map(String::from);

        let results = data
            .get("results")
            .and_then(|r| r.as_array())
            .map(|arr| {
                arr.iter()
                    .map(|item| SearchResult {
                        title: item["title"].as_str().unwrap_or_default().to_string(),
                        url: item["url"].as_str().unwrap_or_default().to_string(),
                        content: item["content"].as_str().unwrap_or_default().to_string(),
                        score: item["score"].as_f64().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        SearchResponse { answer, results }
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
        let url = format!("{}/search", self.config.host.trim_end_matches('/'));
        let body = json!({
            "query": query,
            "search_depth": options.depth,
            "max_results": options.max_results,
            "include_answer": options.include_answer,
            "topic": options.topic,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let data: Value = response.json().await?;
                Ok(Self::parse_response(&data))
            }
            status => Err(anyhow!(
                "Tavily API error ({}): {}",
                status.as_u16(),
                response.text().await.unwrap_or_default()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::base::SearchDepth;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_for(server: &MockServer) -> TavilySearchProvider {
        TavilySearchProvider::new(TavilySearchConfig {
            host: server.uri(),
            api_key: "tvly-test".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_sends_options_and_parses_results() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer tvly-test"))
            .and(body_partial_json(json!({
                "query": "coral bleaching",
                "search_depth": "advanced",
                "max_results": 4,
                "include_answer": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "Bleaching is increasing.",
                "results": [
                    {"title": "NOAA", "url": "https://noaa.gov", "content": "Fourth global event.", "score": 0.98},
                    {"title": "Untitled", "url": "https://example.org"}
                ]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let options = SearchOptions {
            depth: SearchDepth::Advanced,
            max_results: 4,
            include_answer: true,
            topic: "general".to_string(),
        };
        let response = provider.search("coral bleaching", &options).await?;

        assert_eq!(response.answer.as_deref(), Some("Bleaching is increasing."));
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].title, "NOAA");
        assert_eq!(response.results[1].content, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .search("anything", &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("bad key"));
    }
}
