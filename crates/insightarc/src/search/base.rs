use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub depth: SearchDepth,
    pub max_results: usize,
    pub include_answer: bool,
    pub topic: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            depth: SearchDepth::Advanced,
            max_results: 4,
            include_answer: true,
            topic: "general".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

/// Ranked results for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub answer: Option<String>,
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    /// Render the response as plain text for a model to read
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if let Some(answer) = &self.answer {
            out.push_str(&format!("Answer: {}\n\n", answer));
        }
        for (i, result) in self.results.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {}\n{}\n{}\n\n",
                i + 1,
                result.title,
                result.url,
                result.content
            ));
        }
        out.trim_end().to_string()
    }
}

/// The web search capability
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_text_numbers_results() {
        let response = SearchResponse {
            answer: Some("Reefs are warming.".to_string()),
            results: vec![SearchResult {
                title: "Coral report".to_string(),
                url: "https://example.org/coral".to_string(),
                content: "Bleaching events doubled.".to_string(),
                score: 0.9,
            }],
        };
        let text = response.to_text();
        assert!(text.starts_with("Answer: Reefs are warming."));
        assert!(text.contains("[1] Coral report\nhttps://example.org/coral"));
    }
}
