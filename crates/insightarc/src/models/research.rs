//! Typed values that flow between the research pipeline stages
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

lazy_static! {
    static ref LIST_NUMBERING: Regex = Regex::new(r"^\d+\.\s*").unwrap();
}

/// The research topics a prompt is decomposed into
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchTopicSet {
    pub topics: Vec<String>,
}

impl ResearchTopicSet {
    /// Parse a numbered list, one topic per line.
    ///
    /// Blank lines are dropped and a leading `"<number>. "` is stripped. A list longer
    /// than `limit` is truncated; a shorter one is kept as-is.
    pub fn parse(text: &str, limit: usize) -> Self {
        let topics = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| LIST_NUMBERING.replace(line.trim(), "").trim().to_string())
            .filter(|topic| !topic.is_empty())
            .take(limit)
            .collect();
        Self { topics }
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Search-derived findings for a whole topic set, folded into one entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFindings {
    pub search_results: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStage {
    Structured,
    Refined,
}

/// Report markup without any document wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub stage: ReportStage,
    pub content: String,
}

impl ReportDocument {
    pub fn structured<S: Into<String>>(content: S) -> Self {
        Self {
            stage: ReportStage::Structured,
            content: content.into(),
        }
    }

    pub fn refined<S: Into<String>>(content: S) -> Self {
        Self {
            stage: ReportStage::Refined,
            content: content.into(),
        }
    }
}

/// One tool call made during a single agent run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub input: Value,
    /// The tool's output object, or `None` if the call failed
    pub output: Option<Value>,
    pub step: usize,
}

/// What a research run produced, decided from the typed stage outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResearchOutcome {
    Report { content: String },
    PlainText { content: String },
}

impl ResearchOutcome {
    /// The latest successful report-stage output wins; without one the final text is plain.
    pub fn from_run(final_text: &str, reports: &[ReportDocument]) -> Self {
        match reports.last() {
            Some(report) => ResearchOutcome::Report {
                content: report.content.clone(),
            },
            None => ResearchOutcome::PlainText {
                content: final_text.to_string(),
            },
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ResearchOutcome::Report { content } | ResearchOutcome::PlainText { content } => {
                content
            }
        }
    }

    pub fn is_report(&self) -> bool {
        matches!(self, ResearchOutcome::Report { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_numbered_list() {
        let text = "1. Ocean acidification\n2. Coral bleaching\n3. Deep-sea mining\n4. Marine protected areas";
        let topics = ResearchTopicSet::parse(text, 4);
        assert_eq!(
            topics.topics,
            vec![
                "Ocean acidification",
                "Coral bleaching",
                "Deep-sea mining",
                "Marine protected areas"
            ]
        );
    }

    #[test]
    fn test_parse_skips_blank_lines_and_unnumbered() {
        let text = "\n1. First\n\n   \nSecond without number\n10. Tenth\n";
        let topics = ResearchTopicSet::parse(text, 4);
        assert_eq!(topics.topics, vec!["First", "Second without number", "Tenth"]);
    }

    #[test]
    fn test_parse_fewer_topics_is_kept() {
        let topics = ResearchTopicSet::parse("1. Only one", 4);
        assert_eq!(topics.len(), 1);
    }

    #[test]
    fn test_parse_truncates_extra_topics() {
        let text = "1. a\n2. b\n3. c\n4. d\n5. e\n6. f";
        let topics = ResearchTopicSet::parse(text, 4);
        assert_eq!(topics.topics, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(ResearchTopicSet::parse("  \n\n", 4).is_empty());
    }

    #[test]
    fn test_outcome_prefers_latest_report() {
        let reports = vec![
            ReportDocument::structured("<h1>draft</h1>"),
            ReportDocument::refined("<h1 class=\"text-3xl\">final</h1>"),
        ];
        let outcome = ResearchOutcome::from_run("Here you go", &reports);
        assert_eq!(
            outcome,
            ResearchOutcome::Report {
                content: "<h1 class=\"text-3xl\">final</h1>".to_string()
            }
        );
    }

    #[test]
    fn test_outcome_without_reports_is_plain_even_with_markup() {
        let outcome = ResearchOutcome::from_run("<p>looks like html</p>", &[]);
        assert!(!outcome.is_report());
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"kind": "plain_text", "content": "<p>looks like html</p>"})
        );
    }
}
