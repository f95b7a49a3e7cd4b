//! Persistence of finished reports as standalone documents
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;

pub const DEFAULT_REPORT_NAME: &str = "research_result.html";
pub const STYLESHEET_URL: &str =
    "https://cdn.jsdelivr.net/npm/tailwindcss@2.2.19/dist/tailwind.min.css";

/// Somewhere reports can be written to and read back from by key
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Write `content` under `key` and return the path it can be retrieved from
    async fn put(&self, key: &str, content: &str) -> Result<String>;

    async fn get(&self, key: &str) -> Result<String>;
}

/// Wrap report markup in the minimal document needed to view it on its own
pub fn wrap_document(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <link href="{}" rel="stylesheet">
    <title>Research Report</title>
</head>
<body>
{}
</body>
</html>
"#,
        STYLESHEET_URL, body
    )
}

/// The store key for a session's report
pub fn report_key(session_id: Option<&str>) -> String {
    match session_id {
        Some(id) if validate_key(id).is_ok() => format!("research-{}.html", id),
        _ => DEFAULT_REPORT_NAME.to_string(),
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.chars().any(|c| c.is_control())
    {
        return Err(anyhow!("Invalid content key: {:?}", key));
    }
    Ok(())
}

/// Stores documents as files in one directory, served under `url_prefix`
#[derive(Debug, Clone)]
pub struct FsContentStore {
    dir: PathBuf,
    url_prefix: String,
}

impl FsContentStore {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, url_prefix: S) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
        }
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(&self, key: &str, content: &str) -> Result<String> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(key), content).await?;
        Ok(format!("{}/{}", self.url_prefix.trim_end_matches('/'), key))
    }

    async fn get(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        Ok(tokio::fs::read_to_string(self.dir.join(key)).await?)
    }
}
