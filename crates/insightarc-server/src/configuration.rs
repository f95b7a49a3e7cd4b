use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use insightarc::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use insightarc::research::ResearchConfig;
use insightarc::search::base::SearchDepth;
use insightarc::search::tavily::{TavilySearchConfig, TAVILY_HOST};
use insightarc::store::DEFAULT_REPORT_NAME;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum SearchSettings {
    Tavily {
        #[serde(default = "default_tavily_host")]
        host: String,
        api_key: String,
    },
}

impl SearchSettings {
    pub fn into_config(self) -> TavilySearchConfig {
        match self {
            SearchSettings::Tavily { host, api_key } => TavilySearchConfig { host, api_key },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResearchSettings {
    #[serde(default = "default_topic_count")]
    pub topic_count: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_search_max_steps")]
    pub search_max_steps: usize,
    #[serde(default)]
    pub search_depth: SearchDepth,
    #[serde(default = "default_include_answer")]
    pub include_answer: bool,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        let config = ResearchConfig::default();
        Self {
            topic_count: config.topic_count,
            max_steps: config.max_steps,
            search_max_steps: config.search_max_steps,
            search_depth: config.search_depth,
            include_answer: config.include_answer,
        }
    }
}

impl ResearchSettings {
    pub fn into_config(self) -> ResearchConfig {
        ResearchConfig {
            topic_count: self.topic_count,
            max_steps: self.max_steps,
            search_max_steps: self.search_max_steps,
            search_depth: self.search_depth,
            include_answer: self.include_answer,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_report_name")]
    pub default_name: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            url_prefix: default_url_prefix(),
            default_name: default_report_name(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    pub search: SearchSettings,
    #[serde(default)]
    pub research: ResearchSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Capability defaults
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            .set_default("search.host", default_tavily_host())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("INSIGHTARC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Both the NotFound variant and serde's "missing field" message name the field
                let error_str = err.to_string();
                if let Some(field) = missing_field(&error_str) {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// Pull the field path out of "missing field `api_key` for key `provider`"
fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    match rest
        .strip_prefix(" for key `")
        .and_then(|key| key.split_once('`'))
    {
        Some((parent, _)) => Some(format!("{}.{}", parent, field)),
        None => Some(field.to_string()),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_tavily_host() -> String {
    TAVILY_HOST.to_string()
}

fn default_topic_count() -> usize {
    ResearchConfig::default().topic_count
}

fn default_max_steps() -> usize {
    ResearchConfig::default().max_steps
}

fn default_search_max_steps() -> usize {
    ResearchConfig::default().search_max_steps
}

fn default_include_answer() -> bool {
    true
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./public/generated")
}

fn default_url_prefix() -> String {
    "/generated".to_string()
}

fn default_report_name() -> String {
    DEFAULT_REPORT_NAME.to_string()
}
