use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable a config field path is read from,
/// e.g. `provider.api_key` -> `INSIGHTARC_PROVIDER__API_KEY`
pub fn to_env_var(field_path: &str) -> String {
    let path = field_path
        .split('.')
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join("__");
    format!("INSIGHTARC_{}", path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("api_key"), "INSIGHTARC_API_KEY");
        assert_eq!(
            to_env_var("provider.api_key"),
            "INSIGHTARC_PROVIDER__API_KEY"
        );
        assert_eq!(to_env_var("search.host"), "INSIGHTARC_SEARCH__HOST");
    }

    #[test]
    fn test_missing_env_var_message() {
        let err = ConfigError::MissingEnvVar {
            env_var: to_env_var("search.api_key"),
        };
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: INSIGHTARC_SEARCH__API_KEY"
        );
    }
}
