//! Environment-based configuration.

use std::env;
use std::str::FromStr;

use thiserror::Error;

/// Variables that must be set before anything else runs.
pub const REQUIRED_VARIABLES: [&str; 3] =
    ["OPENAI_API_KEY", "HELICONE_API_KEY", "TAVILY_API_KEY"];

const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OPENAI_BASE_URL: &str = "https://oai.hconeai.com/v1";
const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";
const DEFAULT_SEARCH_MAX_RESULTS: usize = 3;

/// Errors found while loading the configuration.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Required variables are missing or empty.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),

    /// A variable is set to a value that can't be used.
    #[error("invalid value `{value}` for {name}: {reason}")]
    InvalidValue {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Settings of the search agent.
#[derive(Clone)]
pub struct Config {
    /// Key for the model endpoint.
    pub openai_api_key: String,
    /// Key for the Helicone proxy and trace endpoint.
    pub helicone_api_key: String,
    /// Key for the Tavily search API.
    pub tavily_api_key: String,
    /// Model name, `OPENAI_MODEL`.
    pub model: String,
    /// Model endpoint, `OPENAI_BASE_URL`. Defaults to the Helicone proxy.
    pub openai_base_url: String,
    /// Search endpoint, `TAVILY_BASE_URL`.
    pub tavily_base_url: String,
    /// Results per search, `SEARCH_MAX_RESULTS`.
    pub search_max_results: usize,
    /// Where loop events are posted, `HELICONE_TRACE_URL`. Events are not
    /// posted if unset.
    pub helicone_trace_url: Option<String>,
}

impl Config {
    /// Loads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads the configuration with `lookup` resolving variable names.
    ///
    /// Empty values count as unset. Every missing required variable is
    /// reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup =
            |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_VARIABLES
            .into_iter()
            .filter(|&name| lookup(name).is_none())
            .map(str::to_owned)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVariables(missing));
        }
        let required = |name: &str| lookup(name).unwrap_or_default();

        let search_max_results = match lookup("SEARCH_MAX_RESULTS") {
            Some(value) => parse_positive("SEARCH_MAX_RESULTS", &value)?,
            None => DEFAULT_SEARCH_MAX_RESULTS,
        };

        Ok(Self {
            openai_api_key: required("OPENAI_API_KEY"),
            helicone_api_key: required("HELICONE_API_KEY"),
            tavily_api_key: required("TAVILY_API_KEY"),
            model: lookup("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            openai_base_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_owned()),
            tavily_base_url: lookup("TAVILY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TAVILY_BASE_URL.to_owned()),
            search_max_results,
            helicone_trace_url: lookup("HELICONE_TRACE_URL"),
        })
    }
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let invalid = |reason: String| ConfigError::InvalidValue {
        name: name.to_owned(),
        value: value.to_owned(),
        reason,
    };
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|err: T::Err| invalid(err.to_string()))?;
    if parsed == T::default() {
        return Err(invalid("must be greater than zero".to_owned()));
    }
    Ok(parsed)
}

// Keys must never end up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("openai_base_url", &self.openai_base_url)
            .field("tavily_base_url", &self.tavily_base_url)
            .field("search_max_results", &self.search_max_results)
            .field("helicone_trace_url", &self.helicone_trace_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const ALL_KEYS: [(&str, &str); 3] = [
        ("OPENAI_API_KEY", "sk-test"),
        ("HELICONE_API_KEY", "sk-helicone"),
        ("TAVILY_API_KEY", "tvly-test"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&ALL_KEYS)).unwrap();
        assert_eq!(config.openai_api_key, "sk-test");
        assert_eq!(config.helicone_api_key, "sk-helicone");
        assert_eq!(config.tavily_api_key, "tvly-test");
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.openai_base_url, "https://oai.hconeai.com/v1");
        assert_eq!(config.tavily_base_url, "https://api.tavily.com");
        assert_eq!(config.search_max_results, 3);
        assert_eq!(config.helicone_trace_url, None);

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-test"));
        assert!(!debug.contains("tvly-test"));
    }

    #[test]
    fn test_missing_credentials() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("HELICONE_API_KEY", "  "),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingVariables(vec![
                "HELICONE_API_KEY".to_owned(),
                "TAVILY_API_KEY".to_owned(),
            ])
        );
        assert_eq!(
            err.to_string(),
            "missing required environment variables: HELICONE_API_KEY, \
             TAVILY_API_KEY"
        );
    }

    #[test]
    fn test_overrides() {
        let mut vars = ALL_KEYS.to_vec();
        vars.extend([
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
            ("SEARCH_MAX_RESULTS", "5"),
            ("HELICONE_TRACE_URL", "http://localhost:8585/v1/trace"),
        ]);
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.openai_base_url, "http://localhost:8080/v1");
        assert_eq!(config.search_max_results, 5);
        assert_eq!(
            config.helicone_trace_url.as_deref(),
            Some("http://localhost:8585/v1/trace")
        );
    }

    #[test]
    fn test_invalid_max_results() {
        for value in ["zero", "0", "-1"] {
            let mut vars = ALL_KEYS.to_vec();
            vars.push(("SEARCH_MAX_RESULTS", value));
            let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref name, .. }
                    if name == "SEARCH_MAX_RESULTS"
            ));
        }
    }
}
