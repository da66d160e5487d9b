use std::fmt::{self, Debug};

/// Default sampling temperature, zero keeps tool selection reproducible.
const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Builder for [`OpenAIConfig`].
#[derive(Clone, PartialEq)]
pub struct OpenAIConfigBuilder {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    headers: Vec<(String, String)>,
    tag_header_prefix: Option<String>,
}

impl OpenAIConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
            temperature: None,
            headers: vec![],
            tag_header_prefix: None,
        }
    }

    /// Sets the model to use.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL, e.g. a logging proxy in front of the API.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the sampling temperature used for every request.
    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Adds a header that is sent with every request.
    #[inline]
    pub fn with_header<K: Into<String>, V: Into<String>>(
        mut self,
        name: K,
        value: V,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Forwards request tags as headers named `{prefix}{key}`.
    ///
    /// Tags are dropped if no prefix is set.
    #[inline]
    pub fn with_tag_header_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.tag_header_prefix = Some(prefix.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> OpenAIConfig {
        let base_url = self
            .base_url
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        OpenAIConfig {
            api_key: self.api_key,
            model: self.model.unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            base_url: base_url.trim_end_matches('/').to_owned(),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            headers: self.headers,
            tag_header_prefix: self.tag_header_prefix,
        }
    }
}

impl Debug for OpenAIConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfigBuilder")
            .field("api_key", &"<deducted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("headers", &RedactedHeaders(&self.headers))
            .field("tag_header_prefix", &self.tag_header_prefix)
            .finish()
    }
}

/// Configuration for the OpenAI-compatible provider.
#[derive(Clone, PartialEq)]
pub struct OpenAIConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) temperature: f32,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) tag_header_prefix: Option<String>,
}

impl OpenAIConfig {
    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the base URL, without a trailing slash.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the sampling temperature.
    #[inline]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub(crate) fn tag_headers<'a>(
        &'a self,
        tags: &'a [(String, String)],
    ) -> impl Iterator<Item = (String, &'a str)> + 'a {
        self.tag_header_prefix.iter().flat_map(move |prefix| {
            tags.iter()
                .map(move |(key, value)| (format!("{prefix}{key}"), value.as_str()))
        })
    }
}

impl Debug for OpenAIConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &"<deducted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("headers", &RedactedHeaders(&self.headers))
            .field("tag_header_prefix", &self.tag_header_prefix)
            .finish()
    }
}

/// Header values usually carry credentials, only the names are printed.
struct RedactedHeaders<'a>(&'a [(String, String)]);

impl Debug for RedactedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|(name, _)| name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OpenAIConfigBuilder::with_api_key("sk-xxx")
            .with_base_url("https://oai.hconeai.com/v1/")
            .build();
        assert_eq!(config.model(), "gpt-3.5-turbo");
        assert_eq!(config.base_url(), "https://oai.hconeai.com/v1");
        assert_eq!(config.temperature(), 0.0);
    }

    #[test]
    fn test_tag_headers() {
        let tags = vec![("Session".to_owned(), "weather_query_sf".to_owned())];

        let config = OpenAIConfigBuilder::with_api_key("sk-xxx").build();
        assert_eq!(config.tag_headers(&tags).count(), 0);

        let config = OpenAIConfigBuilder::with_api_key("sk-xxx")
            .with_tag_header_prefix("Helicone-Property-")
            .build();
        let headers: Vec<_> = config.tag_headers(&tags).collect();
        assert_eq!(
            headers,
            vec![(
                "Helicone-Property-Session".to_owned(),
                "weather_query_sf"
            )]
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = OpenAIConfigBuilder::with_api_key("sk-secret")
            .with_header("Helicone-Auth", "Bearer hk-secret")
            .build();
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(!printed.contains("hk-secret"));
        assert!(printed.contains("Helicone-Auth"));
    }
}
