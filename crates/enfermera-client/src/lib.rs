pub mod types;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::types::{GenerateContentRequest, GenerateContentResponse};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const API_KEY_ENV: &str = "API_KEY";
pub const FALLBACK_API_KEY_ENV: &str = "GEMINI_API_KEY";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("API_KEY environment variable is not set (GEMINI_API_KEY is also accepted).")]
    MissingCredential,
    #[error("failed to build HTTP client: {0}")]
    Build(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("unexpected status code: {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// A generative model that can answer a prompt with web-search grounding.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate_grounded(&self, prompt: &str)
        -> Result<GenerateContentResponse, ClientError>;
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    config: ClientConfig,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"***")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn with_config(
        api_key: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::MissingCredential);
        }

        let http = Client::builder()
            .user_agent(concat!("Enfermera/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|err| ClientError::Build(err.to_string()))?;

        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    /// Reads the credential from the process environment.
    pub fn from_env(config: ClientConfig) -> Result<Self, ClientError> {
        let api_key = resolve_api_key(|name| std::env::var(name).ok())
            .ok_or(ClientError::MissingCredential)?;
        Self::with_config(api_key, config)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    #[instrument(name = "enfermera_client.generate_content", skip(self, request), fields(model = %self.config.model))]
    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ClientError> {
        let url = self.endpoint();
        debug!(target: "enfermera_client", url, "sending generateContent request");

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(target: "enfermera_client", %status, url, body = %body, "Gemini request failed");
            return Err(ClientError::Status { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate_grounded(
        &self,
        prompt: &str,
    ) -> Result<GenerateContentResponse, ClientError> {
        self.generate_content(&GenerateContentRequest::grounded(prompt))
            .await
    }
}

/// First non-blank value of `API_KEY`, then `GEMINI_API_KEY`.
pub fn resolve_api_key(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    [API_KEY_ENV, FALLBACK_API_KEY_ENV]
        .into_iter()
        .filter_map(|name| lookup(name))
        .find(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn api_key_prefers_primary_variable() {
        let key = resolve_api_key(lookup(&[
            (API_KEY_ENV, "primary"),
            (FALLBACK_API_KEY_ENV, "fallback"),
        ]));
        assert_eq!(key.as_deref(), Some("primary"));
    }

    #[test]
    fn api_key_falls_back_when_primary_blank() {
        let key = resolve_api_key(lookup(&[
            (API_KEY_ENV, "  "),
            (FALLBACK_API_KEY_ENV, "fallback"),
        ]));
        assert_eq!(key.as_deref(), Some("fallback"));
        assert!(resolve_api_key(lookup(&[])).is_none());
    }

    #[test]
    fn blank_key_is_missing_credential() {
        let error = GeminiClient::with_config("", ClientConfig::default())
            .expect_err("blank key must be rejected");
        assert!(matches!(error, ClientError::MissingCredential));
        assert_eq!(
            error.to_string(),
            "API_KEY environment variable is not set (GEMINI_API_KEY is also accepted)."
        );
    }

    #[test]
    fn status_error_keeps_the_response_body() {
        let error = ClientError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "{\"error\":{\"message\":\"quota exceeded\"}}".to_string(),
        };
        let rendered = error.to_string();
        assert!(rendered.starts_with("unexpected status code: 429 Too Many Requests"));
        assert!(rendered.contains("quota exceeded"));
    }

    #[test]
    fn endpoint_uses_model_and_trims_base_url() {
        let client = GeminiClient::with_config(
            "secret",
            ClientConfig {
                base_url: "http://localhost:9000/v1beta/".to_string(),
                ..ClientConfig::default()
            },
        )
        .expect("client builds");
        assert_eq!(
            client.endpoint(),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert!(!format!("{client:?}").contains("secret"));
    }

    #[tokio::test]
    async fn unreachable_backend_reports_http_error() {
        let client = GeminiClient::with_config(
            "secret",
            ClientConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                timeout: Duration::from_secs(2),
                ..ClientConfig::default()
            },
        )
        .expect("client builds");
        let error = client
            .generate_grounded("gripe")
            .await
            .expect_err("nothing listens on the discard port");
        assert!(matches!(error, ClientError::Http(_)));
    }
}
