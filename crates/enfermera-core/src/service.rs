use std::sync::Arc;

use enfermera_client::GenerativeBackend;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::messages::BACKEND_UNAVAILABLE;
use crate::transform::{transform, Article};

/// Summary and citations produced for one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub summary: String,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("{}", BACKEND_UNAVAILABLE)]
    BackendUnavailable,
}

/// Inclusive range of publication years the model is asked to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyWindow {
    pub from: u16,
    pub to: u16,
}

impl Default for RecencyWindow {
    fn default() -> Self {
        Self {
            from: 2020,
            to: 2025,
        }
    }
}

#[derive(Clone)]
pub struct QueryService {
    backend: Arc<dyn GenerativeBackend>,
    window: RecencyWindow,
}

impl QueryService {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            window: RecencyWindow::default(),
        }
    }

    #[must_use]
    pub fn with_recency(mut self, window: RecencyWindow) -> Self {
        self.window = window;
        self
    }

    pub fn recency(&self) -> RecencyWindow {
        self.window
    }

    pub fn prompt(&self, topic: &str) -> String {
        let RecencyWindow { from, to } = self.window;
        format!(
            "Actuando como un asistente de enfermería con IA con alcance global, realiza una búsqueda exhaustiva en la web sobre el tema de salud \"{topic}\", priorizando fuentes médicas y científicas de alta calidad de cualquier país y en cualquier idioma. Busca publicaciones entre {from} y {to}.
Después de analizar las fuentes más relevantes a nivel mundial, proporciona un resumen bien estructurado y fácil de leer en español, utilizando el formato Markdown. El resumen debe sintetizar los hallazgos clave de las diversas fuentes internacionales.
El resumen debe incluir:
- Un encabezado principal (##).
- Puntos clave resaltados con viñetas (*).
- Texto importante en negrita (**texto**).
El objetivo es presentar una perspectiva global y actualizada sobre el tema, presentando la información de manera clara y concisa para una fácil comprensión."
        )
    }

    /// Issues exactly one grounded generation call for `topic`.
    ///
    /// Backend faults are logged and collapsed into
    /// [`QueryError::BackendUnavailable`]; their details never reach callers.
    #[instrument(name = "enfermera_core.find_articles", skip(self))]
    pub async fn find_articles(&self, topic: &str) -> Result<SearchResult, QueryError> {
        let prompt = self.prompt(topic);
        let response = self
            .backend
            .generate_grounded(&prompt)
            .await
            .map_err(|source| {
                error!(
                    target: "enfermera_core",
                    error = %source,
                    "error fetching articles from Gemini API"
                );
                QueryError::BackendUnavailable
            })?;

        let summary = response.text().unwrap_or_default();
        let articles = transform(response.grounding_chunks());
        debug!(
            target: "enfermera_core",
            chunks = response.grounding_chunks().len(),
            articles = articles.len(),
            "search completed"
        );
        Ok(SearchResult { summary, articles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use enfermera_client::types::GenerateContentResponse;
    use enfermera_client::ClientError;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recording {
        prompts: Mutex<Vec<String>>,
        reply: Result<serde_json::Value, ClientError>,
    }

    #[async_trait]
    impl GenerativeBackend for Recording {
        async fn generate_grounded(
            &self,
            prompt: &str,
        ) -> Result<GenerateContentResponse, ClientError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map(|value| serde_json::from_value(value).unwrap())
        }
    }

    fn service(reply: Result<serde_json::Value, ClientError>) -> (Arc<Recording>, QueryService) {
        let backend = Arc::new(Recording {
            prompts: Mutex::new(Vec::new()),
            reply,
        });
        (backend.clone(), QueryService::new(backend))
    }

    #[test]
    fn prompt_embeds_topic_and_window() {
        let (_, service) = service(Ok(json!({})));
        let service = service.with_recency(RecencyWindow {
            from: 2019,
            to: 2024,
        });
        let prompt = service.prompt("  gripe aviar ");
        assert!(prompt.contains("\"  gripe aviar \""));
        assert!(prompt.contains("entre 2019 y 2024"));
        assert!(prompt.contains("(##)"));
        assert!(prompt.contains("(*)"));
        assert!(prompt.contains("(**texto**)"));
    }

    #[tokio::test]
    async fn success_maps_text_and_citations() {
        let (backend, service) = service(Ok(json!({
            "candidates": [{
                "content": {"parts": [{"text": "## Resumen"}]},
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "http://a.com", "title": "A"}},
                    {"web": {"uri": "http://a.com", "title": "A dup"}}
                ]}
            }]
        })));

        let result = service.find_articles("gripe").await.unwrap();
        assert_eq!(result.summary, "## Resumen");
        assert_eq!(result.articles.len(), 1);
        assert_eq!(backend.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_fields_produce_empty_result() {
        let (_, service) = service(Ok(json!({"candidates": []})));
        let result = service.find_articles("gripe").await.unwrap();
        assert_eq!(result, SearchResult::default());
    }

    #[tokio::test]
    async fn failures_collapse_to_backend_unavailable() {
        let (backend, service) = service(Err(ClientError::Http("connection reset".into())));
        let error = service.find_articles("gripe").await.unwrap_err();
        assert_eq!(error, QueryError::BackendUnavailable);
        assert_eq!(error.to_string(), BACKEND_UNAVAILABLE);
        assert!(!error.to_string().contains("connection reset"));
        assert_eq!(backend.prompts.lock().unwrap().len(), 1);
    }
}
