use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a `models/{model}:generateContent` call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

impl GenerateContentRequest {
    /// Single-turn user prompt with Google Search grounding enabled.
    pub fn grounded(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![RequestPart {
                    text: prompt.into(),
                }],
            }],
            tools: vec![Tool::google_search()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<RequestPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<GoogleSearch>,
}

impl Tool {
    pub fn google_search() -> Self {
        Self {
            google_search: Some(GoogleSearch {}),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GoogleSearch {}

/// Response envelope. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Option<Vec<GroundingChunk>>,
    #[serde(default)]
    pub web_search_queries: Option<Vec<String>>,
}

/// A raw citation record as returned by the grounding tool.
///
/// Decoding never fails: anything that is not the expected shape collapses
/// into absent fields so one bad record cannot poison the whole response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub struct GroundingChunk {
    pub web: Option<WebSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebSource {
    pub uri: Option<String>,
    pub title: Option<String>,
}

impl From<Value> for GroundingChunk {
    fn from(value: Value) -> Self {
        let web = value
            .get("web")
            .and_then(Value::as_object)
            .map(|web| WebSource {
                uri: web.get("uri").and_then(Value::as_str).map(str::to_owned),
                title: web.get("title").and_then(Value::as_str).map(str::to_owned),
            });
        Self { web }
    }
}

impl GroundingChunk {
    pub fn web(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            web: Some(WebSource {
                uri: Some(uri.into()),
                title: Some(title.into()),
            }),
        }
    }
}

impl GenerateContentResponse {
    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.as_ref()?.first()
    }

    /// Concatenated text of the first candidate, skipping thought parts.
    pub fn text(&self) -> Option<String> {
        let parts = self
            .first_candidate()?
            .content
            .as_ref()?
            .parts
            .as_ref()?;
        let mut found = false;
        let mut text = String::new();
        for part in parts.iter().filter(|part| !part.thought.unwrap_or(false)) {
            if let Some(chunk) = &part.text {
                found = true;
                text.push_str(chunk);
            }
        }
        found.then_some(text)
    }

    pub fn grounding_chunks(&self) -> &[GroundingChunk] {
        self.first_candidate()
            .and_then(|candidate| candidate.grounding_metadata.as_ref())
            .and_then(|metadata| metadata.grounding_chunks.as_deref())
            .unwrap_or_default()
    }
}
