use std::collections::HashSet;

use enfermera_client::types::{GroundingChunk, WebSource};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::messages::UNTITLED;

/// A cited web source, unique by `uri` within a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub uri: String,
}

/// Filters unusable citations and deduplicates by exact `uri`, keeping the
/// first occurrence of each.
pub fn transform(chunks: &[GroundingChunk]) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut articles = Vec::new();

    for chunk in chunks {
        let Some(web) = &chunk.web else {
            trace!(target: "enfermera_core", "dropping grounding chunk without web source");
            continue;
        };
        let (Some(uri), Some(title)) = (web.uri.as_deref(), web.title.as_deref()) else {
            trace!(target: "enfermera_core", "dropping grounding chunk with missing fields");
            continue;
        };
        if uri.is_empty() || !seen.insert(uri) {
            continue;
        }

        let title = if title.is_empty() { UNTITLED } else { title };
        articles.push(Article {
            title: title.to_string(),
            uri: uri.to_string(),
        });
    }

    articles
}

impl From<&Article> for GroundingChunk {
    fn from(article: &Article) -> Self {
        Self {
            web: Some(WebSource {
                uri: Some(article.uri.clone()),
                title: Some(article.title.clone()),
            }),
        }
    }
}
