use serde::Serialize;

use crate::service::{QueryError, SearchResult};
use crate::transform::Article;

/// Everything the presentation layer needs to draw the current screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchSessionState {
    pub query: String,
    pub summary: String,
    pub articles: Vec<Article>,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub has_searched: bool,
}

impl SearchSessionState {
    pub(crate) fn begin_search(&mut self, topic: &str) {
        self.query = topic.to_string();
        self.is_loading = true;
        self.error = None;
        self.articles.clear();
        self.summary.clear();
        self.has_searched = true;
    }

    pub(crate) fn complete(&mut self, outcome: Result<SearchResult, QueryError>) {
        match outcome {
            Ok(result) => {
                self.summary = result.summary;
                self.articles = result.articles;
            }
            Err(error) => self.error = Some(error.to_string()),
        }
        self.is_loading = false;
    }

    pub fn view(&self) -> View {
        View::select(self)
    }
}

/// The mutually exclusive screens, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Loading,
    Error,
    EmptyResults,
    Results,
    Welcome,
}

impl View {
    pub fn select(state: &SearchSessionState) -> Self {
        if state.is_loading {
            View::Loading
        } else if state.error.is_some() {
            View::Error
        } else if state.has_searched && state.articles.is_empty() {
            View::EmptyResults
        } else if !state.articles.is_empty() {
            View::Results
        } else {
            View::Welcome
        }
    }
}
