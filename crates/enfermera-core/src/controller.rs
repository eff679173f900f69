use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::messages::{EMPTY_TOPIC, SEARCH_IN_PROGRESS};
use crate::service::{QueryError, QueryService, SearchResult};
use crate::state::SearchSessionState;

pub type StateWatcher = watch::Receiver<SearchSessionState>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("{}", EMPTY_TOPIC)]
    EmptyTopic,
    #[error("{}", SEARCH_IN_PROGRESS)]
    Busy,
    #[error(transparent)]
    Backend(#[from] QueryError),
}

/// Owns the session state and drives it through `search()`.
///
/// At most one search runs at a time: a call made while another is in
/// flight is rejected with [`SearchError::Busy`] and leaves the state as it
/// was. Every change is published to subscribers.
#[derive(Clone)]
pub struct SearchController {
    service: QueryService,
    state: Arc<watch::Sender<SearchSessionState>>,
}

impl SearchController {
    pub fn new(service: QueryService) -> Self {
        let (sender, _) = watch::channel(SearchSessionState::default());
        Self {
            service,
            state: Arc::new(sender),
        }
    }

    pub fn service(&self) -> &QueryService {
        &self.service
    }

    pub fn snapshot(&self) -> SearchSessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> StateWatcher {
        self.state.subscribe()
    }

    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.state.send_if_modified(|state| {
            if state.query == query {
                return false;
            }
            state.query = query;
            true
        });
    }

    pub async fn search(&self, topic: &str) -> Result<(), SearchError> {
        let mut admission = Ok(());
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if state.is_loading {
                admission = Err(SearchError::Busy);
                return false;
            }
            if topic.trim().is_empty() {
                admission = Err(SearchError::EmptyTopic);
                state.error = Some(EMPTY_TOPIC.to_string());
                return true;
            }
            previous = Some(state.clone());
            state.begin_search(topic);
            true
        });

        if let Err(error) = admission {
            debug!(target: "enfermera_core", %error, "search rejected");
            return Err(error);
        }

        info!(target: "enfermera_core", topic, "search started");
        let in_flight = InFlight {
            state: &self.state,
            previous: previous.unwrap_or_default(),
            settled: false,
        };
        let outcome = self.service.find_articles(topic).await;
        in_flight.settle(outcome.clone());
        outcome.map(|_| ()).map_err(SearchError::from)
    }
}

/// Puts back the pre-search state when the search future is dropped early.
struct InFlight<'a> {
    state: &'a watch::Sender<SearchSessionState>,
    previous: SearchSessionState,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: Result<SearchResult, QueryError>) {
        self.state.send_modify(|state| state.complete(outcome));
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(target: "enfermera_core", "search abandoned before completion");
            let previous = std::mem::take(&mut self.previous);
            self.state.send_replace(previous);
        }
    }
}
