//! Sequence-guarded query submission and the result view.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::pagination::{page_links, PageLink};
use super::sequence::{SequenceGuard, Ticket};
use super::{check_preconditions, ExecutionError, ExecutionResult, QueryExecutor, QueryResult};
use crate::query::{FormatSpec, QueryDefinition};

/// What the result area shows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResultView {
    #[default]
    Idle,
    Loading,
    Loaded(QueryResult),
    Failed { message: String },
}

impl ResultView {
    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            ResultView::Loaded(result) => Some(result),
            _ => None,
        }
    }

    pub fn formatted_rows(&self, formats: &BTreeMap<String, FormatSpec>) -> Vec<Vec<String>> {
        self.result()
            .map(|r| r.formatted_rows(formats))
            .unwrap_or_default()
    }
}

/// How a completed request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// A newer submission for the same target exists; the response was dropped.
    Discarded,
}

/// Submits definitions and tracks the result view of one target.
pub struct ExecutionGateway {
    executor: Arc<dyn QueryExecutor>,
    guard: SequenceGuard,
    target: String,
    view: ResultView,
    in_flight: usize,
    page_window: u32,
}

impl ExecutionGateway {
    pub fn new(executor: Arc<dyn QueryExecutor>, target: impl Into<String>) -> Self {
        Self {
            executor,
            guard: SequenceGuard::new(),
            target: target.into(),
            view: ResultView::Idle,
            in_flight: 0,
            page_window: 2,
        }
    }

    pub fn with_page_window(mut self, window: u32) -> Self {
        self.page_window = window;
        self
    }

    pub fn executor(&self) -> Arc<dyn QueryExecutor> {
        Arc::clone(&self.executor)
    }

    /// Check preconditions, issue a ticket and clear the view to loading.
    pub fn begin(&mut self, definition: &QueryDefinition) -> ExecutionResult<Ticket> {
        if let Err(e) = check_preconditions(definition) {
            self.view = ResultView::Failed {
                message: e.to_string(),
            };
            return Err(e);
        }
        let ticket = self.guard.issue(&self.target);
        self.in_flight += 1;
        self.view = ResultView::Loading;
        tracing::debug!(target_id = %ticket.target, seq = ticket.seq, "query submitted");
        Ok(ticket)
    }

    /// Apply a response unless a newer ticket superseded it.
    pub fn complete(&mut self, ticket: &Ticket, outcome: ExecutionResult<QueryResult>) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);
        if !self.guard.is_current(ticket) {
            tracing::debug!(target_id = %ticket.target, seq = ticket.seq, "discarding stale response");
            return Completion::Discarded;
        }
        self.view = match outcome {
            Ok(result) => {
                tracing::debug!(
                    target_id = %ticket.target,
                    rows = result.rows.len(),
                    total = result.total_rows,
                    "query completed"
                );
                ResultView::Loaded(result)
            }
            Err(e) => {
                tracing::warn!(target_id = %ticket.target, error = %e, "query failed");
                ResultView::Failed {
                    message: e.to_string(),
                }
            }
        };
        Completion::Applied
    }

    /// Run a definition to completion.
    ///
    /// Returns the execution error when the applied outcome is a failure; the
    /// view shows the failure and the previous result is not restored.
    pub async fn submit(&mut self, definition: &QueryDefinition) -> ExecutionResult<Completion> {
        let ticket = self.begin(definition)?;
        let outcome = self.executor.execute(definition).await;
        let error = outcome.as_ref().err().cloned();
        match self.complete(&ticket, outcome) {
            Completion::Applied => match error {
                Some(e) => Err(e),
                None => Ok(Completion::Applied),
            },
            Completion::Discarded => Ok(Completion::Discarded),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight > 0
    }

    pub fn view(&self) -> &ResultView {
        &self.view
    }

    pub fn result(&self) -> Option<&QueryResult> {
        self.view.result()
    }

    pub fn clear(&mut self) {
        self.guard.retire(&self.target);
        self.view = ResultView::Idle;
    }

    /// Pager links for the loaded result.
    pub fn page_links(&self) -> Vec<PageLink> {
        match self.result() {
            Some(r) => page_links(r.pagination.current_page, r.pagination.total_pages, self.page_window),
            None => Vec::new(),
        }
    }

    /// Surface an error in the result area without running anything.
    pub fn fail(&mut self, error: &ExecutionError) {
        self.view = ResultView::Failed {
            message: error.to_string(),
        };
    }
}
