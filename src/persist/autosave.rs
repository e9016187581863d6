//! Debounced dashboard autosave.
//!
//! Every edit schedules a save. A background task waits for the configured
//! quiet period, restarting the wait on each new request, then merges the
//! latest grid geometry with the latest widget configs and writes the
//! document once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::layout::{merge_layout, GridItem};
use super::DashboardConfigStore;
use crate::dashboard::{DashboardDocument, Widget, WidgetId};

/// Observable state of the autosave.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Pending,
    Saved { revision: u64 },
    Failed { message: String },
}

/// Snapshot of the dashboard at the time of an edit.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub document: DashboardDocument,
    pub grid: Vec<GridItem>,
    pub configs: HashMap<WidgetId, Widget>,
}

impl SaveRequest {
    /// Snapshot the grid facet alongside the document's widgets as configs.
    pub fn new(document: &DashboardDocument, grid: Vec<GridItem>) -> Self {
        Self {
            document: document.clone(),
            grid,
            configs: document
                .active_widgets()
                .iter()
                .map(|w| (w.id, w.clone()))
                .collect(),
        }
    }

    /// Snapshot a document whose widgets carry their own geometry.
    pub fn from_document(document: &DashboardDocument) -> Self {
        let grid = document.active_widgets().iter().map(GridItem::of).collect();
        Self::new(document, grid)
    }

    fn into_document(self) -> DashboardDocument {
        let SaveRequest {
            mut document,
            grid,
            configs,
        } = self;
        let merged = merge_layout(&grid, &configs);
        if let Some(page) = document.active_page_mut() {
            page.widgets = merged;
        }
        document
    }
}

pub struct Autosaver {
    tx: mpsc::UnboundedSender<SaveRequest>,
    status: Arc<watch::Sender<SaveStatus>>,
    handle: JoinHandle<()>,
}

impl Autosaver {
    /// Start the autosave task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn DashboardConfigStore>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SaveStatus::Idle);
        let status = Arc::new(status);

        let handle = tokio::spawn(run(rx, store, delay, Arc::clone(&status)));

        Self { tx, status, handle }
    }

    /// Schedule a save of `request`, restarting the quiet period.
    pub fn schedule(&self, request: SaveRequest) {
        self.status.send_replace(SaveStatus::Pending);
        if self.tx.send(request).is_err() {
            tracing::warn!("autosave task has stopped, edit not saved");
            self.status.send_replace(SaveStatus::Failed {
                message: "autosave stopped".to_string(),
            });
        }
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    /// Stop the task, writing any pending save first.
    pub async fn shutdown(self) -> SaveStatus {
        let Autosaver { tx, status, handle } = self;
        drop(tx);
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "autosave task panicked");
        }
        let last = status.borrow().clone();
        last
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<SaveRequest>,
    store: Arc<dyn DashboardConfigStore>,
    delay: Duration,
    status: Arc<watch::Sender<SaveStatus>>,
) {
    let mut pending: Option<SaveRequest> = None;

    loop {
        match pending.take() {
            None => match rx.recv().await {
                Some(request) => {
                    status.send_replace(SaveStatus::Pending);
                    pending = Some(request);
                }
                None => break,
            },
            Some(request) => {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(newer) => pending = Some(newer),
                        None => {
                            save(store.as_ref(), request, &status).await;
                            break;
                        }
                    },
                    _ = tokio::time::sleep(delay) => {
                        save(store.as_ref(), request, &status).await;
                    }
                }
            }
        }
    }

    tracing::debug!("autosave task stopped");
}

async fn save(
    store: &dyn DashboardConfigStore,
    request: SaveRequest,
    status: &watch::Sender<SaveStatus>,
) {
    let document = request.into_document();
    match store.save(&document).await {
        Ok(revision) => {
            tracing::debug!(dashboard = %document.id, revision, "dashboard saved");
            status.send_replace(SaveStatus::Saved { revision });
        }
        Err(e) => {
            tracing::warn!(dashboard = %document.id, error = %e, "dashboard autosave failed");
            status.send_replace(SaveStatus::Failed {
                message: e.to_string(),
            });
        }
    }
}
