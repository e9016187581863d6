//! Widget rendering pipeline.
//!
//! Fetches each widget's data under the effective cross-widget filters and
//! mounts a fresh renderer for the result. Rendering is split in three
//! steps so fetches can overlap: [`WidgetPipeline::prepare`] issues tickets,
//! [`RenderBatch::fetch`] runs without borrowing the pipeline, and
//! [`WidgetPipeline::apply`] mounts results whose ticket is still current.

use std::sync::Arc;

use super::bus::{CrossFilterBus, CrossWidgetFilter};
use super::render::{renderer_for, RenderOutput, RendererRegistry};
use super::source::{WidgetData, WidgetDataSource};
use super::widget::{Widget, WidgetId};
use crate::execute::{ExecutionResult, SequenceGuard, Ticket};
use crate::query::Join;

/// Widgets whose data is about to be fetched.
pub struct RenderBatch {
    source: Arc<dyn WidgetDataSource>,
    connection_id: String,
    joins: Vec<Join>,
    items: Vec<(Widget, Ticket, Vec<CrossWidgetFilter>)>,
}

/// Fetch outcomes waiting to be mounted.
pub struct FetchedBatch {
    items: Vec<(Widget, Ticket, Option<ExecutionResult<WidgetData>>)>,
}

impl RenderBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fetch every widget's data concurrently. Widgets without a data
    /// config are not fetched.
    pub async fn fetch(self) -> FetchedBatch {
        let RenderBatch {
            source,
            connection_id,
            joins,
            items,
        } = self;

        let fetches = items.iter().map(|(widget, _, filters)| {
            let source = Arc::clone(&source);
            let connection_id = connection_id.as_str();
            let joins = joins.as_slice();
            async move {
                if widget.data_config.is_empty() {
                    return None;
                }
                Some(source.fetch(connection_id, widget, filters, joins).await)
            }
        });
        let outcomes = futures::future::join_all(fetches).await;

        FetchedBatch {
            items: items
                .into_iter()
                .zip(outcomes)
                .map(|((widget, ticket, _), outcome)| (widget, ticket, outcome))
                .collect(),
        }
    }
}

pub struct WidgetPipeline {
    source: Arc<dyn WidgetDataSource>,
    registry: RendererRegistry,
    guard: SequenceGuard,
}

impl WidgetPipeline {
    pub fn new(source: Arc<dyn WidgetDataSource>) -> Self {
        Self {
            source,
            registry: RendererRegistry::new(),
            guard: SequenceGuard::new(),
        }
    }

    pub fn source(&self) -> Arc<dyn WidgetDataSource> {
        Arc::clone(&self.source)
    }

    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    /// Issue tickets for `widgets`, superseding earlier renders of them.
    pub fn prepare(
        &self,
        connection_id: &str,
        widgets: &[&Widget],
        bus: &CrossFilterBus,
        joins: &[Join],
    ) -> RenderBatch {
        let items = widgets
            .iter()
            .map(|w| {
                let ticket = self.guard.issue(&w.id.to_string());
                ((*w).clone(), ticket, bus.effective_for(w.id))
            })
            .collect();
        RenderBatch {
            source: Arc::clone(&self.source),
            connection_id: connection_id.to_string(),
            joins: joins.to_vec(),
            items,
        }
    }

    /// Mount renderers for fetched data. Stale outcomes are dropped.
    /// Returns the number of widgets mounted.
    pub fn apply(&mut self, batch: FetchedBatch, palette: &[String]) -> usize {
        let mut mounted = 0;
        for (widget, ticket, outcome) in batch.items {
            if !self.guard.is_current(&ticket) {
                tracing::debug!(widget = %widget.id, seq = ticket.seq, "discarding stale widget data");
                continue;
            }
            self.registry.dispose(widget.id);
            let mut renderer = renderer_for(widget.widget_type, self.registry.tracker(), palette);
            match outcome {
                None => renderer.set_output(RenderOutput::empty("Configure this widget")),
                Some(Ok(data)) => {
                    renderer.render(&widget, &data);
                }
                Some(Err(e)) => {
                    tracing::warn!(widget = %widget.id, error = %e, "widget data fetch failed");
                    renderer.fail(e.to_string());
                }
            }
            self.registry.mount(widget.id, renderer);
            mounted += 1;
        }
        mounted
    }

    /// Render several widgets to completion.
    pub async fn render_all(
        &mut self,
        connection_id: &str,
        widgets: &[&Widget],
        bus: &CrossFilterBus,
        joins: &[Join],
        palette: &[String],
    ) -> usize {
        let batch = self.prepare(connection_id, widgets, bus, joins);
        let fetched = batch.fetch().await;
        self.apply(fetched, palette)
    }

    /// Dispose a widget's renderer and drop any in-flight render for it.
    pub fn remove(&mut self, id: WidgetId) -> bool {
        self.guard.retire(&id.to_string());
        self.registry.dispose(id)
    }

    pub fn output(&self, id: WidgetId) -> Option<&RenderOutput> {
        self.registry.output(id)
    }

    /// Label under a click on a chart element.
    pub fn click_label(&self, id: WidgetId, index: usize) -> Option<String> {
        self.registry.get(id).and_then(|r| r.click(index))
    }

    pub fn shutdown(&mut self) {
        self.registry.dispose_all();
    }
}
