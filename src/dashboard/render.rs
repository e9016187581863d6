//! Widget renderers and their lifecycle.
//!
//! Every mounted renderer holds a [`ResourceToken`]. The token is released
//! when the renderer is disposed or dropped, so a renderer abandoned on an
//! error path still frees its slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::source::WidgetData;
use super::widget::{Widget, WidgetId, WidgetType};
use crate::query::{compact, plain};

/// Counts live renderer resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> ResourceToken {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        ResourceToken {
            live: Arc::clone(&self.live),
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of resources held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A held renderer resource, released on drop.
#[derive(Debug)]
pub struct ResourceToken {
    live: Arc<AtomicUsize>,
}

impl Drop for ResourceToken {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub widget_type: WidgetType,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
    /// One color per label, cycling through the palette.
    pub colors: Vec<String>,
    pub show_legend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiView {
    pub label: String,
    pub value: Option<f64>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderOutput {
    Chart(ChartView),
    Kpi(KpiView),
    Table(TableView),
    Empty { message: String },
    Error { message: String },
}

impl RenderOutput {
    pub fn empty(message: impl Into<String>) -> Self {
        RenderOutput::Empty {
            message: message.into(),
        }
    }
}

/// A mounted visualization of one widget.
pub trait Renderer: Send {
    fn render(&mut self, widget: &Widget, data: &WidgetData) -> &RenderOutput;

    /// Show a fetch failure in place of the visualization.
    fn fail(&mut self, message: String) {
        self.set_output(RenderOutput::Error { message });
    }

    fn set_output(&mut self, output: RenderOutput);

    fn output(&self) -> &RenderOutput;

    /// Label of the clicked element, for renderers that support clicks.
    fn click(&self, _index: usize) -> Option<String> {
        None
    }

    /// Release the renderer's resources. Idempotent.
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

/// Shared renderer state: the resource token and the last output.
struct Mount {
    token: Option<ResourceToken>,
    output: RenderOutput,
}

impl Mount {
    fn new(tracker: &ResourceTracker) -> Self {
        Self {
            token: Some(tracker.acquire()),
            output: RenderOutput::empty("Loading"),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

macro_rules! mount_accessors {
    () => {
        fn set_output(&mut self, output: RenderOutput) {
            self.mount.output = output;
        }

        fn output(&self) -> &RenderOutput {
            &self.mount.output
        }

        fn dispose(&mut self) {
            self.mount.token.take();
        }

        fn is_disposed(&self) -> bool {
            self.mount.token.is_none()
        }
    };
}

/// Bar, line, pie and doughnut charts.
pub struct ChartRenderer {
    mount: Mount,
    palette: Vec<String>,
}

impl ChartRenderer {
    pub fn new(tracker: &ResourceTracker, palette: Vec<String>) -> Self {
        Self {
            mount: Mount::new(tracker),
            palette,
        }
    }
}

impl Renderer for ChartRenderer {
    fn render(&mut self, widget: &Widget, data: &WidgetData) -> &RenderOutput {
        let config = &widget.data_config;
        let label_idx = config
            .dimensions
            .first()
            .and_then(|d| data.column_index(&d.qualified()));

        let labels: Vec<String> = match label_idx {
            Some(idx) => data
                .rows
                .iter()
                .map(|r| r.get(idx).map(plain).unwrap_or_default())
                .collect(),
            None => data.rows.iter().map(|_| widget.display.title.clone()).collect(),
        };

        let datasets = config
            .measures
            .iter()
            .filter_map(|m| {
                let header = m.header();
                let idx = data.column_index(&header)?;
                Some(Dataset {
                    label: header,
                    data: data.rows.iter().map(|r| r.get(idx).and_then(as_number)).collect(),
                })
            })
            .collect();

        let colors = if self.palette.is_empty() {
            Vec::new()
        } else {
            (0..labels.len())
                .map(|i| self.palette[i % self.palette.len()].clone())
                .collect()
        };

        self.mount.output = if data.is_empty() {
            RenderOutput::empty("No data")
        } else {
            RenderOutput::Chart(ChartView {
                widget_type: widget.widget_type,
                labels,
                datasets,
                colors,
                show_legend: widget.display.show_legend,
            })
        };
        &self.mount.output
    }

    fn click(&self, index: usize) -> Option<String> {
        match &self.mount.output {
            RenderOutput::Chart(chart) => chart.labels.get(index).cloned(),
            _ => None,
        }
    }

    mount_accessors!();
}

/// Single-figure widget.
pub struct KpiRenderer {
    mount: Mount,
}

impl KpiRenderer {
    pub fn new(tracker: &ResourceTracker) -> Self {
        Self {
            mount: Mount::new(tracker),
        }
    }
}

impl Renderer for KpiRenderer {
    fn render(&mut self, widget: &Widget, data: &WidgetData) -> &RenderOutput {
        let measure = widget.data_config.measures.first();
        self.mount.output = match (measure, data.rows.first()) {
            (None, _) => RenderOutput::empty("Add a measure"),
            (Some(_), None) => RenderOutput::empty("No data"),
            (Some(measure), Some(row)) => {
                let header = measure.header();
                let value = data
                    .column_index(&header)
                    .and_then(|idx| row.get(idx))
                    .and_then(as_number);
                RenderOutput::Kpi(KpiView {
                    label: measure.label.clone().unwrap_or(header),
                    value,
                    text: value.map(compact).unwrap_or_else(|| "-".to_string()),
                })
            }
        };
        &self.mount.output
    }

    mount_accessors!();
}

/// Raw tabular widget.
pub struct TableRenderer {
    mount: Mount,
}

impl TableRenderer {
    pub fn new(tracker: &ResourceTracker) -> Self {
        Self {
            mount: Mount::new(tracker),
        }
    }
}

impl Renderer for TableRenderer {
    fn render(&mut self, _widget: &Widget, data: &WidgetData) -> &RenderOutput {
        self.mount.output = if data.is_empty() {
            RenderOutput::empty("No rows")
        } else {
            RenderOutput::Table(TableView {
                headers: data.headers.clone(),
                rows: data
                    .rows
                    .iter()
                    .map(|r| r.iter().map(plain).collect())
                    .collect(),
            })
        };
        &self.mount.output
    }

    mount_accessors!();
}

/// Create the renderer for a widget type.
pub fn renderer_for(widget_type: WidgetType, tracker: &ResourceTracker, palette: &[String]) -> Box<dyn Renderer> {
    match widget_type {
        WidgetType::Bar | WidgetType::Line | WidgetType::Pie | WidgetType::Doughnut => {
            Box::new(ChartRenderer::new(tracker, palette.to_vec()))
        }
        WidgetType::Kpi => Box::new(KpiRenderer::new(tracker)),
        WidgetType::Table => Box::new(TableRenderer::new(tracker)),
    }
}

/// Exactly one live renderer per widget.
#[derive(Default)]
pub struct RendererRegistry {
    tracker: ResourceTracker,
    mounted: HashMap<WidgetId, Box<dyn Renderer>>,
    disposals: usize,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    /// Mount a renderer, disposing the widget's previous one first.
    pub fn mount(&mut self, id: WidgetId, renderer: Box<dyn Renderer>) {
        self.dispose(id);
        self.mounted.insert(id, renderer);
    }

    /// Dispose and forget a widget's renderer. Returns true if one was mounted.
    pub fn dispose(&mut self, id: WidgetId) -> bool {
        match self.mounted.remove(&id) {
            Some(mut renderer) => {
                renderer.dispose();
                self.disposals += 1;
                true
            }
            None => false,
        }
    }

    pub fn dispose_all(&mut self) {
        let ids: Vec<WidgetId> = self.mounted.keys().copied().collect();
        for id in ids {
            self.dispose(id);
        }
    }

    pub fn get(&self, id: WidgetId) -> Option<&dyn Renderer> {
        self.mounted.get(&id).map(|r| r.as_ref())
    }

    pub fn output(&self, id: WidgetId) -> Option<&RenderOutput> {
        self.get(id).map(|r| r.output())
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.len()
    }

    pub fn disposal_count(&self) -> usize {
        self.disposals
    }

    pub fn live_resources(&self) -> usize {
        self.tracker.live()
    }

    pub fn peak_resources(&self) -> usize {
        self.tracker.peak()
    }
}
