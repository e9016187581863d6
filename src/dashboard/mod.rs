//! Dashboard widgets.
//!
//! Widgets are laid out on a grid, each backed by its own small query.
//! Clicking a chart publishes a cross-widget filter on the [`CrossFilterBus`]
//! that narrows every other widget.

mod bus;
mod pipeline;
mod render;
mod source;
mod widget;

pub use bus::{CrossFilterBus, CrossWidgetFilter};
pub use pipeline::{FetchedBatch, RenderBatch, WidgetPipeline};
pub use render::{
    renderer_for, ChartRenderer, ChartView, Dataset, KpiRenderer, KpiView, RenderOutput, Renderer,
    RendererRegistry, ResourceToken, ResourceTracker, TableRenderer, TableView,
};
pub use source::{QueryWidgetSource, WidgetData, WidgetDataSource};
pub use widget::{
    DashboardDocument, DataConfig, DataContext, DisplayOptions, GridLayout, MeasureSpec, Page,
    Theme, Widget, WidgetId, WidgetType,
};
