//! The dashboard coordinator.

use std::sync::Arc;

use tokio::sync::watch;

use super::NoticeBoard;
use crate::config::{DashboardSettings, ExportSettings, Settings};
use crate::dashboard::{
    CrossFilterBus, CrossWidgetFilter, DashboardDocument, DataConfig, RenderOutput, Widget,
    WidgetDataSource, WidgetId, WidgetPipeline, WidgetType,
};
use crate::error::{EngineResult, Notice, NoticeKind};
use crate::export::{self, ExportError, ExportedFile, SvgOptions};
use crate::persist::{Autosaver, DashboardConfigStore, GridItem, SaveRequest, SaveStatus};
use crate::query::FieldRef;

/// State container of one open dashboard.
///
/// Owns the document, the cross-widget filters and the mounted renderers.
/// Geometry of the active page is kept as its own grid facet; widget configs
/// mirror it for rendering. Every layout or configuration change schedules a
/// debounced save that merges the two.
pub struct DashboardSession {
    document: DashboardDocument,
    grid: Vec<GridItem>,
    pipeline: WidgetPipeline,
    bus: CrossFilterBus,
    autosaver: Autosaver,
    save_status: watch::Receiver<SaveStatus>,
    settings: DashboardSettings,
    export: ExportSettings,
    notices: NoticeBoard,
}

impl DashboardSession {
    /// Open a session over `document`. Must be called inside a tokio runtime.
    pub fn new(
        document: DashboardDocument,
        source: Arc<dyn WidgetDataSource>,
        store: Arc<dyn DashboardConfigStore>,
        settings: &Settings,
    ) -> Self {
        let autosaver = Autosaver::spawn(store, settings.dashboard.autosave_delay());
        let save_status = autosaver.subscribe();
        let grid = document.active_widgets().iter().map(GridItem::of).collect();
        Self {
            document,
            grid,
            pipeline: WidgetPipeline::new(source),
            bus: CrossFilterBus::new(),
            autosaver,
            save_status,
            settings: settings.dashboard.clone(),
            export: settings.export.clone(),
            notices: NoticeBoard::default(),
        }
    }

    /// Load a stored dashboard and render it.
    pub async fn open(
        dashboard_id: &str,
        source: Arc<dyn WidgetDataSource>,
        store: Arc<dyn DashboardConfigStore>,
        settings: &Settings,
    ) -> EngineResult<Self> {
        let document = store.load(dashboard_id).await?;
        let mut session = Self::new(document, source, store, settings);
        session.refresh_all().await;
        Ok(session)
    }

    pub fn document(&self) -> &DashboardDocument {
        &self.document
    }

    pub fn widgets(&self) -> &[Widget] {
        self.document.active_widgets()
    }

    pub fn widget(&self, id: WidgetId) -> Option<&Widget> {
        self.widgets().iter().find(|w| w.id == id)
    }

    pub fn cross_filters(&self) -> &[CrossWidgetFilter] {
        self.bus.active()
    }

    pub fn output(&self, id: WidgetId) -> Option<&RenderOutput> {
        self.pipeline.output(id)
    }

    pub fn pipeline(&self) -> &WidgetPipeline {
        &self.pipeline
    }

    pub fn save_status(&self) -> SaveStatus {
        self.autosaver.status()
    }

    pub fn subscribe_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.autosaver.subscribe()
    }

    pub fn notices(&self) -> &[Notice] {
        self.notices.all()
    }

    pub fn take_transient_notices(&mut self) -> Vec<Notice> {
        self.poll_save_status();
        self.notices.take_transient()
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Add a widget of the type's default size and render its empty state.
    pub async fn add_widget(&mut self, widget_type: WidgetType, x: u32, y: u32) -> WidgetId {
        let columns = self.settings.grid_columns;
        let mut widget = Widget::new(widget_type, x, y);
        widget.layout.w = widget.layout.w.min(columns);
        widget.layout.x = x.min(columns.saturating_sub(widget.layout.w));
        let id = widget.id;
        if let Some(page) = self.document.active_page_mut() {
            self.grid.push(GridItem::of(&widget));
            page.widgets.push(widget);
        }
        tracing::debug!(widget = %id, widget_type = widget_type.as_str(), "widget added");
        self.render(|w| w.id == id).await;
        self.schedule_save();
        id
    }

    /// Delete a widget. Its renderer is disposed before this returns; any
    /// cross-widget filters it published are withdrawn.
    pub async fn delete_widget(&mut self, id: WidgetId) -> bool {
        let Some(page) = self.document.active_page_mut() else {
            return false;
        };
        let before = page.widgets.len();
        page.widgets.retain(|w| w.id != id);
        if page.widgets.len() == before {
            return false;
        }
        self.grid.retain(|item| item.id != id);

        self.pipeline.remove(id);
        tracing::debug!(widget = %id, "widget deleted");
        if self.bus.clear_source(id) {
            self.render(|_| true).await;
        }
        self.schedule_save();
        true
    }

    pub fn move_widget(&mut self, id: WidgetId, x: u32, y: u32) -> bool {
        let columns = self.settings.grid_columns;
        let moved = self.update_geometry(id, |item| {
            item.x = x.min(columns.saturating_sub(item.w));
            item.y = y;
        });
        if moved {
            self.schedule_save();
        }
        moved
    }

    pub fn resize_widget(&mut self, id: WidgetId, w: u32, h: u32) -> bool {
        let columns = self.settings.grid_columns;
        let resized = self.update_geometry(id, |item| {
            let max_width = columns.saturating_sub(item.x).max(1);
            item.w = w.clamp(1, max_width);
            item.h = h.max(1);
        });
        if resized {
            self.schedule_save();
        }
        resized
    }

    /// Replace a widget's data config and re-render it.
    ///
    /// A title that still matches the suggestion for the old config follows
    /// the new config.
    pub async fn configure_widget(&mut self, id: WidgetId, config: DataConfig) -> bool {
        let configured = self.update_widget(id, |w| {
            let follow_title = w.display.title == w.suggested_title();
            w.data_config = config;
            if follow_title {
                w.display.title = w.suggested_title();
            }
        });
        if !configured {
            return false;
        }

        if self.bus.clear_source(id) {
            self.render(|_| true).await;
        } else {
            self.render(|w| w.id == id).await;
        }
        self.schedule_save();
        true
    }

    pub fn rename_widget(&mut self, id: WidgetId, title: impl Into<String>) -> bool {
        let title = title.into();
        let renamed = self.update_widget(id, |w| w.display.title = title);
        if renamed {
            self.schedule_save();
        }
        renamed
    }

    pub fn grid(&self) -> &[GridItem] {
        &self.grid
    }

    /// Replace the grid facet with geometry reported by the layout surface.
    ///
    /// Widgets missing from `items` are left out of the next save; items
    /// with no widget are saved as empty table stubs.
    pub fn apply_grid(&mut self, items: Vec<GridItem>) {
        for item in &items {
            let layout = item.layout();
            self.update_widget(item.id, |w| w.layout = layout);
        }
        tracing::debug!(items = items.len(), "grid geometry applied");
        self.grid = items;
        self.schedule_save();
    }

    /// Edit one grid item and mirror its geometry onto the widget config.
    fn update_geometry(&mut self, id: WidgetId, f: impl FnOnce(&mut GridItem)) -> bool {
        let Some(item) = self.grid.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        f(item);
        let layout = item.layout();
        self.update_widget(id, |w| w.layout = layout)
    }

    fn update_widget(&mut self, id: WidgetId, f: impl FnOnce(&mut Widget)) -> bool {
        let widget = self
            .document
            .active_page_mut()
            .and_then(|page| page.widgets.iter_mut().find(|w| w.id == id));
        match widget {
            Some(widget) => {
                f(widget);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Cross-widget filters
    // ------------------------------------------------------------------

    /// Handle a click on a chart element.
    ///
    /// Publishes an equality filter on the chart's first dimension and
    /// re-renders every other widget.
    pub async fn click_chart(&mut self, id: WidgetId, index: usize) -> Option<CrossWidgetFilter> {
        let field = self.widget(id)?.data_config.dimensions.first()?.clone();
        let label = self.pipeline.click_label(id, index)?;

        let filter = CrossWidgetFilter::equals(id, field, label);
        tracing::debug!(source = %id, field = %filter.field, value = %filter.value, "cross filter published");
        self.bus.publish(filter.clone());
        self.render(|w| w.id != id).await;
        Some(filter)
    }

    pub async fn remove_cross_filter(&mut self, source: WidgetId, field: &FieldRef) -> bool {
        let removed = self.bus.remove(source, field);
        if removed {
            self.render(|w| w.id != source).await;
        }
        removed
    }

    pub async fn clear_cross_filters(&mut self) {
        if self.bus.is_empty() {
            return;
        }
        self.bus.clear();
        self.render(|_| true).await;
    }

    /// Re-render every widget. Returns the number mounted.
    pub async fn refresh_all(&mut self) -> usize {
        self.render(|_| true).await
    }

    async fn render(&mut self, filter: impl Fn(&Widget) -> bool) -> usize {
        let widgets: Vec<&Widget> = self.document.active_widgets().iter().filter(|&w| filter(w)).collect();
        if widgets.is_empty() {
            return 0;
        }
        let palette = if self.document.theme.palette.is_empty() {
            &self.settings.palette
        } else {
            &self.document.theme.palette
        };
        self.pipeline
            .render_all(
                &self.document.connection_id,
                &widgets,
                &self.bus,
                &self.document.data_context.joins,
                palette,
            )
            .await
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Snapshot the active page as an SVG image.
    pub fn export_image(&mut self) -> EngineResult<ExportedFile> {
        let options = SvgOptions {
            columns: self.settings.grid_columns,
            ..SvgOptions::default()
        };
        let pipeline = &self.pipeline;
        export::export_image(&self.document, options, |id| pipeline.output(id))
            .map_err(|e| self.notices.report("export_image", e.into()))
    }

    /// Export a widget's unfiltered data as CSV.
    pub async fn export_widget_csv(&mut self, id: WidgetId) -> EngineResult<ExportedFile> {
        match self.widget_csv(id).await {
            Ok(file) => Ok(file),
            Err(e) => Err(self.notices.report("export_widget_csv", e.into())),
        }
    }

    async fn widget_csv(&self, id: WidgetId) -> Result<ExportedFile, ExportError> {
        let widget = self.widget(id).ok_or(ExportError::UnknownWidget(id))?;
        let delimiter = self
            .export
            .delimiter_byte()
            .map_err(|e| ExportError::Csv(e.to_string()))?;
        let source = self.pipeline.source();
        export::export_widget_csv(
            source.as_ref(),
            &self.document.connection_id,
            widget,
            &self.document.data_context.joins,
            delimiter,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn schedule_save(&mut self) {
        self.poll_save_status();
        self.autosaver
            .schedule(SaveRequest::new(&self.document, self.grid.clone()));
    }

    /// Latest autosave state. A failed save not reported yet is posted as a
    /// transient notice.
    pub fn poll_save_status(&mut self) -> SaveStatus {
        if !self.save_status.has_changed().unwrap_or(false) {
            return self.save_status.borrow().clone();
        }
        let status = self.save_status.borrow_and_update().clone();
        if let SaveStatus::Failed { message } = &status {
            self.notices.push(Notice::new(
                NoticeKind::Transient,
                format!("Dashboard could not be saved: {message}"),
            ));
        }
        status
    }

    /// Dispose every renderer and flush a pending save.
    pub async fn shutdown(mut self) -> SaveStatus {
        self.pipeline.shutdown();
        let status = self.autosaver.shutdown().await;
        tracing::debug!(dashboard = %self.document.id, status = ?status, "dashboard session closed");
        status
    }
}
