//! Widgets and dashboard documents.

use std::fmt;

use inflector::Inflector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::default_palette;
use crate::query::{Aggregation, ColumnSpec, FieldRef, Join};

/// Stable widget identity, fresh on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(pub Uuid);

impl WidgetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WidgetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    Bar,
    Line,
    Pie,
    Doughnut,
    Kpi,
    Table,
}

impl WidgetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetType::Bar => "bar_chart",
            WidgetType::Line => "line_chart",
            WidgetType::Pie => "pie_chart",
            WidgetType::Doughnut => "doughnut_chart",
            WidgetType::Kpi => "kpi",
            WidgetType::Table => "table",
        }
    }

    pub fn is_chart(&self) -> bool {
        matches!(self, WidgetType::Bar | WidgetType::Line | WidgetType::Pie | WidgetType::Doughnut)
    }

    /// Grid size `(w, h)` of a freshly added widget.
    pub fn default_size(&self) -> (u32, u32) {
        match self {
            WidgetType::Bar | WidgetType::Line => (6, 4),
            WidgetType::Pie | WidgetType::Doughnut => (4, 4),
            WidgetType::Kpi => (3, 2),
            WidgetType::Table => (12, 5),
        }
    }

    pub fn default_title(&self) -> String {
        self.as_str().to_title_case()
    }
}

/// Grid geometry in columns and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridLayout {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// An aggregated value plotted or shown by a widget.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub field: FieldRef,
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl MeasureSpec {
    pub fn new(field: FieldRef, aggregation: Aggregation) -> Self {
        Self {
            field,
            aggregation,
            label: None,
        }
    }

    pub fn column(&self) -> ColumnSpec {
        ColumnSpec {
            field: self.field.clone(),
            aggregation: self.aggregation,
            label: self.label.clone(),
        }
    }

    pub fn header(&self) -> String {
        self.column().header()
    }
}

/// Semantic data configuration of a widget.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dimensions: Vec<FieldRef>,
    pub measures: Vec<MeasureSpec>,
}

impl DataConfig {
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty() && self.measures.is_empty()
    }

    /// Header labels in result order: dimensions, then measures.
    pub fn headers(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .map(FieldRef::qualified)
            .chain(self.measures.iter().map(MeasureSpec::header))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub title: String,
    #[serde(default)]
    pub show_legend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: WidgetId,
    pub widget_type: WidgetType,
    pub layout: GridLayout,
    #[serde(default)]
    pub data_config: DataConfig,
    pub display: DisplayOptions,
}

impl Widget {
    /// A new widget of the type's default size at `(x, y)`.
    pub fn new(widget_type: WidgetType, x: u32, y: u32) -> Self {
        let (w, h) = widget_type.default_size();
        Self {
            id: WidgetId::new(),
            widget_type,
            layout: GridLayout { x, y, w, h },
            data_config: DataConfig::default(),
            display: DisplayOptions {
                title: widget_type.default_title(),
                show_legend: widget_type.is_chart(),
            },
        }
    }

    /// Placeholder for geometry that has no semantic config.
    pub fn stub(id: WidgetId, layout: GridLayout) -> Self {
        Self {
            id,
            widget_type: WidgetType::Table,
            layout,
            data_config: DataConfig::default(),
            display: DisplayOptions {
                title: WidgetType::Table.default_title(),
                show_legend: false,
            },
        }
    }

    /// Title derived from the data config, e.g. `Amount by Region`.
    pub fn suggested_title(&self) -> String {
        let measures: Vec<String> = self
            .data_config
            .measures
            .iter()
            .map(|m| match &m.label {
                Some(label) => label.clone(),
                None => m.field.name.to_title_case(),
            })
            .collect();
        let dimensions: Vec<String> = self
            .data_config
            .dimensions
            .iter()
            .map(|d| d.name.to_title_case())
            .collect();

        match (measures.is_empty(), dimensions.is_empty()) {
            (true, true) => self.widget_type.default_title(),
            (false, true) => measures.join(", "),
            (true, false) => dimensions.join(", "),
            (false, false) => format!("{} by {}", measures.join(", "), dimensions.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub widgets: Vec<Widget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub palette: Vec<String>,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            palette: default_palette(),
        }
    }
}

/// Joins shared by every widget query of a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataContext {
    pub joins: Vec<Join>,
}

/// A whole dashboard as stored by the config store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDocument {
    pub id: String,
    pub name: String,
    pub connection_id: String,
    pub pages: Vec<Page>,
    #[serde(default)]
    pub active_page: usize,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub data_context: DataContext,
}

impl DashboardDocument {
    /// A document with one empty page.
    pub fn new(id: impl Into<String>, name: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connection_id: connection_id.into(),
            pages: vec![Page {
                id: "page-1".to_string(),
                name: "Page 1".to_string(),
                widgets: Vec::new(),
            }],
            active_page: 0,
            theme: Theme::default(),
            data_context: DataContext::default(),
        }
    }

    pub fn active_page(&self) -> Option<&Page> {
        self.pages.get(self.active_page)
    }

    pub fn active_page_mut(&mut self) -> Option<&mut Page> {
        self.pages.get_mut(self.active_page)
    }

    pub fn active_widgets(&self) -> &[Widget] {
        self.active_page().map(|p| p.widgets.as_slice()).unwrap_or_default()
    }
}
