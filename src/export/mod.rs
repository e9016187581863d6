//! Dashboard export.
//!
//! Two exports are offered: an SVG image of the active page's grid, and a
//! CSV of one widget's data. The CSV re-fetches without cross-widget
//! filters so the file holds the widget's full data.

mod image;
mod table;

pub use image::{export_image, SvgOptions};
pub use table::{export_widget_csv, write_csv};

use serde::Serialize;

use crate::dashboard::WidgetId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExportError {
    #[error("The dashboard has no widgets to export")]
    EmptyDashboard,

    #[error("Unknown widget: {0}")]
    UnknownWidget(WidgetId),

    #[error("Widget has no data configured")]
    UnconfiguredWidget,

    #[error("Could not fetch widget data: {0}")]
    Fetch(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("The dashboard layout is too large to export")]
    LayoutTooLarge,
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::Csv(e.to_string())
    }
}

pub type ExportResult<T> = Result<T, ExportError>;

/// A generated file, ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportedFile {
    /// File contents as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// File stem from a title, falling back to `fallback` when nothing usable is left.
pub(crate) fn file_stem(title: &str, fallback: &str) -> String {
    use inflector::Inflector;

    let stem = title.to_kebab_case();
    if stem.is_empty() {
        fallback.to_string()
    } else {
        stem
    }
}
