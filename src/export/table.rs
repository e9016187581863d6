//! Widget data as CSV.

use serde_json::Value;

use super::{file_stem, ExportError, ExportResult, ExportedFile};
use crate::dashboard::{Widget, WidgetData, WidgetDataSource};
use crate::query::{plain, Join};

/// Write headers and rows as delimited text.
pub fn write_csv(headers: &[String], rows: &[Vec<Value>], delimiter: u8) -> ExportResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.iter().map(plain))?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.to_string()))
}

/// Re-fetch a widget's data without any cross-widget filters and write it
/// as CSV.
pub async fn export_widget_csv(
    source: &dyn WidgetDataSource,
    connection_id: &str,
    widget: &Widget,
    joins: &[Join],
    delimiter: u8,
) -> ExportResult<ExportedFile> {
    if widget.data_config.is_empty() {
        return Err(ExportError::UnconfiguredWidget);
    }

    let WidgetData { headers, rows } = source
        .fetch(connection_id, widget, &[], joins)
        .await
        .map_err(|e| ExportError::Fetch(e.to_string()))?;

    tracing::debug!(widget = %widget.id, rows = rows.len(), "exporting widget data");
    let bytes = write_csv(&headers, &rows, delimiter)?;

    Ok(ExportedFile {
        file_name: format!("{}.csv", file_stem(&widget.display.title, "widget")),
        content_type: "text/csv",
        bytes,
    })
}
