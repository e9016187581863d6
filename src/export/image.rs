//! SVG snapshot of a dashboard page.

use std::fmt::Write as _;

use super::{file_stem, ExportError, ExportResult, ExportedFile};
use crate::dashboard::{DashboardDocument, RenderOutput, Widget, WidgetId};

/// Pixel geometry of the exported grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvgOptions {
    pub columns: u32,
    pub cell_width: u32,
    pub row_height: u32,
    pub gap: u32,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            columns: 12,
            cell_width: 80,
            row_height: 60,
            gap: 8,
        }
    }
}

/// Rasterize the active page's grid to an SVG file.
///
/// `output` supplies each widget's current render, shown as a caption under
/// its title. No data is fetched.
pub fn export_image<'a, F>(
    document: &DashboardDocument,
    options: SvgOptions,
    output: F,
) -> ExportResult<ExportedFile>
where
    F: Fn(WidgetId) -> Option<&'a RenderOutput>,
{
    let widgets = document.active_widgets();
    if widgets.is_empty() {
        return Err(ExportError::EmptyDashboard);
    }

    let boxes = widgets
        .iter()
        .map(|w| Cell::of(w, options).ok_or(ExportError::LayoutTooLarge))
        .collect::<ExportResult<Vec<_>>>()?;
    let width = boxes
        .iter()
        .map(|c| c.right)
        .max()
        .unwrap_or(0)
        .max(options.columns.checked_mul(options.cell_width).ok_or(ExportError::LayoutTooLarge)?);
    let height = boxes.iter().map(|c| c.bottom).max().unwrap_or(0);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    );
    let _ = writeln!(
        svg,
        r##"<rect width="{}" height="{}" fill="#ffffff"/>"##,
        width, height
    );
    for (i, (widget, cell)) in widgets.iter().zip(&boxes).enumerate() {
        let color = document
            .theme
            .palette
            .get(i % document.theme.palette.len().max(1))
            .map(String::as_str)
            .unwrap_or("#4e79a7");
        write_widget(&mut svg, widget, cell, color, output(widget.id));
    }
    svg.push_str("</svg>\n");

    Ok(ExportedFile {
        file_name: format!("{}.svg", file_stem(&document.name, "dashboard")),
        content_type: "image/svg+xml",
        bytes: svg.into_bytes(),
    })
}

/// Pixel box of one widget. `right` and `bottom` are the grid edges it
/// occupies; `x`, `y`, `w` and `h` are the drawn rectangle inside the gap.
#[derive(Debug, Clone, Copy)]
struct Cell {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    right: u32,
    bottom: u32,
}

impl Cell {
    /// None when a coordinate does not fit in `u32`.
    fn of(widget: &Widget, options: SvgOptions) -> Option<Self> {
        let layout = &widget.layout;
        let half_gap = options.gap / 2;
        let left = layout.x.checked_mul(options.cell_width)?;
        let top = layout.y.checked_mul(options.row_height)?;
        let width = layout.w.checked_mul(options.cell_width)?;
        let height = layout.h.checked_mul(options.row_height)?;
        let x = left.checked_add(half_gap)?;
        let y = top.checked_add(half_gap)?;
        // Title and caption are offset from the rectangle's corner.
        x.checked_add(8)?;
        y.checked_add(40)?;
        Some(Self {
            x,
            y,
            w: width.saturating_sub(options.gap),
            h: height.saturating_sub(options.gap),
            right: left.checked_add(width)?,
            bottom: top.checked_add(height)?,
        })
    }
}

fn write_widget(
    svg: &mut String,
    widget: &Widget,
    cell: &Cell,
    color: &str,
    output: Option<&RenderOutput>,
) {
    let Cell { x, y, w, h, .. } = *cell;

    let _ = writeln!(
        svg,
        r##"<g data-widget="{}"><rect x="{}" y="{}" width="{}" height="{}" rx="4" fill="#f7f7f9" stroke="{}"/>"##,
        widget.id,
        x,
        y,
        w,
        h,
        escape(color)
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="14" font-weight="bold">{}</text>"#,
        x + 8,
        y + 20,
        escape(&widget.display.title)
    );
    if let Some(caption) = output.map(caption) {
        let _ = writeln!(
            svg,
            r##"<text x="{}" y="{}" font-size="12" fill="#555555">{}</text>"##,
            x + 8,
            y + 40,
            escape(&caption)
        );
    }
    svg.push_str("</g>\n");
}

fn caption(output: &RenderOutput) -> String {
    match output {
        RenderOutput::Chart(chart) => format!("{} ({} points)", chart.widget_type.as_str(), chart.labels.len()),
        RenderOutput::Kpi(kpi) => kpi.text.clone(),
        RenderOutput::Table(table) => format!("{} rows", table.rows.len()),
        RenderOutput::Empty { message } | RenderOutput::Error { message } => message.clone(),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
