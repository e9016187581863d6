//! Grid geometry and its merge with widget configs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dashboard::{GridLayout, Widget, WidgetId};

/// Geometry of one grid cell, as reported by the layout surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridItem {
    pub id: WidgetId,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl GridItem {
    pub fn of(widget: &Widget) -> Self {
        let GridLayout { x, y, w, h } = widget.layout;
        Self {
            id: widget.id,
            x,
            y,
            w,
            h,
        }
    }

    pub fn layout(&self) -> GridLayout {
        GridLayout {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
        }
    }
}

/// Overlay the latest geometry on the latest configs, in grid order.
///
/// A grid item without a config becomes a stub table widget. Configs with
/// no grid item are dropped.
pub fn merge_layout(grid: &[GridItem], configs: &HashMap<WidgetId, Widget>) -> Vec<Widget> {
    grid.iter()
        .map(|item| match configs.get(&item.id) {
            Some(config) => {
                let mut widget = config.clone();
                widget.layout = item.layout();
                widget
            }
            None => {
                tracing::debug!(widget = %item.id, "grid item without config, saving stub");
                Widget::stub(item.id, item.layout())
            }
        })
        .collect()
}
