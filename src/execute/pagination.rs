//! Elided pagination links.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "page", rename_all = "snake_case")]
pub enum PageLink {
    Page(u32),
    Ellipsis,
}

/// Links for a pager: the first page, the last page and `window` pages on
/// each side of the current one. Each gap collapses to one ellipsis.
///
/// With 20 pages, current page 10 and a window of 2 this yields
/// `1 … 8 9 10 11 12 … 20`.
pub fn page_links(current: u32, total: u32, window: u32) -> Vec<PageLink> {
    if total == 0 {
        return Vec::new();
    }
    let current = current.clamp(1, total);
    let lo = current.saturating_sub(window).max(1);
    let hi = current.saturating_add(window).min(total);

    let mut pages = vec![1];
    pages.extend(lo..=hi);
    pages.push(total);
    pages.sort_unstable();
    pages.dedup();

    let mut links = Vec::with_capacity(pages.len() + 2);
    let mut previous = None;
    for page in pages {
        if let Some(prev) = previous {
            if page > prev + 1 {
                links.push(PageLink::Ellipsis);
            }
        }
        links.push(PageLink::Page(page));
        previous = Some(page);
    }
    links
}
