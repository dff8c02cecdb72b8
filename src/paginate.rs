// src/paginate.rs
use serde::Serialize;

/// Applied when the caller asks for a page size of zero or less.
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Slice `items` into the 1-indexed `page`. `page < 1` reads as 1; a page past
/// the end is empty rather than an error.
pub fn paginate<T>(items: Vec<T>, page: i64, page_size: i64) -> Page<T> {
    let page = usize::try_from(page.max(1)).unwrap_or(1);
    let page_size = match usize::try_from(page_size) {
        Ok(n) if n > 0 => n,
        _ => DEFAULT_PAGE_SIZE,
    };

    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);

    let items = items.into_iter().skip(start).take(page_size).collect();
    Page {
        items,
        page,
        page_size,
        total_items,
        total_pages,
    }
}
