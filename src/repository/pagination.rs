//! Page windows for operator listings.

use serde::Serialize;

/// Splits a listing into 1-based pages.
///
/// A trailing page holding `orphans` items or fewer is folded into the page
/// before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub per_page: u64,
    pub orphans: u64,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

/// Offset/limit of a resolved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub offset: u64,
    pub limit: u64,
}

impl Paginator {
    pub const fn new(per_page: u64, orphans: u64) -> Self {
        Self { per_page, orphans }
    }

    pub fn num_pages(&self, total: u64) -> u64 {
        let per_page = self.per_page.max(1);
        let hits = total.saturating_sub(self.orphans).max(1);
        hits.div_ceil(per_page)
    }

    /// Resolve a requested page; out-of-range requests get the nearest page.
    pub fn window(&self, total: u64, requested: u64) -> PageWindow {
        let per_page = self.per_page.max(1);
        let num_pages = self.num_pages(total);
        let number = requested.clamp(1, num_pages);
        let offset = (number - 1) * per_page;
        let limit = if number == num_pages {
            total.saturating_sub(offset)
        } else {
            per_page
        };

        PageWindow {
            number,
            num_pages,
            offset,
            limit,
        }
    }

    pub fn page<T>(&self, window: PageWindow, total: u64, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total,
        }
    }
}
