//! Offset pagination for list endpoints.
//!
//! Configuration only: a page-size policy per entity type plus the standard
//! `{count, next, previous, results}` envelope. `next`/`previous` are page
//! numbers, `None` at either edge.

use serde::{Deserialize, Serialize};

/// Page-size policy for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct PagePolicy {
    pub default_size: usize,
    pub max_size: usize,
}

pub const COURSE_PAGES: PagePolicy = PagePolicy {
    default_size: 10,
    max_size: 50,
};

pub const LESSON_PAGES: PagePolicy = PagePolicy {
    default_size: 5,
    max_size: 20,
};

/// Client-supplied paging params (`?page=&page_size=`).
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<usize>,
    pub previous: Option<usize>,
    pub results: Vec<T>,
}

/// Slice one page out of the full (already permission-filtered) result set.
/// Pages are 1-based; out-of-range pages yield empty results rather than an
/// error.
pub fn paginate<T>(items: Vec<T>, params: &PageParams, policy: PagePolicy) -> Page<T> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(policy.default_size)
        .clamp(1, policy.max_size);

    let count = items.len();
    let start = (page - 1).saturating_mul(page_size);
    let results: Vec<T> = items
        .into_iter()
        .skip(start)
        .take(page_size)
        .collect();

    let next = if start + results.len() < count {
        Some(page + 1)
    } else {
        None
    };
    let previous = if page > 1 { Some(page - 1) } else { None };

    Page {
        count,
        next,
        previous,
        results,
    }
}
