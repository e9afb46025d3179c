//! Bounded, ordered pages of posts.
//!
//! Both the dashboard and the JSON API list posts newest first. The
//! dashboard numbers pages from 1 and falls back to the nearest valid page;
//! the API numbers pages from 0 and clamps its page size.

use std::collections::HashMap;

use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::db::Db;
use crate::core::query_params::get_int;
use crate::models::models::Post;
use crate::posts::all_posts;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    /// 0-based index of this page
    pub number: usize,
    pub page_size: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn num_pages(&self) -> usize {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(self.page_size)
        }
    }

    /// Converts every item, keeping the paging metadata.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<U>, E>>()?;
        Ok(Page {
            items,
            total: self.total,
            number: self.number,
            page_size: self.page_size,
            has_next: self.has_next,
            has_prev: self.has_prev,
        })
    }
}

/// Slices page `page_number` (0-based) of `page_size` items out of
/// `items`. A page past the end is empty.
pub fn page<T>(items: Vec<T>, page_number: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total = items.len();
    let start = page_number.saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);

    let items: Vec<T> = items.into_iter().skip(start).take(end - start).collect();

    Page {
        items,
        total,
        number: page_number,
        page_size,
        has_next: end < total,
        has_prev: page_number > 0,
    }
}

/// All posts, newest first.
pub fn ordered_posts(db: &Db) -> Result<Vec<Post>, ApiError> {
    let mut posts = all_posts(db)?;
    posts.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(posts)
}

/// Dashboard page number: 1-based `page` param. Anything unparsable is
/// page 1; numbers past the end land on the last page.
pub fn interactive_page_index(params: &HashMap<String, String>, total: usize) -> usize {
    let last = if total == 0 {
        0
    } else {
        (total - 1) / POSTS_PER_PAGE
    };
    match get_int(params, "page") {
        Some(n) if n >= 1 => ((n - 1) as usize).min(last),
        _ => 0,
    }
}

/// API page size: `max_post` param, clamped to the ceiling. Missing,
/// unparsable or non-positive values get the default.
pub fn api_page_size(params: &HashMap<String, String>) -> usize {
    match get_int(params, "max_post") {
        Some(n) if n >= 1 => (n as usize).min(API_MAX_POST_CEILING),
        _ => API_DEFAULT_MAX_POST,
    }
}

/// API page number: 0-based `page` param; negative or unparsable is 0.
pub fn api_page_index(params: &HashMap<String, String>) -> usize {
    match get_int(params, "page") {
        Some(n) if n > 0 => n as usize,
        _ => 0,
    }
}

pub fn dashboard_page(db: &Db, params: &HashMap<String, String>) -> Result<Page<Post>, ApiError> {
    let posts = ordered_posts(db)?;
    let index = interactive_page_index(params, posts.len());
    let result = page(posts, index, POSTS_PER_PAGE);
    tracing::debug!(page = index + 1, total = result.total, "Dashboard page");
    Ok(result)
}

pub fn api_page(db: &Db, params: &HashMap<String, String>) -> Result<Page<Post>, ApiError> {
    let posts = ordered_posts(db)?;
    let size = api_page_size(params);
    let index = api_page_index(params);
    let result = page(posts, index, size);
    tracing::debug!(page = index, size, total = result.total, "API page");
    Ok(result)
}
