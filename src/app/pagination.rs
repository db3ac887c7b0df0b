use crate::utils::error::{ChamaError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

fn link(path: &str, page: usize, page_size: usize) -> String {
    format!("{}?page={}&page_size={}", path, page, page_size)
}

/// 切出指定頁；超出最後一頁回傳 404
pub fn paginate<T>(items: Vec<T>, params: &PageParams, path: &str) -> Result<Page<T>> {
    let page = params.page.unwrap_or(1);
    if page == 0 {
        return Err(ChamaError::validation("page", "Pages start at 1"));
    }
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let count = items.len();
    let last_page = count.div_ceil(page_size).max(1);
    if page > last_page {
        return Err(ChamaError::NotFound {
            entity: "Page",
            id: page.to_string(),
        });
    }

    let results: Vec<T> = items
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();
    Ok(Page {
        count,
        page,
        page_size,
        next: (page < last_page).then(|| link(path, page + 1, page_size)),
        previous: (page > 1).then(|| link(path, page - 1, page_size)),
        results,
    })
}
