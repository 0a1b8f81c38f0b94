//! Page-by-page access to the raw visit log
//!
//! Out-of-range input is clamped rather than rejected: a page below 1 reads
//! page 1, and the page size is held within `[1, max_page_size]`.

use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::models::VisitRecord;
use crate::storage::{Storage, StorageError};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("failed to load visit page: {0}")]
    Storage(#[from] StorageError),
}

/// Raw page parameters as received; anything unparseable reads as absent
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub page: Option<i64>,
    #[serde(default, alias = "pageSize", deserialize_with = "lenient_i64")]
    pub page_size: Option<i64>,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(n)) => Some(n),
        Some(Raw::Float(f)) if f.is_finite() => Some(f.trunc() as i64),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// One page of the visit log
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult {
    pub records: Vec<VisitRecord>,
    pub total_count: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub page_size: i64,
}

pub struct Paginator {
    storage: Arc<dyn Storage>,
    default_page_size: i64,
    max_page_size: i64,
}

impl Paginator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_limits(storage, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    pub fn with_limits(storage: Arc<dyn Storage>, default_page_size: i64, max_page_size: i64) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            storage,
            default_page_size: default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    /// Resolve the effective `(page, page_size)` for a request
    pub fn normalize(&self, request: PageRequest) -> (i64, i64) {
        let page = request.page.unwrap_or(1).max(1);
        let page_size = request
            .page_size
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);
        (page, page_size)
    }

    pub async fn get_page(&self, request: PageRequest) -> Result<PagedResult, PaginationError> {
        let (page, page_size) = self.normalize(request);
        let offset = (page - 1).saturating_mul(page_size);

        let (events, total_count) = self.storage.query_page(offset, page_size).await?;
        debug!(
            page,
            page_size,
            returned = events.len(),
            total_count,
            "served visit page"
        );

        Ok(PagedResult {
            records: events.into_iter().map(VisitRecord::from).collect(),
            total_count,
            total_pages: total_pages(total_count, page_size),
            current_page: page,
            page_size,
        })
    }
}

/// `ceil(total / page_size)`, zero for an empty log
pub fn total_pages(total_count: i64, page_size: i64) -> i64 {
    if total_count <= 0 || page_size <= 0 {
        return 0;
    }
    (total_count + page_size - 1) / page_size
}
