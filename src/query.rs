//! Paged, optionally filtered views over a stored client list.

use serde::{Deserialize, Serialize};

use crate::{
    error::{IncomeError, IncomeResult},
    store::ClientRecord,
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientQuery {
    page: usize,
    page_size: usize,
    search: Option<String>,
}

impl ClientQuery {
    /// Validates a request. Page sizes above [`MAX_PAGE_SIZE`] are capped;
    /// non-positive page sizes and pages below 1 are rejected. Blank search
    /// terms are dropped.
    pub fn new(page: i64, page_size: i64, search: Option<&str>) -> IncomeResult<Self> {
        let page_size = page_size.min(MAX_PAGE_SIZE as i64);
        if page_size <= 0 {
            return Err(IncomeError::InvalidQuery(format!(
                "page size must be positive, got {page_size}"
            )));
        }
        if page < 1 {
            return Err(IncomeError::InvalidQuery(format!(
                "page numbers start at 1, got {page}"
            )));
        }
        let search = search
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);
        Ok(Self {
            page: page as usize,
            page_size: page_size as usize,
            search,
        })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn matches(&self, record: &ClientRecord) -> bool {
        let Some(term) = self.search.as_deref() else {
            return true;
        };
        [
            Some(record.id.as_str()),
            record.city.as_deref(),
            record.gender.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(term))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPage {
    pub clients: Vec<ClientRecord>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub user_id: String,
}

impl ClientPage {
    pub fn empty(owner_id: &str, query: &ClientQuery) -> Self {
        Self {
            clients: Vec::new(),
            total: 0,
            page: query.page,
            per_page: query.page_size,
            total_pages: 0,
            user_id: owner_id.to_string(),
        }
    }
}

/// Filters in stored order, then slices `[(page-1)*size, page*size)`.
pub fn paginate(owner_id: &str, records: &[ClientRecord], query: &ClientQuery) -> ClientPage {
    let filtered = records
        .iter()
        .filter(|record| query.matches(record))
        .collect::<Vec<_>>();
    let total = filtered.len();
    let start = (query.page - 1).saturating_mul(query.page_size);
    let clients = filtered
        .into_iter()
        .skip(start)
        .take(query.page_size)
        .cloned()
        .collect();
    ClientPage {
        clients,
        total,
        page: query.page,
        per_page: query.page_size,
        total_pages: total.div_ceil(query.page_size),
        user_id: owner_id.to_string(),
    }
}
