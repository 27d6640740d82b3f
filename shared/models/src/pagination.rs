//! Listing options and paged results.

use bauxite_utils::{BauxiteError, BauxiteResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::audit::AuditFields;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Raw listing parameters as they arrive in a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<SortDirection>,
    pub include_deleted: Option<bool>,
    pub only_deleted: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub updated_from: Option<DateTime<Utc>>,
    pub updated_to: Option<DateTime<Utc>>,
}

/// Normalized paging, sorting and soft-delete visibility for a list query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    pub page: u32,
    pub per_page: u32,
    pub sort_by: Option<String>,
    pub sort_direction: SortDirection,
    pub include_deleted: bool,
    pub only_deleted: bool,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub updated_from: Option<DateTime<Utc>>,
    pub updated_to: Option<DateTime<Utc>>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort_by: None,
            sort_direction: SortDirection::Asc,
            include_deleted: false,
            only_deleted: false,
            created_from: None,
            created_to: None,
            updated_from: None,
            updated_to: None,
        }
    }
}

impl From<ListParams> for ListOptions {
    fn from(params: ListParams) -> Self {
        Self {
            page: params.page.unwrap_or(1).max(1),
            per_page: params
                .per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
            sort_by: params.sort_by.filter(|field| !field.trim().is_empty()),
            sort_direction: params.sort_direction.unwrap_or_default(),
            include_deleted: params.include_deleted.unwrap_or(false),
            only_deleted: params.only_deleted.unwrap_or(false),
            created_from: params.created_from,
            created_to: params.created_to,
            updated_from: params.updated_from,
            updated_to: params.updated_to,
        }
    }
}

impl ListOptions {
    pub fn page(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
            ..Self::default()
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    /// Resolves `sort_by` against a whitelist; unset means `id`.
    pub fn sort_field(&self, allowed: &[&'static str]) -> BauxiteResult<&'static str> {
        match self.sort_by.as_deref() {
            None => Ok("id"),
            Some(requested) => allowed
                .iter()
                .copied()
                .find(|field| *field == requested)
                .ok_or_else(|| {
                    BauxiteError::validation(format!(
                        "Invalid sort field '{}'. Allowed: {}",
                        requested,
                        allowed.join(", ")
                    ))
                }),
        }
    }

    /// Soft-delete visibility and audit date windows, applied in memory.
    pub fn admits(&self, audit: &AuditFields) -> bool {
        if self.only_deleted {
            if !audit.is_deleted() {
                return false;
            }
        } else if !self.include_deleted && audit.is_deleted() {
            return false;
        }

        let within = |value: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>| {
            from.map_or(true, |from| value >= from) && to.map_or(true, |to| value <= to)
        };

        within(audit.created_at, self.created_from, self.created_to)
            && within(audit.updated_at, self.updated_from, self.updated_to)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, options: &ListOptions, total: i64) -> Self {
        Self {
            items,
            page: options.page,
            per_page: options.per_page,
            total,
            pages: page_count(total, options.per_page),
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            pages: self.pages,
        }
    }

    /// Same paging figures over replacement items, e.g. enriched views.
    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            items,
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            pages: self.pages,
        }
    }

    pub fn metadata(&self) -> Value {
        json!({
            "page": self.page,
            "per_page": self.per_page,
            "total": self.total,
            "pages": self.pages,
        })
    }
}

/// Number of pages for `total` rows, never less than one.
pub fn page_count(total: i64, per_page: u32) -> u32 {
    if total <= 0 || per_page == 0 {
        return 1;
    }
    let per_page = i64::from(per_page);
    let pages = (total + per_page - 1) / per_page;
    u32::try_from(pages).unwrap_or(u32::MAX).max(1)
}
