//! SQL fragments shared by the Postgres repositories.

use bauxite_models::{AuditFields, ListOptions};
use bauxite_utils::{BauxiteError, BauxiteResult};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};

pub(crate) const AUDIT_COLUMNS: &str =
    "created_at, updated_at, created_by, updated_by, deleted_at, deleted_by";

#[derive(Debug, FromRow)]
pub(crate) struct AuditColumns {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<String>,
    updated_by: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
}

impl From<AuditColumns> for AuditFields {
    fn from(row: AuditColumns) -> Self {
        Self {
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
            deleted_at: row.deleted_at,
            deleted_by: row.deleted_by,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct StatisticsRow {
    pub total: i64,
    pub deleted: i64,
}

pub(crate) fn statistics_sql(table: &str) -> String {
    format!(
        "SELECT COUNT(*) AS total, COUNT(deleted_at) AS deleted FROM {}",
        table
    )
}

/// Soft-delete visibility and audit date windows.
pub(crate) fn push_visibility(builder: &mut QueryBuilder<'_, Postgres>, options: &ListOptions) {
    if options.only_deleted {
        builder.push(" AND deleted_at IS NOT NULL");
    } else if !options.include_deleted {
        builder.push(" AND deleted_at IS NULL");
    }
    if let Some(from) = options.created_from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = options.created_to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(from) = options.updated_from {
        builder.push(" AND updated_at >= ").push_bind(from);
    }
    if let Some(to) = options.updated_to {
        builder.push(" AND updated_at <= ").push_bind(to);
    }
}

/// ORDER BY a whitelisted column, then LIMIT/OFFSET.
pub(crate) fn push_page(
    builder: &mut QueryBuilder<'_, Postgres>,
    options: &ListOptions,
    sort_fields: &[&'static str],
) -> BauxiteResult<()> {
    let field = options.sort_field(sort_fields)?;
    builder.push(format!(
        " ORDER BY {} {}, id ASC",
        field,
        options.sort_direction.as_sql()
    ));
    builder
        .push(" LIMIT ")
        .push_bind(options.limit())
        .push(" OFFSET ")
        .push_bind(options.offset());
    Ok(())
}

/// ` AND (col ILIKE $n OR ...)` over the given columns.
pub(crate) fn push_search(builder: &mut QueryBuilder<'_, Postgres>, query: &str, columns: &[&str]) {
    let pattern = like_pattern(query);
    builder.push(" AND (");
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            builder.push(" OR ");
        }
        builder
            .push(format!("{} ILIKE ", column))
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\'");
    }
    builder.push(")");
}

pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub(crate) fn missing(resource: &str, id: i64) -> BauxiteError {
    BauxiteError::not_found(format!("{} {}", resource, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("CBG"), "%CBG%");
        assert_eq!(like_pattern("50%_x"), "%50\\%\\_x%");
    }

    #[test]
    fn test_page_rejects_unknown_sort_field() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT id FROM mines WHERE 1=1");
        let options = ListOptions {
            sort_by: Some("password".to_string()),
            ..ListOptions::default()
        };
        assert!(push_page(&mut builder, &options, &["id", "name"]).is_err());
    }

    #[test]
    fn test_visibility_sql() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT id FROM mines WHERE 1=1");
        push_visibility(&mut builder, &ListOptions::default());
        assert!(builder.sql().ends_with("AND deleted_at IS NULL"));

        let mut builder = QueryBuilder::<Postgres>::new("SELECT id FROM mines WHERE 1=1");
        let options = ListOptions {
            only_deleted: true,
            ..ListOptions::default()
        };
        push_visibility(&mut builder, &options);
        assert!(builder.sql().ends_with("AND deleted_at IS NOT NULL"));
    }
}
