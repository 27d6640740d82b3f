//! Mine Repository
//!
//! CRUD operations for mines.
//! Uses runtime SQL queries (unchecked) to avoid requiring DATABASE_URL at compile time.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use bauxite_models::{
    AuditFields, CountryCount, DeleteMode, EntityStatistics, ListOptions, Mine, MineFilter,
    NewMine, NewProduct, Page, Product, MINE_SORT_FIELDS,
};
use bauxite_utils::BauxiteResult;

use super::product::insert_product;
use super::query::{
    missing, push_page, push_search, push_visibility, statistics_sql, AuditColumns,
    StatisticsRow, AUDIT_COLUMNS,
};
use super::MineRepository;

const MINE_COLUMNS: &str = "id, name, code, country, port_location, port_latitude, port_longitude, port_berths, shiploaders";

pub struct PgMineRepository {
    pool: PgPool,
}

impl PgMineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &MineFilter, options: &ListOptions) {
        push_visibility(builder, options);
        if let Some(name) = &filter.name {
            builder.push(" AND name = ").push_bind(name.clone());
        }
        if let Some(code) = &filter.code {
            builder.push(" AND code = ").push_bind(code.clone());
        }
        if let Some(country) = &filter.country {
            builder.push(" AND country = ").push_bind(country.clone());
        }
        if let Some(q) = &filter.q {
            push_search(builder, q, &["name", "country", "code"]);
        }
    }
}

pub(crate) async fn insert_mine<'c, E>(executor: E, new: &NewMine, actor: Option<&str>) -> BauxiteResult<Mine>
where
    E: sqlx::PgExecutor<'c>,
{
    let sql = format!(
        r#"
        INSERT INTO mines
            (name, code, country, port_location, port_latitude, port_longitude,
             port_berths, shiploaders, created_by, updated_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        RETURNING {}, {}
        "#,
        MINE_COLUMNS, AUDIT_COLUMNS
    );
    let row: MineRow = sqlx::query_as(&sql)
        .bind(&new.name)
        .bind(&new.code)
        .bind(&new.country)
        .bind(&new.port_location)
        .bind(new.port_latitude)
        .bind(new.port_longitude)
        .bind(new.port_berths)
        .bind(new.shiploaders)
        .bind(actor)
        .fetch_one(executor)
        .await?;

    Ok(row.into())
}

#[async_trait]
impl MineRepository for PgMineRepository {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Mine>> {
        let sql = format!(
            "SELECT {}, {} FROM mines WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
            MINE_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<MineRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Mine>> {
        let sql = format!(
            "SELECT {}, {} FROM mines WHERE id = ANY($1) AND ($2 OR deleted_at IS NULL) ORDER BY id",
            MINE_COLUMNS, AUDIT_COLUMNS
        );
        let rows: Vec<MineRow> = sqlx::query_as(&sql)
            .bind(ids)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(&self, filter: &MineFilter, options: &ListOptions) -> BauxiteResult<Page<Mine>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mines WHERE 1=1");
        Self::push_filters(&mut count, filter, options);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {} FROM mines WHERE 1=1",
            MINE_COLUMNS, AUDIT_COLUMNS
        ));
        Self::push_filters(&mut select, filter, options);
        push_page(&mut select, options, MINE_SORT_FIELDS)?;
        let rows: Vec<MineRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page::new(rows.into_iter().map(Into::into).collect(), options, total))
    }

    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM mines
                WHERE name = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM mines
                WHERE code = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(code)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn create(&self, new: NewMine, actor: Option<&str>) -> BauxiteResult<Mine> {
        insert_mine(&self.pool, &new, actor).await
    }

    async fn create_with_products(
        &self,
        new: NewMine,
        products: Vec<NewProduct>,
        actor: Option<&str>,
    ) -> BauxiteResult<(Mine, Vec<Product>)> {
        let mut tx = self.pool.begin().await?;

        let mine = insert_mine(&mut *tx, &new, actor).await?;
        let mut created = Vec::with_capacity(products.len());
        for product in products {
            let product = NewProduct {
                mine_id: mine.id,
                ..product
            };
            created.push(insert_product(&mut *tx, &product, actor).await?);
        }

        tx.commit().await?;
        Ok((mine, created))
    }

    async fn update(&self, mine: Mine, actor: Option<&str>) -> BauxiteResult<Mine> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM mines WHERE id = $1 FOR UPDATE")
            .bind(mine.id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(missing("Mine", mine.id));
        }

        let sql = format!(
            r#"
            UPDATE mines SET
                name = $2,
                code = $3,
                country = $4,
                port_location = $5,
                port_latitude = $6,
                port_longitude = $7,
                port_berths = $8,
                shiploaders = $9,
                updated_at = NOW(),
                updated_by = COALESCE($10, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            MINE_COLUMNS, AUDIT_COLUMNS
        );
        let row: MineRow = sqlx::query_as(&sql)
            .bind(mine.id)
            .bind(&mine.name)
            .bind(&mine.code)
            .bind(&mine.country)
            .bind(&mine.port_location)
            .bind(mine.port_latitude)
            .bind(mine.port_longitude)
            .bind(mine.port_berths)
            .bind(mine.shiploaders)
            .bind(actor)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()> {
        let result = match mode {
            DeleteMode::Soft => {
                sqlx::query(
                    r#"
                    UPDATE mines SET deleted_at = NOW(), deleted_by = $2, updated_at = NOW()
                    WHERE id = $1 AND deleted_at IS NULL
                    "#,
                )
                .bind(id)
                .bind(actor)
                .execute(&self.pool)
                .await?
            }
            DeleteMode::Hard => {
                sqlx::query("DELETE FROM mines WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(missing("Mine", id));
        }
        Ok(())
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Mine> {
        let sql = format!(
            r#"
            UPDATE mines SET
                deleted_at = NULL,
                deleted_by = NULL,
                updated_at = NOW(),
                updated_by = COALESCE($2, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            MINE_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<MineRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(actor)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Into::into).ok_or_else(|| missing("Mine", id))
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let row: StatisticsRow = sqlx::query_as(&statistics_sql("mines"))
            .fetch_one(&self.pool)
            .await?;
        Ok(EntityStatistics::from_counts(row.total, row.deleted))
    }

    async fn count_by_country(&self) -> BauxiteResult<Vec<CountryCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT country, COUNT(*) FROM mines
            WHERE deleted_at IS NULL
            GROUP BY country
            ORDER BY COUNT(*) DESC, country ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(country, count)| CountryCount { country, count })
            .collect())
    }
}

/// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct MineRow {
    id: i64,
    name: String,
    code: Option<String>,
    country: String,
    port_location: String,
    port_latitude: f64,
    port_longitude: f64,
    port_berths: i32,
    shiploaders: i32,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl From<MineRow> for Mine {
    fn from(row: MineRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            code: row.code,
            country: row.country,
            port_location: row.port_location,
            port_latitude: row.port_latitude,
            port_longitude: row.port_longitude,
            port_berths: row.port_berths,
            shiploaders: row.shiploaders,
            audit: AuditFields::from(row.audit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postgres::create_postgres_pool;
    use std::time::Duration;

    async fn repository() -> PgMineRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = create_postgres_pool(&url, 2, Duration::from_secs(5)).await.unwrap();
        crate::migrations::run_postgres_migrations(&pool).await.unwrap();
        PgMineRepository::new(pool)
    }

    fn new_mine(name: &str) -> NewMine {
        NewMine {
            name: name.to_string(),
            code: None,
            country: "Guinea".to_string(),
            port_location: "Kamsar".to_string(),
            port_latitude: 10.65,
            port_longitude: -14.61,
            port_berths: 1,
            shiploaders: 1,
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_soft_delete_and_restore() {
        let repo = repository().await;
        let name = format!("Mine {}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let mine = repo.create(new_mine(&name), Some("tester")).await.unwrap();

        repo.delete(mine.id, DeleteMode::Soft, Some("tester")).await.unwrap();
        assert!(repo.get(mine.id, false).await.unwrap().is_none());
        assert!(repo.get(mine.id, true).await.unwrap().is_some());

        let restored = repo.restore(mine.id, Some("tester")).await.unwrap();
        assert!(!restored.audit.is_deleted());

        repo.delete(mine.id, DeleteMode::Hard, None).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_duplicate_name_names_constraint() {
        let repo = repository().await;
        let name = format!("Dup {}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let mine = repo.create(new_mine(&name), None).await.unwrap();

        let error = repo.create(new_mine(&name), None).await.unwrap_err();
        assert_eq!(error.error_code(), "DUPLICATE_ERROR");

        repo.delete(mine.id, DeleteMode::Hard, None).await.unwrap();
    }
}
