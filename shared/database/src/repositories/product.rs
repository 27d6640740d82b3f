//! Product Repository
//!
//! CRUD and batch operations for products.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use bauxite_models::{
    AuditFields, DeleteMode, EntityStatistics, ListOptions, NewProduct, Page, Product,
    ProductFilter, PRODUCT_SORT_FIELDS,
};
use bauxite_utils::BauxiteResult;

use super::query::{
    missing, push_page, push_search, push_visibility, statistics_sql, AuditColumns,
    StatisticsRow, AUDIT_COLUMNS,
};
use super::ProductRepository;

const PRODUCT_COLUMNS: &str = "id, mine_id, name, code, description";

pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter, options: &ListOptions) {
        push_visibility(builder, options);
        if let Some(name) = &filter.name {
            builder.push(" AND name = ").push_bind(name.clone());
        }
        if let Some(code) = &filter.code {
            builder.push(" AND code = ").push_bind(code.clone());
        }
        if let Some(mine_id) = filter.mine_id {
            builder.push(" AND mine_id = ").push_bind(mine_id);
        }
        if let Some(q) = &filter.q {
            push_search(builder, q, &["name", "code", "description"]);
        }
    }
}

pub(crate) async fn insert_product<'c, E>(
    executor: E,
    new: &NewProduct,
    actor: Option<&str>,
) -> BauxiteResult<Product>
where
    E: sqlx::PgExecutor<'c>,
{
    let sql = format!(
        r#"
        INSERT INTO products (mine_id, name, code, description, created_by, updated_by)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING {}, {}
        "#,
        PRODUCT_COLUMNS, AUDIT_COLUMNS
    );
    let row: ProductRow = sqlx::query_as(&sql)
        .bind(new.mine_id)
        .bind(&new.name)
        .bind(&new.code)
        .bind(&new.description)
        .bind(actor)
        .fetch_one(executor)
        .await?;

    Ok(row.into())
}

async fn update_product<'c, E>(executor: E, product: &Product, actor: Option<&str>) -> BauxiteResult<Option<Product>>
where
    E: sqlx::PgExecutor<'c>,
{
    let sql = format!(
        r#"
        UPDATE products SET
            mine_id = $2,
            name = $3,
            code = $4,
            description = $5,
            updated_at = NOW(),
            updated_by = COALESCE($6, updated_by)
        WHERE id = $1
        RETURNING {}, {}
        "#,
        PRODUCT_COLUMNS, AUDIT_COLUMNS
    );
    let row: Option<ProductRow> = sqlx::query_as(&sql)
        .bind(product.id)
        .bind(product.mine_id)
        .bind(&product.name)
        .bind(&product.code)
        .bind(&product.description)
        .bind(actor)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(Into::into))
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Product>> {
        let sql = format!(
            "SELECT {}, {} FROM products WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
            PRODUCT_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Product>> {
        let sql = format!(
            "SELECT {}, {} FROM products WHERE id = ANY($1) AND ($2 OR deleted_at IS NULL) ORDER BY id",
            PRODUCT_COLUMNS, AUDIT_COLUMNS
        );
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(ids)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(&self, filter: &ProductFilter, options: &ListOptions) -> BauxiteResult<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products WHERE 1=1");
        Self::push_filters(&mut count, filter, options);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {} FROM products WHERE 1=1",
            PRODUCT_COLUMNS, AUDIT_COLUMNS
        ));
        Self::push_filters(&mut select, filter, options);
        push_page(&mut select, options, PRODUCT_SORT_FIELDS)?;
        let rows: Vec<ProductRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page::new(rows.into_iter().map(Into::into).collect(), options, total))
    }

    async fn list_for_mine(&self, mine_id: i64) -> BauxiteResult<Vec<Product>> {
        let sql = format!(
            "SELECT {}, {} FROM products WHERE mine_id = $1 AND deleted_at IS NULL ORDER BY name",
            PRODUCT_COLUMNS, AUDIT_COLUMNS
        );
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(mine_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn exists_by_name(&self, mine_id: i64, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM products
                WHERE mine_id = $1 AND name = $2
                  AND ($3::BIGINT IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(mine_id)
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
                SELECT 1 FROM products
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

    async fn create(&self, new: NewProduct, actor: Option<&str>) -> BauxiteResult<Product> {
        insert_product(&self.pool, &new, actor).await
    }

    async fn create_batch(&self, products: Vec<NewProduct>, actor: Option<&str>) -> BauxiteResult<Vec<Product>> {
        let mut tx = self.pool.begin().await?;

        let mut created = Vec::with_capacity(products.len());
        for product in &products {
            created.push(insert_product(&mut *tx, product, actor).await?);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update(&self, product: Product, actor: Option<&str>) -> BauxiteResult<Product> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product.id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(missing("Product", product.id));
        }

        let updated = update_product(&mut *tx, &product, actor)
            .await?
            .ok_or_else(|| missing("Product", product.id))?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn update_batch(&self, products: Vec<Product>, actor: Option<&str>) -> BauxiteResult<Vec<Product>> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<i64> = products.iter().map(|product| product.id).collect();
        let locked: Vec<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = ANY($1) FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;
        if let Some(absent) = ids.iter().find(|id| !locked.contains(id)) {
            return Err(missing("Product", *absent));
        }

        let mut updated = Vec::with_capacity(products.len());
        for product in &products {
            let row = update_product(&mut *tx, product, actor)
                .await?
                .ok_or_else(|| missing("Product", product.id))?;
            updated.push(row);
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()> {
        let result = match mode {
            DeleteMode::Soft => {
                sqlx::query(
                    r#"
                    UPDATE products SET deleted_at = NOW(), deleted_by = $2, updated_at = NOW()
                    WHERE id = $1 AND deleted_at IS NULL
                    "#,
                )
                .bind(id)
                .bind(actor)
                .execute(&self.pool)
                .await?
            }
            DeleteMode::Hard => {
                sqlx::query("DELETE FROM products WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(missing("Product", id));
        }
        Ok(())
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Product> {
        let sql = format!(
            r#"
            UPDATE products SET
                deleted_at = NULL,
                deleted_by = NULL,
                updated_at = NOW(),
                updated_by = COALESCE($2, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            PRODUCT_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(actor)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Into::into).ok_or_else(|| missing("Product", id))
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let row: StatisticsRow = sqlx::query_as(&statistics_sql("products"))
            .fetch_one(&self.pool)
            .await?;
        Ok(EntityStatistics::from_counts(row.total, row.deleted))
    }

    async fn count_by_mine(&self, mine_id: i64) -> BauxiteResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE mine_id = $1 AND deleted_at IS NULL",
        )
        .bind(mine_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    mine_id: i64,
    name: String,
    code: Option<String>,
    description: Option<String>,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            mine_id: row.mine_id,
            name: row.name,
            code: row.code,
            description: row.description,
            audit: AuditFields::from(row.audit),
        }
    }
}
