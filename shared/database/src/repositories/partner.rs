//! Partner Entity and Partner Repositories

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use bauxite_models::{
    AuditFields, DeleteMode, EntityStatistics, ListOptions, NewPartner, NewPartnerEntity, Page,
    Partner, PartnerEntity, PartnerEntityFilter, PartnerFilter, PARTNER_ENTITY_SORT_FIELDS,
    PARTNER_SORT_FIELDS,
};
use bauxite_utils::BauxiteResult;

use super::query::{
    missing, push_page, push_search, push_visibility, statistics_sql, AuditColumns,
    StatisticsRow, AUDIT_COLUMNS,
};
use super::{PartnerEntityRepository, PartnerRepository};

const ENTITY_COLUMNS: &str = "id, name, code, description, is_halco_buyer";
const PARTNER_COLUMNS: &str = "id, entity_id, name, code, description, minimum_contractual_tonnage";

pub struct PgPartnerEntityRepository {
    pool: PgPool,
}

impl PgPartnerEntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(
        builder: &mut QueryBuilder<'_, Postgres>,
        filter: &PartnerEntityFilter,
        options: &ListOptions,
    ) {
        push_visibility(builder, options);
        if let Some(name) = &filter.name {
            builder.push(" AND name = ").push_bind(name.clone());
        }
        if let Some(code) = &filter.code {
            builder.push(" AND code = ").push_bind(code.clone());
        }
        if let Some(flag) = filter.is_halco_buyer {
            builder.push(" AND is_halco_buyer = ").push_bind(flag);
        }
        if let Some(q) = &filter.q {
            push_search(builder, q, &["name", "code"]);
        }
    }
}

#[async_trait]
impl PartnerEntityRepository for PgPartnerEntityRepository {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<PartnerEntity>> {
        let sql = format!(
            "SELECT {}, {} FROM partner_entities WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
            ENTITY_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<EntityRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<PartnerEntity>> {
        let sql = format!(
            "SELECT {}, {} FROM partner_entities WHERE id = ANY($1) AND ($2 OR deleted_at IS NULL) ORDER BY id",
            ENTITY_COLUMNS, AUDIT_COLUMNS
        );
        let rows: Vec<EntityRow> = sqlx::query_as(&sql)
            .bind(ids)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(
        &self,
        filter: &PartnerEntityFilter,
        options: &ListOptions,
    ) -> BauxiteResult<Page<PartnerEntity>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM partner_entities WHERE 1=1");
        Self::push_filters(&mut count, filter, options);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {} FROM partner_entities WHERE 1=1",
            ENTITY_COLUMNS, AUDIT_COLUMNS
        ));
        Self::push_filters(&mut select, filter, options);
        push_page(&mut select, options, PARTNER_ENTITY_SORT_FIELDS)?;
        let rows: Vec<EntityRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page::new(rows.into_iter().map(Into::into).collect(), options, total))
    }

    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM partner_entities
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

    async fn create(&self, new: NewPartnerEntity, actor: Option<&str>) -> BauxiteResult<PartnerEntity> {
        let sql = format!(
            r#"
            INSERT INTO partner_entities (name, code, description, is_halco_buyer, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {}, {}
            "#,
            ENTITY_COLUMNS, AUDIT_COLUMNS
        );
        let row: EntityRow = sqlx::query_as(&sql)
            .bind(&new.name)
            .bind(&new.code)
            .bind(&new.description)
            .bind(new.is_halco_buyer)
            .bind(actor)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn update(&self, entity: PartnerEntity, actor: Option<&str>) -> BauxiteResult<PartnerEntity> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> =
            sqlx::query_scalar("SELECT id FROM partner_entities WHERE id = $1 FOR UPDATE")
                .bind(entity.id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(missing("Partner entity", entity.id));
        }

        let sql = format!(
            r#"
            UPDATE partner_entities SET
                name = $2,
                code = $3,
                description = $4,
                is_halco_buyer = $5,
                updated_at = NOW(),
                updated_by = COALESCE($6, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            ENTITY_COLUMNS, AUDIT_COLUMNS
        );
        let row: EntityRow = sqlx::query_as(&sql)
            .bind(entity.id)
            .bind(&entity.name)
            .bind(&entity.code)
            .bind(&entity.description)
            .bind(entity.is_halco_buyer)
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
                    UPDATE partner_entities SET deleted_at = NOW(), deleted_by = $2, updated_at = NOW()
                    WHERE id = $1 AND deleted_at IS NULL
                    "#,
                )
                .bind(id)
                .bind(actor)
                .execute(&self.pool)
                .await?
            }
            DeleteMode::Hard => {
                sqlx::query("DELETE FROM partner_entities WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(missing("Partner entity", id));
        }
        Ok(())
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<PartnerEntity> {
        let sql = format!(
            r#"
            UPDATE partner_entities SET
                deleted_at = NULL,
                deleted_by = NULL,
                updated_at = NOW(),
                updated_by = COALESCE($2, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            ENTITY_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<EntityRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(actor)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Into::into).ok_or_else(|| missing("Partner entity", id))
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let row: StatisticsRow = sqlx::query_as(&statistics_sql("partner_entities"))
            .fetch_one(&self.pool)
            .await?;
        Ok(EntityStatistics::from_counts(row.total, row.deleted))
    }
}

pub struct PgPartnerRepository {
    pool: PgPool,
}

impl PgPartnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &PartnerFilter, options: &ListOptions) {
        push_visibility(builder, options);
        if let Some(name) = &filter.name {
            builder.push(" AND name = ").push_bind(name.clone());
        }
        if let Some(code) = &filter.code {
            builder.push(" AND code = ").push_bind(code.clone());
        }
        if let Some(entity_id) = filter.entity_id {
            builder.push(" AND entity_id = ").push_bind(entity_id);
        }
        if let Some(q) = &filter.q {
            push_search(builder, q, &["name", "code"]);
        }
    }
}

#[async_trait]
impl PartnerRepository for PgPartnerRepository {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Partner>> {
        let sql = format!(
            "SELECT {}, {} FROM partners WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
            PARTNER_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<PartnerRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Partner>> {
        let sql = format!(
            "SELECT {}, {} FROM partners WHERE id = ANY($1) AND ($2 OR deleted_at IS NULL) ORDER BY id",
            PARTNER_COLUMNS, AUDIT_COLUMNS
        );
        let rows: Vec<PartnerRow> = sqlx::query_as(&sql)
            .bind(ids)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(&self, filter: &PartnerFilter, options: &ListOptions) -> BauxiteResult<Page<Partner>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM partners WHERE 1=1");
        Self::push_filters(&mut count, filter, options);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {} FROM partners WHERE 1=1",
            PARTNER_COLUMNS, AUDIT_COLUMNS
        ));
        Self::push_filters(&mut select, filter, options);
        push_page(&mut select, options, PARTNER_SORT_FIELDS)?;
        let rows: Vec<PartnerRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page::new(rows.into_iter().map(Into::into).collect(), options, total))
    }

    async fn list_for_entity(&self, entity_id: i64) -> BauxiteResult<Vec<Partner>> {
        let sql = format!(
            "SELECT {}, {} FROM partners WHERE entity_id = $1 AND deleted_at IS NULL ORDER BY name",
            PARTNER_COLUMNS, AUDIT_COLUMNS
        );
        let rows: Vec<PartnerRow> = sqlx::query_as(&sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn exists_by_name(&self, entity_id: i64, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM partners
                WHERE entity_id = $1 AND name = $2
                  AND ($3::BIGINT IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(entity_id)
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
                SELECT 1 FROM partners
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

    async fn create(&self, new: NewPartner, actor: Option<&str>) -> BauxiteResult<Partner> {
        let sql = format!(
            r#"
            INSERT INTO partners
                (entity_id, name, code, description, minimum_contractual_tonnage, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {}, {}
            "#,
            PARTNER_COLUMNS, AUDIT_COLUMNS
        );
        let row: PartnerRow = sqlx::query_as(&sql)
            .bind(new.entity_id)
            .bind(&new.name)
            .bind(&new.code)
            .bind(&new.description)
            .bind(new.minimum_contractual_tonnage)
            .bind(actor)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn update(&self, partner: Partner, actor: Option<&str>) -> BauxiteResult<Partner> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM partners WHERE id = $1 FOR UPDATE")
            .bind(partner.id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(missing("Partner", partner.id));
        }

        let sql = format!(
            r#"
            UPDATE partners SET
                entity_id = $2,
                name = $3,
                code = $4,
                description = $5,
                minimum_contractual_tonnage = $6,
                updated_at = NOW(),
                updated_by = COALESCE($7, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            PARTNER_COLUMNS, AUDIT_COLUMNS
        );
        let row: PartnerRow = sqlx::query_as(&sql)
            .bind(partner.id)
            .bind(partner.entity_id)
            .bind(&partner.name)
            .bind(&partner.code)
            .bind(&partner.description)
            .bind(partner.minimum_contractual_tonnage)
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
                    UPDATE partners SET deleted_at = NOW(), deleted_by = $2, updated_at = NOW()
                    WHERE id = $1 AND deleted_at IS NULL
                    "#,
                )
                .bind(id)
                .bind(actor)
                .execute(&self.pool)
                .await?
            }
            // enrolled partners are protected by fk_enrollments_partner (RESTRICT)
            DeleteMode::Hard => {
                sqlx::query("DELETE FROM partners WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(missing("Partner", id));
        }
        Ok(())
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Partner> {
        let sql = format!(
            r#"
            UPDATE partners SET
                deleted_at = NULL,
                deleted_by = NULL,
                updated_at = NOW(),
                updated_by = COALESCE($2, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            PARTNER_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<PartnerRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(actor)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Into::into).ok_or_else(|| missing("Partner", id))
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let row: StatisticsRow = sqlx::query_as(&statistics_sql("partners"))
            .fetch_one(&self.pool)
            .await?;
        Ok(EntityStatistics::from_counts(row.total, row.deleted))
    }

    async fn count_by_entity(&self, entity_id: i64) -> BauxiteResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM partners WHERE entity_id = $1 AND deleted_at IS NULL",
        )
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// Internal row types for SQLx mapping
#[derive(Debug, FromRow)]
struct EntityRow {
    id: i64,
    name: String,
    code: String,
    description: Option<String>,
    is_halco_buyer: bool,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl From<EntityRow> for PartnerEntity {
    fn from(row: EntityRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            code: row.code,
            description: row.description,
            is_halco_buyer: row.is_halco_buyer,
            audit: AuditFields::from(row.audit),
        }
    }
}

#[derive(Debug, FromRow)]
struct PartnerRow {
    id: i64,
    entity_id: i64,
    name: String,
    code: String,
    description: Option<String>,
    minimum_contractual_tonnage: Option<i64>,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl From<PartnerRow> for Partner {
    fn from(row: PartnerRow) -> Self {
        Self {
            id: row.id,
            entity_id: row.entity_id,
            name: row.name,
            code: row.code,
            description: row.description,
            minimum_contractual_tonnage: row.minimum_contractual_tonnage,
            audit: AuditFields::from(row.audit),
        }
    }
}
