//! Production Repository
//!
//! Scenario CRUD. Status writes re-check the one-ACTIVE-per-year rule inside
//! the transaction; `uq_one_active_per_year` backs it up.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use bauxite_models::{
    AuditFields, DeleteMode, Enrollment, EntityStatistics, ListOptions, NewEnrollment,
    NewProduction, Page, Production, ProductionFilter, ProductionStatus, PRODUCTION_SORT_FIELDS,
};
use bauxite_utils::{translate_db_error, BauxiteError, BauxiteResult};

use super::enrollment::insert_enrollment;
use super::query::{
    missing, push_page, push_search, push_visibility, statistics_sql, AuditColumns,
    StatisticsRow, AUDIT_COLUMNS,
};
use super::ProductionRepository;

const PRODUCTION_COLUMNS: &str = "id, scenario_name, scenario_description, contractual_year, total_planned_tonnage, start_date, end_date, standard_moisture_content, status, base_scenario_id, version, activated_at, completed_at";

pub struct PgProductionRepository {
    pool: PgPool,
}

impl PgProductionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductionFilter, options: &ListOptions) {
        push_visibility(builder, options);
        if let Some(name) = &filter.scenario_name {
            builder.push(" AND scenario_name = ").push_bind(name.clone());
        }
        if let Some(year) = filter.contractual_year {
            builder.push(" AND contractual_year = ").push_bind(year);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(q) = &filter.q {
            push_search(builder, q, &["scenario_name", "scenario_description"]);
        }
    }
}

async fn insert_production<'c, E>(executor: E, new: NewProduction, actor: Option<&str>) -> BauxiteResult<Production>
where
    E: sqlx::PgExecutor<'c>,
{
    let version = new.version.unwrap_or(1);
    let draft = Production::from_new(0, new, version, AuditFields::new(actor));

    let sql = format!(
        r#"
        INSERT INTO productions
            (scenario_name, scenario_description, contractual_year, total_planned_tonnage,
             start_date, end_date, standard_moisture_content, status, base_scenario_id,
             version, activated_at, completed_at, created_by, updated_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
        RETURNING {}, {}
        "#,
        PRODUCTION_COLUMNS, AUDIT_COLUMNS
    );
    let row: ProductionRow = sqlx::query_as(&sql)
        .bind(&draft.scenario_name)
        .bind(&draft.scenario_description)
        .bind(draft.contractual_year)
        .bind(draft.total_planned_tonnage)
        .bind(draft.start_date)
        .bind(draft.end_date)
        .bind(draft.standard_moisture_content)
        .bind(draft.status.as_str())
        .bind(draft.base_scenario_id)
        .bind(draft.version)
        .bind(draft.activated_at)
        .bind(draft.completed_at)
        .bind(actor)
        .fetch_one(executor)
        .await
        .map_err(|error| translate_db_error(error).with_active_year(draft.contractual_year))?;

    row.try_into()
}

#[async_trait]
impl ProductionRepository for PgProductionRepository {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Production>> {
        let sql = format!(
            "SELECT {}, {} FROM productions WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
            PRODUCTION_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<ProductionRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Production::try_from).transpose()
    }

    async fn list(
        &self,
        filter: &ProductionFilter,
        options: &ListOptions,
    ) -> BauxiteResult<Page<Production>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM productions WHERE 1=1");
        Self::push_filters(&mut count, filter, options);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {} FROM productions WHERE 1=1",
            PRODUCTION_COLUMNS, AUDIT_COLUMNS
        ));
        Self::push_filters(&mut select, filter, options);
        push_page(&mut select, options, PRODUCTION_SORT_FIELDS)?;
        let rows: Vec<ProductionRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let items = rows
            .into_iter()
            .map(Production::try_from)
            .collect::<BauxiteResult<Vec<_>>>()?;
        Ok(Page::new(items, options, total))
    }

    async fn find_active(&self, year: i32, exclude_id: Option<i64>) -> BauxiteResult<Option<Production>> {
        let sql = format!(
            r#"
            SELECT {}, {} FROM productions
            WHERE contractual_year = $1 AND status = 'active'
              AND ($2::BIGINT IS NULL OR id <> $2)
            LIMIT 1
            "#,
            PRODUCTION_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<ProductionRow> = sqlx::query_as(&sql)
            .bind(year)
            .bind(exclude_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Production::try_from).transpose()
    }

    async fn completed_before(&self, year: i32) -> BauxiteResult<Vec<Production>> {
        let sql = format!(
            r#"
            SELECT {}, {} FROM productions
            WHERE status = 'completed' AND contractual_year < $1 AND deleted_at IS NULL
            ORDER BY contractual_year DESC, scenario_name ASC, version DESC
            "#,
            PRODUCTION_COLUMNS, AUDIT_COLUMNS
        );
        let rows: Vec<ProductionRow> = sqlx::query_as(&sql)
            .bind(year)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Production::try_from).collect()
    }

    async fn latest_version(&self, year: i32, scenario_name: &str) -> BauxiteResult<Option<i32>> {
        let version: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(version) FROM productions WHERE contractual_year = $1 AND scenario_name = $2",
        )
        .bind(year)
        .bind(scenario_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(version)
    }

    async fn create(&self, new: NewProduction, actor: Option<&str>) -> BauxiteResult<Production> {
        insert_production(&self.pool, new, actor).await
    }

    async fn create_with_enrollments(
        &self,
        new: NewProduction,
        enrollments: Vec<NewEnrollment>,
        actor: Option<&str>,
    ) -> BauxiteResult<(Production, Vec<Enrollment>)> {
        let mut tx = self.pool.begin().await?;

        let production = insert_production(&mut *tx, new, actor).await?;
        let mut created = Vec::with_capacity(enrollments.len());
        for enrollment in &enrollments {
            created.push(insert_enrollment(&mut *tx, production.id, enrollment).await?);
        }

        tx.commit().await?;
        Ok((production, created))
    }

    async fn update(&self, production: Production, actor: Option<&str>) -> BauxiteResult<Production> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM productions WHERE id = $1 FOR UPDATE")
            .bind(production.id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(missing("Production", production.id));
        }

        if production.status == ProductionStatus::Active {
            let other: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT id FROM productions
                WHERE contractual_year = $1 AND status = 'active' AND id <> $2
                LIMIT 1
                "#,
            )
            .bind(production.contractual_year)
            .bind(production.id)
            .fetch_optional(&mut *tx)
            .await?;
            if other.is_some() {
                return Err(BauxiteError::active_conflict(production.contractual_year));
            }
        }

        let sql = format!(
            r#"
            UPDATE productions SET
                scenario_name = $2,
                scenario_description = $3,
                contractual_year = $4,
                total_planned_tonnage = $5,
                start_date = $6,
                end_date = $7,
                standard_moisture_content = $8,
                status = $9,
                base_scenario_id = $10,
                version = $11,
                activated_at = $12,
                completed_at = $13,
                updated_at = NOW(),
                updated_by = COALESCE($14, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            PRODUCTION_COLUMNS, AUDIT_COLUMNS
        );
        let row: ProductionRow = sqlx::query_as(&sql)
            .bind(production.id)
            .bind(&production.scenario_name)
            .bind(&production.scenario_description)
            .bind(production.contractual_year)
            .bind(production.total_planned_tonnage)
            .bind(production.start_date)
            .bind(production.end_date)
            .bind(production.standard_moisture_content)
            .bind(production.status.as_str())
            .bind(production.base_scenario_id)
            .bind(production.version)
            .bind(production.activated_at)
            .bind(production.completed_at)
            .bind(actor)
            .fetch_one(&mut *tx)
            .await
            .map_err(|error| translate_db_error(error).with_active_year(production.contractual_year))?;

        tx.commit().await?;
        row.try_into()
    }

    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()> {
        let result = match mode {
            DeleteMode::Soft => {
                sqlx::query(
                    r#"
                    UPDATE productions SET deleted_at = NOW(), deleted_by = $2, updated_at = NOW()
                    WHERE id = $1 AND deleted_at IS NULL
                    "#,
                )
                .bind(id)
                .bind(actor)
                .execute(&self.pool)
                .await?
            }
            DeleteMode::Hard => {
                sqlx::query("DELETE FROM productions WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(missing("Production", id));
        }
        Ok(())
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Production> {
        let sql = format!(
            r#"
            UPDATE productions SET
                deleted_at = NULL,
                deleted_by = NULL,
                updated_at = NOW(),
                updated_by = COALESCE($2, updated_by)
            WHERE id = $1
            RETURNING {}, {}
            "#,
            PRODUCTION_COLUMNS, AUDIT_COLUMNS
        );
        let row: Option<ProductionRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(actor)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Production::try_from)
            .transpose()?
            .ok_or_else(|| missing("Production", id))
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let row: StatisticsRow = sqlx::query_as(&statistics_sql("productions"))
            .fetch_one(&self.pool)
            .await?;
        Ok(EntityStatistics::from_counts(row.total, row.deleted))
    }
}

/// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct ProductionRow {
    id: i64,
    scenario_name: String,
    scenario_description: Option<String>,
    contractual_year: i32,
    total_planned_tonnage: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    standard_moisture_content: f64,
    status: String,
    base_scenario_id: Option<i64>,
    version: i32,
    activated_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl TryFrom<ProductionRow> for Production {
    type Error = BauxiteError;

    fn try_from(row: ProductionRow) -> Result<Self, Self::Error> {
        let status: ProductionStatus = row.status.parse().map_err(|_| {
            BauxiteError::database(format!(
                "Unknown status '{}' stored for production {}",
                row.status, row.id
            ))
        })?;

        Ok(Self {
            id: row.id,
            scenario_name: row.scenario_name,
            scenario_description: row.scenario_description,
            contractual_year: row.contractual_year,
            total_planned_tonnage: row.total_planned_tonnage,
            start_date: row.start_date,
            end_date: row.end_date,
            standard_moisture_content: row.standard_moisture_content,
            status,
            base_scenario_id: row.base_scenario_id,
            version: row.version,
            activated_at: row.activated_at,
            completed_at: row.completed_at,
            audit: AuditFields::from(row.audit),
        })
    }
}
