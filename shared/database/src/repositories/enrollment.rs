//! Enrollment Repository
//!
//! Partner enrollments in a production scenario. Enrollments are always
//! hard-deleted and go away with their production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use bauxite_models::{Enrollment, EnrollmentDetail, NewEnrollment};
use bauxite_utils::{BauxiteError, BauxiteResult};

use super::query::missing;
use super::EnrollmentRepository;

const ENROLLMENT_COLUMNS: &str = "id, production_id, partner_id, vessel_size_t, minimum_tonnage, adjusted_tonnage, manual_incentive_tonnage, calculated_incentive_tonnage, calculated_vld_count, calculated_vld_total_tonnage, vld_tonnage_variance, created_at, updated_at";

const DETAIL_SELECT: &str = r#"
    SELECT e.id, e.production_id, e.partner_id, e.vessel_size_t, e.minimum_tonnage,
           e.adjusted_tonnage, e.manual_incentive_tonnage, e.calculated_incentive_tonnage,
           e.calculated_vld_count, e.calculated_vld_total_tonnage, e.vld_tonnage_variance,
           e.created_at, e.updated_at,
           p.name AS partner_name, p.code AS partner_code,
           pe.id AS entity_id, pe.name AS entity_name, pe.is_halco_buyer
    FROM production_partner_enrollments e
    JOIN partners p ON p.id = e.partner_id
    JOIN partner_entities pe ON pe.id = p.entity_id
"#;

pub struct PgEnrollmentRepository {
    pool: PgPool,
}

impl PgEnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) async fn insert_enrollment<'c, E>(
    executor: E,
    production_id: i64,
    new: &NewEnrollment,
) -> BauxiteResult<Enrollment>
where
    E: sqlx::PgExecutor<'c>,
{
    let minimum_tonnage = new
        .minimum_tonnage
        .ok_or_else(|| BauxiteError::validation("minimum_tonnage is required"))?;

    let sql = format!(
        r#"
        INSERT INTO production_partner_enrollments
            (production_id, partner_id, vessel_size_t, minimum_tonnage, adjusted_tonnage,
             manual_incentive_tonnage, calculated_incentive_tonnage, calculated_vld_count,
             calculated_vld_total_tonnage, vld_tonnage_variance)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        ENROLLMENT_COLUMNS
    );
    let row: EnrollmentRow = sqlx::query_as(&sql)
        .bind(production_id)
        .bind(new.partner_id)
        .bind(new.vessel_size_t)
        .bind(minimum_tonnage)
        .bind(new.adjusted_tonnage)
        .bind(new.manual_incentive_tonnage)
        .bind(new.calculated_incentive_tonnage)
        .bind(new.calculated_vld_count)
        .bind(new.calculated_vld_total_tonnage)
        .bind(new.vld_tonnage_variance)
        .fetch_one(executor)
        .await?;

    Ok(row.into())
}

#[async_trait]
impl EnrollmentRepository for PgEnrollmentRepository {
    async fn list_for_production(
        &self,
        production_id: i64,
        halco_buyer: Option<bool>,
    ) -> BauxiteResult<Vec<EnrollmentDetail>> {
        let sql = format!(
            r#"
            {}
            WHERE e.production_id = $1 AND ($2::BOOLEAN IS NULL OR pe.is_halco_buyer = $2)
            ORDER BY p.name, e.id
            "#,
            DETAIL_SELECT
        );
        let rows: Vec<DetailRow> = sqlx::query_as(&sql)
            .bind(production_id)
            .bind(halco_buyer)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get(&self, production_id: i64, id: i64) -> BauxiteResult<Option<EnrollmentDetail>> {
        let sql = format!("{} WHERE e.production_id = $1 AND e.id = $2", DETAIL_SELECT);
        let row: Option<DetailRow> = sqlx::query_as(&sql)
            .bind(production_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn create(&self, production_id: i64, new: NewEnrollment) -> BauxiteResult<Enrollment> {
        insert_enrollment(&self.pool, production_id, &new).await
    }

    async fn update(&self, enrollment: Enrollment) -> BauxiteResult<Enrollment> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM production_partner_enrollments WHERE id = $1 AND production_id = $2 FOR UPDATE",
        )
        .bind(enrollment.id)
        .bind(enrollment.production_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(missing("Enrollment", enrollment.id));
        }

        let sql = format!(
            r#"
            UPDATE production_partner_enrollments SET
                partner_id = $2,
                vessel_size_t = $3,
                minimum_tonnage = $4,
                adjusted_tonnage = $5,
                manual_incentive_tonnage = $6,
                calculated_incentive_tonnage = $7,
                calculated_vld_count = $8,
                calculated_vld_total_tonnage = $9,
                vld_tonnage_variance = $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ENROLLMENT_COLUMNS
        );
        let row: EnrollmentRow = sqlx::query_as(&sql)
            .bind(enrollment.id)
            .bind(enrollment.partner_id)
            .bind(enrollment.vessel_size_t)
            .bind(enrollment.minimum_tonnage)
            .bind(enrollment.adjusted_tonnage)
            .bind(enrollment.manual_incentive_tonnage)
            .bind(enrollment.calculated_incentive_tonnage)
            .bind(enrollment.calculated_vld_count)
            .bind(enrollment.calculated_vld_total_tonnage)
            .bind(enrollment.vld_tonnage_variance)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn delete(&self, production_id: i64, id: i64) -> BauxiteResult<()> {
        let result = sqlx::query(
            "DELETE FROM production_partner_enrollments WHERE id = $1 AND production_id = $2",
        )
        .bind(id)
        .bind(production_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(missing("Enrollment", id));
        }
        Ok(())
    }
}

/// Internal row types for SQLx mapping
#[derive(Debug, FromRow)]
struct EnrollmentRow {
    id: i64,
    production_id: i64,
    partner_id: i64,
    vessel_size_t: i64,
    minimum_tonnage: i64,
    adjusted_tonnage: Option<i64>,
    manual_incentive_tonnage: Option<i64>,
    calculated_incentive_tonnage: Option<i64>,
    calculated_vld_count: i32,
    calculated_vld_total_tonnage: i64,
    vld_tonnage_variance: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Self {
            id: row.id,
            production_id: row.production_id,
            partner_id: row.partner_id,
            vessel_size_t: row.vessel_size_t,
            minimum_tonnage: row.minimum_tonnage,
            adjusted_tonnage: row.adjusted_tonnage,
            manual_incentive_tonnage: row.manual_incentive_tonnage,
            calculated_incentive_tonnage: row.calculated_incentive_tonnage,
            calculated_vld_count: row.calculated_vld_count,
            calculated_vld_total_tonnage: row.calculated_vld_total_tonnage,
            vld_tonnage_variance: row.vld_tonnage_variance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DetailRow {
    #[sqlx(flatten)]
    enrollment: EnrollmentRow,
    partner_name: String,
    partner_code: String,
    entity_id: i64,
    entity_name: String,
    is_halco_buyer: bool,
}

impl From<DetailRow> for EnrollmentDetail {
    fn from(row: DetailRow) -> Self {
        Self {
            enrollment: row.enrollment.into(),
            partner_name: row.partner_name,
            partner_code: row.partner_code,
            entity_id: row.entity_id,
            entity_name: row.entity_name,
            is_halco_buyer: row.is_halco_buyer,
        }
    }
}
