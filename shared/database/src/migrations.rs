use anyhow::{Context, Result};
use sqlx::PgPool;

/// Ordered, idempotent DDL. Each statement is safe to re-run on startup.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "create mines",
        r#"
        CREATE TABLE IF NOT EXISTS mines (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(200) NOT NULL,
            code VARCHAR(50),
            country VARCHAR(100) NOT NULL,
            port_location VARCHAR(150) NOT NULL,
            port_latitude DOUBLE PRECISION NOT NULL,
            port_longitude DOUBLE PRECISION NOT NULL,
            port_berths INTEGER NOT NULL DEFAULT 1,
            shiploaders INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by VARCHAR(100),
            updated_by VARCHAR(100),
            deleted_at TIMESTAMPTZ,
            deleted_by VARCHAR(100),
            CONSTRAINT uq_mines_name UNIQUE (name),
            CONSTRAINT uq_mines_code UNIQUE (code),
            CONSTRAINT ck_mines_latitude CHECK (port_latitude BETWEEN -90 AND 90),
            CONSTRAINT ck_mines_longitude CHECK (port_longitude BETWEEN -180 AND 180),
            CONSTRAINT ck_mines_berths CHECK (port_berths >= 0),
            CONSTRAINT ck_mines_shiploaders CHECK (shiploaders >= 0)
        )
        "#,
    ),
    (
        "create products",
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id BIGSERIAL PRIMARY KEY,
            mine_id BIGINT NOT NULL,
            name VARCHAR(100) NOT NULL,
            code VARCHAR(50),
            description TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by VARCHAR(100),
            updated_by VARCHAR(100),
            deleted_at TIMESTAMPTZ,
            deleted_by VARCHAR(100),
            CONSTRAINT fk_products_mine FOREIGN KEY (mine_id)
                REFERENCES mines(id) ON DELETE CASCADE,
            CONSTRAINT uq_products_mine_name UNIQUE (mine_id, name),
            CONSTRAINT uq_products_code UNIQUE (code)
        )
        "#,
    ),
    (
        "create partner_entities",
        r#"
        CREATE TABLE IF NOT EXISTS partner_entities (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(100) NOT NULL,
            code VARCHAR(20) NOT NULL,
            description TEXT,
            is_halco_buyer BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by VARCHAR(100),
            updated_by VARCHAR(100),
            deleted_at TIMESTAMPTZ,
            deleted_by VARCHAR(100),
            CONSTRAINT uq_partner_entities_code UNIQUE (code)
        )
        "#,
    ),
    (
        "create partners",
        r#"
        CREATE TABLE IF NOT EXISTS partners (
            id BIGSERIAL PRIMARY KEY,
            entity_id BIGINT NOT NULL,
            name VARCHAR(100) NOT NULL,
            code VARCHAR(20) NOT NULL,
            description TEXT,
            minimum_contractual_tonnage BIGINT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by VARCHAR(100),
            updated_by VARCHAR(100),
            deleted_at TIMESTAMPTZ,
            deleted_by VARCHAR(100),
            CONSTRAINT fk_partners_entity FOREIGN KEY (entity_id)
                REFERENCES partner_entities(id) ON DELETE CASCADE,
            CONSTRAINT uq_partners_code UNIQUE (code),
            CONSTRAINT uq_partners_entity_name UNIQUE (entity_id, name),
            CONSTRAINT ck_partners_minimum CHECK (minimum_contractual_tonnage >= 0)
        )
        "#,
    ),
    (
        "create productions",
        r#"
        CREATE TABLE IF NOT EXISTS productions (
            id BIGSERIAL PRIMARY KEY,
            scenario_name VARCHAR(255) NOT NULL,
            scenario_description TEXT,
            contractual_year INTEGER NOT NULL,
            total_planned_tonnage BIGINT NOT NULL,
            start_date DATE NOT NULL,
            end_date DATE NOT NULL,
            standard_moisture_content DOUBLE PRECISION NOT NULL DEFAULT 3.0,
            status VARCHAR(20) NOT NULL DEFAULT 'draft',
            base_scenario_id BIGINT,
            version INTEGER NOT NULL DEFAULT 1,
            activated_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by VARCHAR(100),
            updated_by VARCHAR(100),
            deleted_at TIMESTAMPTZ,
            deleted_by VARCHAR(100),
            CONSTRAINT fk_productions_base FOREIGN KEY (base_scenario_id)
                REFERENCES productions(id) ON DELETE SET NULL,
            CONSTRAINT uq_productions_year_name_version UNIQUE (contractual_year, scenario_name, version),
            CONSTRAINT ck_productions_year CHECK (contractual_year BETWEEN 2000 AND 2100),
            CONSTRAINT ck_productions_tonnage CHECK (total_planned_tonnage > 0),
            CONSTRAINT ck_productions_dates CHECK (start_date < end_date),
            CONSTRAINT ck_productions_moisture CHECK (standard_moisture_content BETWEEN 0 AND 100),
            CONSTRAINT ck_productions_version CHECK (version >= 1),
            CONSTRAINT ck_productions_status CHECK (
                status IN ('draft', 'planned', 'active', 'completed', 'archived')
            )
        )
        "#,
    ),
    (
        "create one-active-per-year index",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_one_active_per_year
            ON productions(contractual_year)
            WHERE status = 'active'
        "#,
    ),
    (
        "create production_partner_enrollments",
        r#"
        CREATE TABLE IF NOT EXISTS production_partner_enrollments (
            id BIGSERIAL PRIMARY KEY,
            production_id BIGINT NOT NULL,
            partner_id BIGINT NOT NULL,
            vessel_size_t BIGINT NOT NULL,
            minimum_tonnage BIGINT NOT NULL,
            adjusted_tonnage BIGINT,
            manual_incentive_tonnage BIGINT,
            calculated_incentive_tonnage BIGINT,
            calculated_vld_count INTEGER NOT NULL DEFAULT 0,
            calculated_vld_total_tonnage BIGINT NOT NULL DEFAULT 0,
            vld_tonnage_variance BIGINT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT fk_enrollments_production FOREIGN KEY (production_id)
                REFERENCES productions(id) ON DELETE CASCADE,
            CONSTRAINT fk_enrollments_partner FOREIGN KEY (partner_id)
                REFERENCES partners(id) ON DELETE RESTRICT,
            CONSTRAINT uq_enrollments_production_partner UNIQUE (production_id, partner_id),
            CONSTRAINT ck_enrollments_vessel CHECK (vessel_size_t > 0),
            CONSTRAINT ck_enrollments_tonnages CHECK (
                minimum_tonnage >= 0
                AND COALESCE(adjusted_tonnage, 0) >= 0
                AND COALESCE(manual_incentive_tonnage, 0) >= 0
                AND COALESCE(calculated_incentive_tonnage, 0) >= 0
                AND calculated_vld_count >= 0
                AND calculated_vld_total_tonnage >= 0
            ),
            CONSTRAINT ck_enrollments_incentive_exclusive CHECK (
                manual_incentive_tonnage IS NULL OR calculated_incentive_tonnage IS NULL
            )
        )
        "#,
    ),
    (
        "index products.mine_id",
        "CREATE INDEX IF NOT EXISTS idx_products_mine_id ON products(mine_id)",
    ),
    (
        "index partners.entity_id",
        "CREATE INDEX IF NOT EXISTS idx_partners_entity_id ON partners(entity_id)",
    ),
    (
        "index productions.contractual_year",
        "CREATE INDEX IF NOT EXISTS idx_productions_year_status ON productions(contractual_year, status)",
    ),
    (
        "index enrollments.partner_id",
        "CREATE INDEX IF NOT EXISTS idx_enrollments_partner_id ON production_partner_enrollments(partner_id)",
    ),
];

pub async fn run_postgres_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!(steps = MIGRATIONS.len(), "Running PostgreSQL migrations");

    for (name, statement) in MIGRATIONS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Migration step '{}' failed", name))?;
        tracing::debug!(step = %name, "Migration step applied");
    }

    tracing::info!("PostgreSQL migrations completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent_ddl() {
        for (name, statement) in MIGRATIONS {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "step '{}' is not re-runnable",
                name
            );
        }
    }

    #[test]
    fn test_active_index_name_matches_error_translation() {
        assert!(MIGRATIONS
            .iter()
            .any(|(_, statement)| statement.contains(bauxite_utils::ACTIVE_PER_YEAR_INDEX)));
    }
}
