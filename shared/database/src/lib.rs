pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod repositories;

pub use memory::MemoryStore;
pub use postgres::{create_postgres_pool, health_check as postgres_health_check, PostgresPool};
pub use repositories::*;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use bauxite_utils::{BauxiteError, BauxiteResult, DatabaseConfig, StorageBackend};

/// Every repository the service needs, behind trait objects so handlers do
/// not care which backend is configured.
#[derive(Clone)]
pub struct Repositories {
    pub mines: Arc<dyn MineRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub partner_entities: Arc<dyn PartnerEntityRepository>,
    pub partners: Arc<dyn PartnerRepository>,
    pub productions: Arc<dyn ProductionRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pool: Option<PostgresPool>,
}

impl Repositories {
    pub fn postgres(pool: PostgresPool) -> Self {
        Self {
            mines: Arc::new(PgMineRepository::new(pool.clone())),
            products: Arc::new(PgProductRepository::new(pool.clone())),
            partner_entities: Arc::new(PgPartnerEntityRepository::new(pool.clone())),
            partners: Arc::new(PgPartnerRepository::new(pool.clone())),
            productions: Arc::new(PgProductionRepository::new(pool.clone())),
            enrollments: Arc::new(PgEnrollmentRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn in_memory() -> Self {
        let store = MemoryStore::new();
        Self {
            mines: Arc::new(store.clone()),
            products: Arc::new(store.clone()),
            partner_entities: Arc::new(store.clone()),
            partners: Arc::new(store.clone()),
            productions: Arc::new(store.clone()),
            enrollments: Arc::new(store),
            pool: None,
        }
    }

    pub fn backend(&self) -> StorageBackend {
        match self.pool {
            Some(_) => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        }
    }

    pub async fn health_check(&self) -> BauxiteResult<()> {
        match &self.pool {
            Some(pool) => postgres_health_check(pool)
                .await
                .map_err(|e| BauxiteError::database(format!("{:#}", e))),
            None => Ok(()),
        }
    }
}

pub async fn initialize(config: &DatabaseConfig) -> Result<Repositories> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Repositories::in_memory())
        }
        StorageBackend::Postgres => {
            let pool = create_postgres_pool(
                &config.postgres_url,
                config.max_connections,
                Duration::from_secs(config.connection_timeout_seconds),
            )
            .await?;

            if config.run_migrations {
                migrations::run_postgres_migrations(&pool).await?;
            }

            Ok(Repositories::postgres(pool))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bauxite_models::{MineFilter, ListOptions};

    #[tokio::test]
    async fn test_memory_backend_initializes_without_database() {
        let config = DatabaseConfig {
            backend: StorageBackend::Memory,
            postgres_url: String::new(),
            max_connections: 1,
            connection_timeout_seconds: 1,
            run_migrations: true,
        };
        let repos = initialize(&config).await.unwrap();

        assert_eq!(repos.backend(), StorageBackend::Memory);
        assert!(repos.health_check().await.is_ok());
        let page = repos
            .mines
            .list(&MineFilter::default(), &ListOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }
}
