use anyhow::Context;
use bauxite_database::Repositories;
use bauxite_utils::{AppConfig, OperationMetrics, TtlCache};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwtKeys;
use crate::services::{MineService, PartnerService, ProductService, ProductionService, ServiceContext};

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repos: Repositories,
    pub metrics: OperationMetrics,
    pub jwt: JwtKeys,
    pub mines: MineService,
    pub products: ProductService,
    pub partners: PartnerService,
    pub productions: ProductionService,
}

impl AppState {
    pub fn new(config: AppConfig, repos: Repositories) -> anyhow::Result<Self> {
        let metrics = OperationMetrics::new(&config.monitoring.prometheus_namespace)
            .context("Failed to register operation metrics")?;
        let ctx = ServiceContext {
            cache: TtlCache::new(&config.cache),
            metrics: metrics.clone(),
            search_ttl: Duration::from_secs(config.cache.search_ttl_seconds),
        };

        Ok(Self {
            jwt: JwtKeys::new(&config.auth),
            mines: MineService::new(repos.mines.clone(), repos.products.clone(), ctx.clone()),
            products: ProductService::new(repos.products.clone(), repos.mines.clone(), ctx.clone()),
            partners: PartnerService::new(repos.partner_entities.clone(), repos.partners.clone(), ctx.clone()),
            productions: ProductionService::new(
                repos.productions.clone(),
                repos.enrollments.clone(),
                repos.partners.clone(),
                ctx,
            ),
            metrics,
            repos,
            config: Arc::new(config),
        })
    }
}
