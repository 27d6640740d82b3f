use bauxite_database::{MineRepository, ProductRepository};
use bauxite_models::{
    merge_changes, CountryCount, CreateMineRequest, DeleteMode, EntityStatistics, ListOptions, Mine,
    MineFilter, MineView, MineWithProductsRequest, NewMine, Page, ProductDraft,
};
use bauxite_utils::{
    log_info, log_warn, normalize_search, validate_model, BauxiteError, BauxiteResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::product::check_drafts;
use super::{collect_pages, ServiceContext, MAX_SEARCH_LIMIT};

const SERVICE: &str = "mine";
const CACHE_PREFIX: &str = "mine:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineStatistics {
    #[serde(flatten)]
    pub counts: EntityStatistics,
    pub by_country: Vec<CountryCount>,
}

#[derive(Clone)]
pub struct MineService {
    mines: Arc<dyn MineRepository>,
    products: Arc<dyn ProductRepository>,
    ctx: ServiceContext,
}

impl MineService {
    pub fn new(
        mines: Arc<dyn MineRepository>,
        products: Arc<dyn ProductRepository>,
        ctx: ServiceContext,
    ) -> Self {
        Self { mines, products, ctx }
    }

    pub async fn get(&self, id: i64, include_products: bool, include_deleted: bool) -> BauxiteResult<MineView> {
        let key = format!(
            "{}{}:products={}:deleted={}",
            CACHE_PREFIX, id, include_products, include_deleted
        );
        let load = async {
            let mine = self.require(id, include_deleted).await?;
            self.view(mine, include_products).await
        };
        self.ctx
            .track(SERVICE, "get", self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), load))
            .await
    }

    pub async fn list(
        &self,
        filter: &MineFilter,
        options: &ListOptions,
        include_products: bool,
    ) -> BauxiteResult<Page<MineView>> {
        self.ctx
            .track(SERVICE, "list", async {
                let page = self.mines.list(filter, options).await?;
                let mut views = Vec::with_capacity(page.items.len());
                for mine in page.items.iter().cloned() {
                    views.push(self.view(mine, include_products).await?);
                }
                Ok(page.with_items(views))
            })
            .await
    }

    pub async fn search(&self, q: Option<&str>, limit: Option<u32>) -> BauxiteResult<Vec<MineView>> {
        let (q, limit) = normalize_search(q, limit, MAX_SEARCH_LIMIT)?;
        let key = format!("{}search:{}:{}", CACHE_PREFIX, q.to_lowercase(), limit);
        let load = async {
            let filter = MineFilter {
                q: Some(q.clone()),
                ..MineFilter::default()
            };
            let page = self.mines.list(&filter, &ListOptions::page(1, limit)).await?;
            let mut views = Vec::with_capacity(page.items.len());
            for mine in page.items {
                views.push(self.view(mine, false).await?);
            }
            BauxiteResult::Ok(views)
        };
        self.ctx
            .track(SERVICE, "search", self.ctx.cached(SERVICE, key, self.ctx.search_ttl, load))
            .await
    }

    pub async fn by_country(&self, country: &str) -> BauxiteResult<Vec<MineView>> {
        self.ctx
            .track(SERVICE, "by_country", async {
                let filter = MineFilter {
                    country: Some(country.trim().to_string()),
                    ..MineFilter::default()
                };
                let mines = collect_pages(|options| {
                    let filter = filter.clone();
                    async move { self.mines.list(&filter, &options).await }
                })
                .await?;

                let mut views = Vec::with_capacity(mines.len());
                for mine in mines {
                    views.push(self.view(mine, false).await?);
                }
                Ok(views)
            })
            .await
    }

    pub async fn create(&self, request: CreateMineRequest, actor: Option<&str>) -> BauxiteResult<MineView> {
        self.ctx
            .track(SERVICE, "create", async {
                self.insert(request.mine, request.products, actor).await
            })
            .await
    }

    pub async fn create_with_products(
        &self,
        request: MineWithProductsRequest,
        actor: Option<&str>,
    ) -> BauxiteResult<MineView> {
        self.ctx
            .track(SERVICE, "create_with_products", async {
                if request.products.is_empty() {
                    return Err(BauxiteError::validation("At least one product is required"));
                }
                self.insert(request.mine, request.products, actor).await
            })
            .await
    }

    pub async fn update(&self, id: i64, changes: Map<String, Value>, actor: Option<&str>) -> BauxiteResult<MineView> {
        self.ctx
            .track(SERVICE, "update", async {
                let mut mine = self.require(id, false).await?;
                let form: NewMine = merge_changes(&mine.form(), &changes)?;
                validate_model(&form)?;
                self.ensure_unique(&form, Some(id)).await?;

                mine.apply(form);
                let mine = self.mines.update(mine, actor).await?;
                self.invalidate().await;
                log_info!("Mine updated", mine_id = mine.id);

                self.view(mine, false).await
            })
            .await
    }

    pub async fn delete(&self, id: i64, permanent: bool, actor: Option<&str>) -> BauxiteResult<()> {
        self.ctx
            .track(SERVICE, "delete", async {
                let mode = DeleteMode::from_permanent(permanent);
                self.mines.delete(id, mode, actor).await?;
                self.invalidate().await;
                log_info!("Mine deleted", mine_id = id, permanent = permanent);
                Ok(())
            })
            .await
    }

    pub async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<MineView> {
        self.ctx
            .track(SERVICE, "restore", async {
                let mine = self.mines.restore(id, actor).await?;
                self.invalidate().await;
                log_info!("Mine restored", mine_id = id);
                self.view(mine, false).await
            })
            .await
    }

    pub async fn statistics(&self) -> BauxiteResult<MineStatistics> {
        let key = format!("{}statistics", CACHE_PREFIX);
        let load = async {
            let counts = self.mines.statistics().await?;
            let by_country = self.mines.count_by_country().await?;
            BauxiteResult::Ok(MineStatistics { counts, by_country })
        };
        self.ctx
            .track(SERVICE, "statistics", self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), load))
            .await
    }

    pub fn health(&self) -> Value {
        self.ctx.metrics.snapshot(SERVICE)
    }

    async fn insert(&self, new: NewMine, drafts: Vec<ProductDraft>, actor: Option<&str>) -> BauxiteResult<MineView> {
        validate_model(&new)?;
        check_drafts(&drafts)?;
        self.ensure_unique(&new, None).await?;

        let view = if drafts.is_empty() {
            let mine = self.mines.create(new, actor).await?;
            self.view(mine, false).await?
        } else {
            // mine_id is assigned inside the transaction
            let products = drafts.into_iter().map(|draft| draft.for_mine(0)).collect();
            let (mine, products) = self.mines.create_with_products(new, products, actor).await?;
            MineView::with_products(mine, products)
        };

        self.invalidate().await;
        log_info!("Mine created", mine_id = view.mine.id, products = view.products_count.unwrap_or(0));
        Ok(view)
    }

    async fn invalidate(&self) {
        self.ctx.invalidate(CACHE_PREFIX).await;
        // product views embed their mine
        self.ctx.invalidate("product:").await;
    }

    async fn require(&self, id: i64, include_deleted: bool) -> BauxiteResult<Mine> {
        self.mines
            .get(id, include_deleted)
            .await?
            .ok_or_else(|| BauxiteError::not_found(format!("Mine {}", id)))
    }

    async fn ensure_unique(&self, form: &NewMine, exclude_id: Option<i64>) -> BauxiteResult<()> {
        if self.mines.exists_by_name(&form.name, exclude_id).await? {
            log_warn!("Rejected duplicate mine name", name = %form.name);
            return Err(BauxiteError::duplicate(format!(
                "A mine with the name '{}' already exists",
                form.name
            )));
        }
        if let Some(code) = &form.code {
            if self.mines.exists_by_code(code, exclude_id).await? {
                log_warn!("Rejected duplicate mine code", code = %code);
                return Err(BauxiteError::duplicate(format!(
                    "A mine with the code '{}' already exists",
                    code
                )));
            }
        }
        Ok(())
    }

    async fn view(&self, mine: Mine, include_products: bool) -> BauxiteResult<MineView> {
        if include_products {
            let products = self.products.list_for_mine(mine.id).await?;
            Ok(MineView::with_products(mine, products))
        } else {
            let count = self.products.count_by_mine(mine.id).await?;
            Ok(MineView::with_count(mine, count))
        }
    }
}
