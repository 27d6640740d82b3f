use bauxite_database::{MineRepository, ProductRepository};
use bauxite_models::{
    merge_changes, DeleteMode, EntityStatistics, ListOptions, Mine, MineRef, NewProduct, Page,
    Product, ProductBatchCreate, ProductBatchUpdate, ProductDraft, ProductFilter, ProductView,
};
use bauxite_utils::{
    find_duplicates, format_validation_errors, log_info, log_warn, normalize_search, validate_model,
    BauxiteError, BauxiteResult,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use validator::Validate;

use super::{prefixed, ServiceContext, MAX_SEARCH_LIMIT};

const SERVICE: &str = "product";
const CACHE_PREFIX: &str = "product:";

/// Validates a batch of product drafts: per-item field rules, then name and
/// code clashes inside the batch.
pub(crate) fn check_drafts(drafts: &[ProductDraft]) -> BauxiteResult<()> {
    let mut errors = Vec::new();

    for (index, draft) in drafts.iter().enumerate() {
        if let Err(e) = draft.validate() {
            let prefix = format!("Product {}", index + 1);
            errors.extend(prefixed(&prefix, format_validation_errors(&e)));
        }
    }

    let names = find_duplicates(drafts.iter().map(|draft| draft.name.as_str()));
    if !names.is_empty() {
        errors.push(format!("Duplicate product names in batch: {}", names.join(", ")));
    }
    let codes = find_duplicates(drafts.iter().filter_map(|draft| draft.code.as_deref()));
    if !codes.is_empty() {
        errors.push(format!("Duplicate product codes in batch: {}", codes.join(", ")));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(BauxiteError::validation_errors(errors))
    }
}

#[derive(Clone)]
pub struct ProductService {
    products: Arc<dyn ProductRepository>,
    mines: Arc<dyn MineRepository>,
    ctx: ServiceContext,
}

impl ProductService {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        mines: Arc<dyn MineRepository>,
        ctx: ServiceContext,
    ) -> Self {
        Self { products, mines, ctx }
    }

    pub async fn get(&self, id: i64, include_mine: bool, include_deleted: bool) -> BauxiteResult<ProductView> {
        let key = format!(
            "{}{}:mine={}:deleted={}",
            CACHE_PREFIX, id, include_mine, include_deleted
        );
        let load = async {
            let product = self.require(id, include_deleted).await?;
            let mut views = self.views(vec![product], include_mine).await?;
            views
                .pop()
                .ok_or_else(|| BauxiteError::internal("Product view lost"))
        };
        self.ctx
            .track(SERVICE, "get", self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), load))
            .await
    }

    pub async fn list(
        &self,
        filter: &ProductFilter,
        options: &ListOptions,
        include_mine: bool,
    ) -> BauxiteResult<Page<ProductView>> {
        self.ctx
            .track(SERVICE, "list", async {
                let mut page = self.products.list(filter, options).await?;
                let items = std::mem::take(&mut page.items);
                let views = self.views(items, include_mine).await?;
                Ok(page.with_items(views))
            })
            .await
    }

    pub async fn for_mine(&self, mine_id: i64) -> BauxiteResult<Vec<Product>> {
        self.ctx
            .track(SERVICE, "for_mine", async {
                self.require_mine(mine_id).await?;
                self.products.list_for_mine(mine_id).await
            })
            .await
    }

    pub async fn search(&self, q: Option<&str>, limit: Option<u32>) -> BauxiteResult<Vec<ProductView>> {
        let (q, limit) = normalize_search(q, limit, MAX_SEARCH_LIMIT)?;
        let key = format!("{}search:{}:{}", CACHE_PREFIX, q.to_lowercase(), limit);
        let load = async {
            let filter = ProductFilter {
                q: Some(q.clone()),
                ..ProductFilter::default()
            };
            let page = self.products.list(&filter, &ListOptions::page(1, limit)).await?;
            self.views(page.items, true).await
        };
        self.ctx
            .track(SERVICE, "search", self.ctx.cached(SERVICE, key, self.ctx.search_ttl, load))
            .await
    }

    pub async fn create(&self, new: NewProduct, actor: Option<&str>) -> BauxiteResult<ProductView> {
        self.ctx
            .track(SERVICE, "create", async {
                validate_model(&new)?;
                let mine = self.require_mine(new.mine_id).await?;
                if let Some(message) = self.conflict(&new, None).await? {
                    log_warn!("Rejected duplicate product", mine_id = new.mine_id, name = %new.name);
                    return Err(BauxiteError::duplicate(message));
                }

                let product = self.products.create(new, actor).await?;
                self.invalidate().await;
                log_info!("Product created", product_id = product.id, mine_id = product.mine_id);

                Ok(ProductView {
                    product,
                    mine: Some(MineRef::from(&mine)),
                })
            })
            .await
    }

    pub async fn create_batch(&self, request: ProductBatchCreate, actor: Option<&str>) -> BauxiteResult<Vec<Product>> {
        self.ctx
            .track(SERVICE, "create_batch", async {
                if request.products.is_empty() {
                    return Err(BauxiteError::validation("At least one product is required"));
                }
                check_drafts(&request.products)?;
                self.require_mine(request.mine_id).await?;

                let drafts: Vec<NewProduct> = request
                    .products
                    .into_iter()
                    .map(|draft| draft.for_mine(request.mine_id))
                    .collect();

                let mut errors = Vec::new();
                for (index, new) in drafts.iter().enumerate() {
                    if let Some(message) = self.conflict(new, None).await? {
                        errors.push(format!("Product {}: {}", index + 1, message));
                    }
                }
                if !errors.is_empty() {
                    return Err(BauxiteError::validation_errors(errors));
                }

                let created = self.products.create_batch(drafts, actor).await?;
                self.invalidate().await;
                log_info!("Product batch created", mine_id = request.mine_id, count = created.len());
                Ok(created)
            })
            .await
    }

    pub async fn update(&self, id: i64, changes: Map<String, Value>, actor: Option<&str>) -> BauxiteResult<ProductView> {
        self.ctx
            .track(SERVICE, "update", async {
                let mut product = self.require(id, false).await?;
                let form: NewProduct = merge_changes(&product.form(), &changes)?;
                validate_model(&form)?;
                let mine = self.require_mine(form.mine_id).await?;
                if let Some(message) = self.conflict(&form, Some(id)).await? {
                    return Err(BauxiteError::duplicate(message));
                }

                product.apply(form);
                let product = self.products.update(product, actor).await?;
                self.invalidate().await;
                log_info!("Product updated", product_id = id);

                Ok(ProductView {
                    product,
                    mine: Some(MineRef::from(&mine)),
                })
            })
            .await
    }

    /// Applies several change sets in one transaction. Every item must name
    /// its product `id`; all problems are reported together.
    pub async fn update_batch(&self, request: ProductBatchUpdate, actor: Option<&str>) -> BauxiteResult<Vec<Product>> {
        self.ctx
            .track(SERVICE, "update_batch", async {
                if request.updates.is_empty() {
                    return Err(BauxiteError::validation("At least one update is required"));
                }

                let mut errors = Vec::new();
                let mut staged = Vec::with_capacity(request.updates.len());
                for (index, changes) in request.updates.iter().enumerate() {
                    let prefix = format!("Update {}", index + 1);
                    match self.stage_update(changes).await {
                        Ok(product) => staged.push(product),
                        Err(BauxiteError::Validation { errors: messages }) => {
                            errors.extend(prefixed(&prefix, messages))
                        }
                        Err(e @ BauxiteError::NotFound { .. }) | Err(e @ BauxiteError::Duplicate { .. }) => {
                            errors.extend(prefixed(&prefix, e.messages()))
                        }
                        Err(e) => return Err(e),
                    }
                }

                let ids: Vec<String> = staged.iter().map(|product| product.id.to_string()).collect();
                let ids = find_duplicates(ids.iter().map(String::as_str));
                if !ids.is_empty() {
                    errors.push(format!("Duplicate product ids in batch: {}", ids.join(", ")));
                }
                let mut names_by_mine: BTreeMap<i64, Vec<&str>> = BTreeMap::new();
                for product in &staged {
                    names_by_mine.entry(product.mine_id).or_default().push(product.name.as_str());
                }
                for names in names_by_mine.into_values() {
                    let duplicates = find_duplicates(names);
                    if !duplicates.is_empty() {
                        errors.push(format!("Duplicate product names in batch: {}", duplicates.join(", ")));
                    }
                }
                if !errors.is_empty() {
                    return Err(BauxiteError::validation_errors(errors));
                }

                let updated = self.products.update_batch(staged, actor).await?;
                self.invalidate().await;
                log_info!("Product batch updated", count = updated.len());
                Ok(updated)
            })
            .await
    }

    pub async fn delete(&self, id: i64, permanent: bool, actor: Option<&str>) -> BauxiteResult<()> {
        self.ctx
            .track(SERVICE, "delete", async {
                self.products
                    .delete(id, DeleteMode::from_permanent(permanent), actor)
                    .await?;
                self.invalidate().await;
                log_info!("Product deleted", product_id = id, permanent = permanent);
                Ok(())
            })
            .await
    }

    pub async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<ProductView> {
        self.ctx
            .track(SERVICE, "restore", async {
                let product = self.products.restore(id, actor).await?;
                self.invalidate().await;
                log_info!("Product restored", product_id = id);
                Ok(ProductView { product, mine: None })
            })
            .await
    }

    pub async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let key = format!("{}statistics", CACHE_PREFIX);
        self.ctx
            .track(
                SERVICE,
                "statistics",
                self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), self.products.statistics()),
            )
            .await
    }

    pub fn health(&self) -> Value {
        self.ctx.metrics.snapshot(SERVICE)
    }

    async fn stage_update(&self, changes: &Map<String, Value>) -> BauxiteResult<Product> {
        let id = changes
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| BauxiteError::validation("'id' is required"))?;

        let mut product = self.require(id, false).await?;
        let form: NewProduct = merge_changes(&product.form(), changes)?;
        validate_model(&form)?;
        self.require_mine(form.mine_id).await?;
        if let Some(message) = self.conflict(&form, Some(id)).await? {
            return Err(BauxiteError::duplicate(message));
        }

        product.apply(form);
        Ok(product)
    }

    async fn invalidate(&self) {
        self.ctx.invalidate(CACHE_PREFIX).await;
        // mine views carry product counts
        self.ctx.invalidate("mine:").await;
    }

    async fn require(&self, id: i64, include_deleted: bool) -> BauxiteResult<Product> {
        self.products
            .get(id, include_deleted)
            .await?
            .ok_or_else(|| BauxiteError::not_found(format!("Product {}", id)))
    }

    async fn require_mine(&self, mine_id: i64) -> BauxiteResult<Mine> {
        self.mines
            .get(mine_id, false)
            .await?
            .ok_or_else(|| BauxiteError::not_found(format!("Mine {}", mine_id)))
    }

    /// Friendly message for a name or code already taken, soft-deleted products included.
    async fn conflict(&self, form: &NewProduct, exclude_id: Option<i64>) -> BauxiteResult<Option<String>> {
        if self
            .products
            .exists_by_name(form.mine_id, &form.name, exclude_id)
            .await?
        {
            return Ok(Some(format!(
                "A product named '{}' already exists for mine {}",
                form.name, form.mine_id
            )));
        }
        if let Some(code) = &form.code {
            if self.products.exists_by_code(code, exclude_id).await? {
                return Ok(Some(format!("A product with the code '{}' already exists", code)));
            }
        }
        Ok(None)
    }

    async fn views(&self, products: Vec<Product>, include_mine: bool) -> BauxiteResult<Vec<ProductView>> {
        if !include_mine {
            return Ok(products
                .into_iter()
                .map(|product| ProductView { product, mine: None })
                .collect());
        }

        let mut ids: Vec<i64> = products.iter().map(|product| product.mine_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let mines: HashMap<i64, MineRef> = self
            .mines
            .get_by_ids(&ids, true)
            .await?
            .iter()
            .map(|mine| (mine.id, MineRef::from(mine)))
            .collect();

        Ok(products
            .into_iter()
            .map(|product| ProductView {
                mine: mines.get(&product.mine_id).cloned(),
                product,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, code: Option<&str>) -> ProductDraft {
        ProductDraft {
            name: name.to_string(),
            code: code.map(str::to_string),
            description: None,
        }
    }

    #[test]
    fn test_batch_duplicates_reported() {
        let drafts = vec![
            draft("CBG", Some("A")),
            draft("CBG", Some("A")),
            draft("Fines", None),
        ];
        match check_drafts(&drafts).unwrap_err() {
            BauxiteError::Validation { errors } => {
                assert!(errors.contains(&"Duplicate product names in batch: CBG".to_string()));
                assert!(errors.contains(&"Duplicate product codes in batch: A".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_item_errors_prefixed() {
        let drafts = vec![draft("CBG", None), draft("", None)];
        match check_drafts(&drafts).unwrap_err() {
            BauxiteError::Validation { errors } => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("Product 2: "));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_clean_batch_passes() {
        assert!(check_drafts(&[draft("CBG", Some("A")), draft("Fines", Some("B"))]).is_ok());
    }
}
