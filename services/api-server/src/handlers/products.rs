use axum::{extract::State, Extension};
use bauxite_models::{
    EntityStatistics, ListParams, NewProduct, Product, ProductBatchCreate, ProductBatchUpdate,
    ProductFilter, ProductView,
};
use bauxite_utils::{ApiReply, ApiResponse};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{actor, deleted, paged, DeleteParams, HandlerResult, SearchParams};
use crate::auth::Claims;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProductFlags {
    #[serde(default)]
    pub include_mine: bool,
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<ProductFilter>,
    ApiQuery(flags): ApiQuery<ProductFlags>,
) -> HandlerResult<Vec<ProductView>> {
    let page = state
        .products
        .list(&filter, &params.into(), flags.include_mine)
        .await?;
    Ok(paged("Products retrieved successfully", page))
}

pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(flags): ApiQuery<ProductFlags>,
) -> HandlerResult<ProductView> {
    let product = state
        .products
        .get(id, flags.include_mine, flags.include_deleted)
        .await?;
    Ok(ApiReply::ok(ApiResponse::ok("Product retrieved successfully", product)))
}

pub async fn products_for_mine(
    State(state): State<AppState>,
    ApiPath(mine_id): ApiPath<i64>,
) -> HandlerResult<Vec<Product>> {
    let products = state.products.for_mine(mine_id).await?;
    let message = format!("Found {} products for mine {}", products.len(), mine_id);
    Ok(ApiReply::ok(ApiResponse::ok(message, products)))
}

pub async fn search_products(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> HandlerResult<Vec<ProductView>> {
    let products = state
        .products
        .search(params.q.as_deref(), params.limit)
        .await?;
    let message = format!("Found {} products", products.len());
    Ok(ApiReply::ok(ApiResponse::ok(message, products)))
}

pub async fn product_statistics(State(state): State<AppState>) -> HandlerResult<EntityStatistics> {
    let statistics = state.products.statistics().await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Product statistics retrieved successfully",
        statistics,
    )))
}

pub async fn product_health(State(state): State<AppState>) -> HandlerResult<Value> {
    Ok(ApiReply::ok(ApiResponse::ok(
        "Product service is healthy",
        state.products.health(),
    )))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(new): ApiJson<NewProduct>,
) -> HandlerResult<ProductView> {
    let product = state.products.create(new, actor(&claims)).await?;
    Ok(ApiReply::created(ApiResponse::ok("Product created successfully", product)))
}

pub async fn create_products(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<ProductBatchCreate>,
) -> HandlerResult<Vec<Product>> {
    let products = state
        .products
        .create_batch(request, actor(&claims))
        .await?;
    let message = format!("{} products created successfully", products.len());
    Ok(ApiReply::created(ApiResponse::ok(message, products)))
}

pub async fn update_products(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<ProductBatchUpdate>,
) -> HandlerResult<Vec<Product>> {
    let products = state
        .products
        .update_batch(request, actor(&claims))
        .await?;
    let message = format!("{} products updated successfully", products.len());
    Ok(ApiReply::ok(ApiResponse::ok(message, products)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(changes): ApiJson<Map<String, Value>>,
) -> HandlerResult<ProductView> {
    let product = state.products.update(id, changes, actor(&claims)).await?;
    Ok(ApiReply::ok(ApiResponse::ok("Product updated successfully", product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> HandlerResult<()> {
    state
        .products
        .delete(id, params.permanent, actor(&claims))
        .await?;
    Ok(deleted("Product", params.permanent))
}

pub async fn restore_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> HandlerResult<ProductView> {
    let product = state.products.restore(id, actor(&claims)).await?;
    Ok(ApiReply::ok(ApiResponse::ok("Product restored successfully", product)))
}
