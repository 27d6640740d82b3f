use axum::{extract::State, Extension};
use bauxite_models::{CreateMineRequest, ListParams, MineFilter, MineView, MineWithProductsRequest};
use bauxite_utils::{ApiReply, ApiResponse};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{actor, deleted, paged, DeleteParams, HandlerResult, SearchParams};
use crate::auth::Claims;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::MineStatistics;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MineFlags {
    #[serde(default)]
    pub include_products: bool,
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn list_mines(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<MineFilter>,
    ApiQuery(flags): ApiQuery<MineFlags>,
) -> HandlerResult<Vec<MineView>> {
    let page = state
        .mines
        .list(&filter, &params.into(), flags.include_products)
        .await?;
    Ok(paged("Mines retrieved successfully", page))
}

pub async fn get_mine(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(flags): ApiQuery<MineFlags>,
) -> HandlerResult<MineView> {
    let mine = state
        .mines
        .get(id, flags.include_products, flags.include_deleted)
        .await?;
    Ok(ApiReply::ok(ApiResponse::ok("Mine retrieved successfully", mine)))
}

pub async fn search_mines(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> HandlerResult<Vec<MineView>> {
    let mines = state.mines.search(params.q.as_deref(), params.limit).await?;
    let message = format!("Found {} mines", mines.len());
    Ok(ApiReply::ok(ApiResponse::ok(message, mines)))
}

pub async fn mines_by_country(
    State(state): State<AppState>,
    ApiPath(country): ApiPath<String>,
) -> HandlerResult<Vec<MineView>> {
    let mines = state.mines.by_country(&country).await?;
    let message = format!("Found {} mines in {}", mines.len(), country.trim());
    Ok(ApiReply::ok(ApiResponse::ok(message, mines)))
}

pub async fn mine_statistics(State(state): State<AppState>) -> HandlerResult<MineStatistics> {
    let statistics = state.mines.statistics().await?;
    Ok(ApiReply::ok(ApiResponse::ok("Mine statistics retrieved successfully", statistics)))
}

pub async fn mine_health(State(state): State<AppState>) -> HandlerResult<Value> {
    Ok(ApiReply::ok(ApiResponse::ok("Mine service is healthy", state.mines.health())))
}

pub async fn create_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<CreateMineRequest>,
) -> HandlerResult<MineView> {
    let mine = state.mines.create(request, actor(&claims)).await?;
    Ok(ApiReply::created(ApiResponse::ok("Mine created successfully", mine)))
}

pub async fn create_mine_with_products(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<MineWithProductsRequest>,
) -> HandlerResult<MineView> {
    let mine = state
        .mines
        .create_with_products(request, actor(&claims))
        .await?;
    Ok(ApiReply::created(ApiResponse::ok(
        "Mine and products created successfully",
        mine,
    )))
}

pub async fn update_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(changes): ApiJson<Map<String, Value>>,
) -> HandlerResult<MineView> {
    let mine = state.mines.update(id, changes, actor(&claims)).await?;
    Ok(ApiReply::ok(ApiResponse::ok("Mine updated successfully", mine)))
}

pub async fn delete_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> HandlerResult<()> {
    state
        .mines
        .delete(id, params.permanent, actor(&claims))
        .await?;
    Ok(deleted("Mine", params.permanent))
}

pub async fn restore_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> HandlerResult<MineView> {
    let mine = state.mines.restore(id, actor(&claims)).await?;
    Ok(ApiReply::ok(ApiResponse::ok("Mine restored successfully", mine)))
}
