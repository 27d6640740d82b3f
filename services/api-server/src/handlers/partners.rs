use axum::{extract::State, Extension};
use bauxite_models::{
    EntityStatistics, ListParams, NewPartner, NewPartnerEntity, PartnerEntityFilter, PartnerEntityView,
    PartnerFilter, PartnerView,
};
use bauxite_utils::{ApiReply, ApiResponse};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{actor, deleted, paged, DeleteParams, HandlerResult};
use crate::auth::Claims;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EntityFlags {
    #[serde(default)]
    pub include_partners: bool,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartnerFlags {
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn list_entities(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<PartnerEntityFilter>,
    ApiQuery(flags): ApiQuery<EntityFlags>,
) -> HandlerResult<Vec<PartnerEntityView>> {
    let page = state
        .partners
        .list_entities(&filter, &params.into(), flags.include_partners)
        .await?;
    Ok(paged("Partner entities retrieved successfully", page))
}

pub async fn get_entity(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(flags): ApiQuery<EntityFlags>,
) -> HandlerResult<PartnerEntityView> {
    let entity = state
        .partners
        .get_entity(id, flags.include_partners, flags.include_deleted)
        .await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Partner entity retrieved successfully",
        entity,
    )))
}

pub async fn entity_statistics(State(state): State<AppState>) -> HandlerResult<EntityStatistics> {
    let statistics = state.partners.entity_statistics().await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Partner entity statistics retrieved successfully",
        statistics,
    )))
}

pub async fn create_entity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(new): ApiJson<NewPartnerEntity>,
) -> HandlerResult<PartnerEntityView> {
    let entity = state.partners.create_entity(new, actor(&claims)).await?;
    Ok(ApiReply::created(ApiResponse::ok(
        "Partner entity created successfully",
        entity,
    )))
}

pub async fn update_entity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(changes): ApiJson<Map<String, Value>>,
) -> HandlerResult<PartnerEntityView> {
    let entity = state
        .partners
        .update_entity(id, changes, actor(&claims))
        .await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Partner entity updated successfully",
        entity,
    )))
}

pub async fn delete_entity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> HandlerResult<()> {
    state
        .partners
        .delete_entity(id, params.permanent, actor(&claims))
        .await?;
    Ok(deleted("Partner entity", params.permanent))
}

pub async fn restore_entity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> HandlerResult<PartnerEntityView> {
    let entity = state.partners.restore_entity(id, actor(&claims)).await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Partner entity restored successfully",
        entity,
    )))
}

pub async fn list_partners(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<PartnerFilter>,
) -> HandlerResult<Vec<PartnerView>> {
    let page = state.partners.list_partners(&filter, &params.into()).await?;
    Ok(paged("Partners retrieved successfully", page))
}

pub async fn get_partner(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(flags): ApiQuery<PartnerFlags>,
) -> HandlerResult<PartnerView> {
    let partner = state.partners.get_partner(id, flags.include_deleted).await?;
    Ok(ApiReply::ok(ApiResponse::ok("Partner retrieved successfully", partner)))
}

pub async fn partner_statistics(State(state): State<AppState>) -> HandlerResult<EntityStatistics> {
    let statistics = state.partners.partner_statistics().await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Partner statistics retrieved successfully",
        statistics,
    )))
}

pub async fn partner_health(State(state): State<AppState>) -> HandlerResult<Value> {
    Ok(ApiReply::ok(ApiResponse::ok(
        "Partner service is healthy",
        state.partners.health(),
    )))
}

pub async fn create_partner(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(new): ApiJson<NewPartner>,
) -> HandlerResult<PartnerView> {
    let partner = state.partners.create_partner(new, actor(&claims)).await?;
    Ok(ApiReply::created(ApiResponse::ok("Partner created successfully", partner)))
}

pub async fn update_partner(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(changes): ApiJson<Map<String, Value>>,
) -> HandlerResult<PartnerView> {
    let partner = state
        .partners
        .update_partner(id, changes, actor(&claims))
        .await?;
    Ok(ApiReply::ok(ApiResponse::ok("Partner updated successfully", partner)))
}

pub async fn delete_partner(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> HandlerResult<()> {
    state
        .partners
        .delete_partner(id, params.permanent, actor(&claims))
        .await?;
    Ok(deleted("Partner", params.permanent))
}

pub async fn restore_partner(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> HandlerResult<PartnerView> {
    let partner = state.partners.restore_partner(id, actor(&claims)).await?;
    Ok(ApiReply::ok(ApiResponse::ok("Partner restored successfully", partner)))
}
