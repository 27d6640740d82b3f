use axum::{extract::State, Extension};
use bauxite_models::{
    CreateProductionRequest, EnrollmentView, EntityStatistics, ListParams, NewEnrollment,
    NewVersionRequest, ProductionFilter, ProductionView, StatusChange,
};
use bauxite_utils::{ApiReply, ApiResponse};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{actor, deleted, paged, DeleteParams, HandlerResult};
use crate::auth::Claims;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::ProductionSummary;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProductionFlags {
    #[serde(default)]
    pub include_enrollments: bool,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct YearParams {
    pub year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CutoffParams {
    pub up_to_year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartnerParams {
    pub halco_buyer: Option<bool>,
}

pub async fn list_productions(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<ProductionFilter>,
) -> HandlerResult<Vec<ProductionView>> {
    let page = state.productions.list(&filter, &params.into()).await?;
    Ok(paged("Productions retrieved successfully", page))
}

pub async fn get_production(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(flags): ApiQuery<ProductionFlags>,
) -> HandlerResult<ProductionView> {
    let production = state
        .productions
        .get(id, flags.include_enrollments, flags.include_deleted)
        .await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Production retrieved successfully",
        production,
    )))
}

pub async fn active_production(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<YearParams>,
) -> HandlerResult<ProductionView> {
    let production = state.productions.active(params.year).await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Active production retrieved successfully",
        production,
    )))
}

pub async fn finalized_productions(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<CutoffParams>,
) -> HandlerResult<Vec<ProductionView>> {
    let productions = state.productions.finalized(params.up_to_year).await?;
    let message = format!("Found {} finalized productions", productions.len());
    Ok(ApiReply::ok(ApiResponse::ok(message, productions)))
}

pub async fn production_statistics(State(state): State<AppState>) -> HandlerResult<EntityStatistics> {
    let statistics = state.productions.statistics().await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Production statistics retrieved successfully",
        statistics,
    )))
}

pub async fn production_health(State(state): State<AppState>) -> HandlerResult<Value> {
    Ok(ApiReply::ok(ApiResponse::ok(
        "Production service is healthy",
        state.productions.health(),
    )))
}

pub async fn create_production(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<CreateProductionRequest>,
) -> HandlerResult<ProductionView> {
    let production = state.productions.create(request, actor(&claims)).await?;
    Ok(ApiReply::created(ApiResponse::ok(
        "Production created successfully",
        production,
    )))
}

pub async fn update_production(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(changes): ApiJson<Map<String, Value>>,
) -> HandlerResult<ProductionView> {
    let production = state
        .productions
        .update(id, changes, actor(&claims))
        .await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Production updated successfully",
        production,
    )))
}

pub async fn change_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(change): ApiJson<StatusChange>,
) -> HandlerResult<ProductionView> {
    let production = state
        .productions
        .set_status(id, change, actor(&claims))
        .await?;
    let message = format!("Production status changed to {}", production.production.status);
    Ok(ApiReply::ok(ApiResponse::ok(message, production)))
}

pub async fn create_version(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<NewVersionRequest>>,
) -> HandlerResult<ProductionView> {
    let request = body.map(|ApiJson(request)| request).unwrap_or_default();
    let production = state
        .productions
        .new_version(id, request, actor(&claims))
        .await?;
    let message = format!("Version {} created successfully", production.production.version);
    Ok(ApiReply::created(ApiResponse::ok(message, production)))
}

pub async fn delete_production(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> HandlerResult<()> {
    state
        .productions
        .delete(id, params.permanent, actor(&claims))
        .await?;
    Ok(deleted("Production", params.permanent))
}

pub async fn restore_production(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> HandlerResult<ProductionView> {
    let production = state.productions.restore(id, actor(&claims)).await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Production restored successfully",
        production,
    )))
}

pub async fn production_summary(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> HandlerResult<ProductionSummary> {
    let summary = state.productions.summary(id).await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Production summary retrieved successfully",
        summary,
    )))
}

pub async fn production_partners(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<PartnerParams>,
) -> HandlerResult<Vec<EnrollmentView>> {
    let partners = state.productions.partners(id, params.halco_buyer).await?;
    let message = format!("Found {} enrolled partners", partners.len());
    Ok(ApiReply::ok(ApiResponse::ok(message, partners)))
}

pub async fn list_enrollments(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> HandlerResult<Vec<EnrollmentView>> {
    let enrollments = state.productions.list_enrollments(id).await?;
    let message = format!("Found {} enrollments", enrollments.len());
    Ok(ApiReply::ok(ApiResponse::ok(message, enrollments)))
}

pub async fn add_enrollment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(new): ApiJson<NewEnrollment>,
) -> HandlerResult<EnrollmentView> {
    let enrollment = state.productions.add_enrollment(id, new).await?;
    Ok(ApiReply::created(ApiResponse::ok(
        "Enrollment created successfully",
        enrollment,
    )))
}

pub async fn get_enrollment(
    State(state): State<AppState>,
    ApiPath((id, enrollment_id)): ApiPath<(i64, i64)>,
) -> HandlerResult<EnrollmentView> {
    let enrollment = state.productions.get_enrollment(id, enrollment_id).await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Enrollment retrieved successfully",
        enrollment,
    )))
}

pub async fn update_enrollment(
    State(state): State<AppState>,
    ApiPath((id, enrollment_id)): ApiPath<(i64, i64)>,
    ApiJson(changes): ApiJson<Map<String, Value>>,
) -> HandlerResult<EnrollmentView> {
    let enrollment = state
        .productions
        .update_enrollment(id, enrollment_id, changes)
        .await?;
    Ok(ApiReply::ok(ApiResponse::ok(
        "Enrollment updated successfully",
        enrollment,
    )))
}

pub async fn delete_enrollment(
    State(state): State<AppState>,
    ApiPath((id, enrollment_id)): ApiPath<(i64, i64)>,
) -> HandlerResult<()> {
    state.productions.delete_enrollment(id, enrollment_id).await?;
    Ok(ApiReply::ok(ApiResponse::done("Enrollment deleted successfully")))
}
