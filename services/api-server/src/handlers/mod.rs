//! HTTP handlers. Each one unpacks the request, calls a service and wraps
//! the result in the response envelope.

pub mod auth;
pub mod health;
pub mod mines;
pub mod partners;
pub mod products;
pub mod productions;

use bauxite_models::Page;
use bauxite_utils::{ApiReply, ApiResponse};
use serde::{Deserialize, Serialize};

use crate::auth::Claims;

pub type HandlerResult<T> = Result<ApiReply<T>, bauxite_utils::BauxiteError>;

/// `?permanent=true` turns a delete into a hard delete.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

/// Subject of the verified token, recorded as the audit actor.
pub(crate) fn actor(claims: &Claims) -> Option<&str> {
    Some(claims.sub.as_str())
}

/// Envelope for a page of results with paging details in `metadata`.
pub(crate) fn paged<T: Serialize>(message: &str, page: Page<T>) -> ApiReply<Vec<T>> {
    let metadata = page.metadata();
    ApiReply::ok(ApiResponse::ok(message, page.items).with_metadata(metadata))
}

pub(crate) fn deleted(resource: &str, permanent: bool) -> ApiReply<()> {
    let how = if permanent { "permanently deleted" } else { "deleted" };
    ApiReply::ok(ApiResponse::done(format!("{} {} successfully", resource, how)))
}
