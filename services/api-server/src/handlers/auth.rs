use axum::{extract::rejection::JsonRejection, extract::State, Json};
use bauxite_utils::{log_info, log_warn, ApiReply, ApiResponse, BauxiteError};
use serde::{Deserialize, Serialize};

use super::HandlerResult;
use crate::auth::credentials_match;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> HandlerResult<TokenResponse> {
    let Json(request) = body.map_err(|rejection| BauxiteError::validation(rejection.body_text()))?;

    let username = request.username.as_deref().map(str::trim).unwrap_or_default();
    let password = request.password.as_deref().unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(BauxiteError::validation("Username and password are required"));
    }

    if !credentials_match(&state.config.auth, username, password) {
        log_warn!("Rejected login", username = %username);
        return Err(BauxiteError::authentication("Invalid credentials"));
    }

    let token = TokenResponse {
        access_token: state.jwt.issue(username)?,
        token_type: "Bearer",
        expires_in: state.jwt.expires_in_seconds(),
    };
    log_info!("User logged in", username = %username);

    Ok(ApiReply::ok(ApiResponse::ok("Login successful", token)))
}
