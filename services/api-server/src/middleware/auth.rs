use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use bauxite_utils::BauxiteError;

use crate::auth::bearer_token;
use crate::AppState;

/// Rejects requests without a valid Bearer token and makes the verified
/// [`crate::auth::Claims`] available as a request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, BauxiteError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| BauxiteError::authentication("Missing authorization header"))?
        .to_str()
        .map_err(|_| BauxiteError::authentication("Invalid authorization header format"))?;

    let claims = state.jwt.verify(bearer_token(header)?)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
