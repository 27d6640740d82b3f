use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::{auth, mines, partners, productions, products};
use crate::middleware::auth_middleware;
use crate::AppState;

/// Routes under `/api`. Everything except login needs a Bearer token.
pub fn create_api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .merge(mine_routes())
        .merge(product_routes())
        .merge(partner_routes())
        .merge(production_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/auth/login", post(auth::login))
        .merge(protected)
}

fn mine_routes() -> Router<AppState> {
    Router::new()
        .route("/mines", get(mines::list_mines).post(mines::create_mine))
        .route("/mines/with-products", post(mines::create_mine_with_products))
        .route("/mines/search", get(mines::search_mines))
        .route("/mines/country/:country", get(mines::mines_by_country))
        .route("/mines/statistics", get(mines::mine_statistics))
        .route("/mines/health", get(mines::mine_health))
        .route(
            "/mines/:id",
            get(mines::get_mine)
                .put(mines::update_mine)
                .patch(mines::update_mine)
                .delete(mines::delete_mine),
        )
        .route("/mines/:id/restore", post(mines::restore_mine))
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::list_products).post(products::create_product))
        .route(
            "/products/batch",
            post(products::create_products).patch(products::update_products),
        )
        .route("/products/search", get(products::search_products))
        .route("/products/statistics", get(products::product_statistics))
        .route("/products/health", get(products::product_health))
        .route("/products/mine/:mine_id", get(products::products_for_mine))
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .patch(products::update_product)
                .delete(products::delete_product),
        )
        .route("/products/:id/restore", post(products::restore_product))
}

fn partner_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/partner-entities",
            get(partners::list_entities).post(partners::create_entity),
        )
        .route("/partner-entities/statistics", get(partners::entity_statistics))
        .route(
            "/partner-entities/:id",
            get(partners::get_entity)
                .put(partners::update_entity)
                .patch(partners::update_entity)
                .delete(partners::delete_entity),
        )
        .route("/partner-entities/:id/restore", post(partners::restore_entity))
        .route("/partners", get(partners::list_partners).post(partners::create_partner))
        .route("/partners/statistics", get(partners::partner_statistics))
        .route("/partners/health", get(partners::partner_health))
        .route(
            "/partners/:id",
            get(partners::get_partner)
                .put(partners::update_partner)
                .patch(partners::update_partner)
                .delete(partners::delete_partner),
        )
        .route("/partners/:id/restore", post(partners::restore_partner))
}

fn production_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/productions",
            get(productions::list_productions).post(productions::create_production),
        )
        .route("/productions/active", get(productions::active_production))
        .route("/productions/finalized", get(productions::finalized_productions))
        .route("/productions/statistics", get(productions::production_statistics))
        .route("/productions/health", get(productions::production_health))
        .route(
            "/productions/:id",
            get(productions::get_production)
                .put(productions::update_production)
                .patch(productions::update_production)
                .delete(productions::delete_production),
        )
        .route("/productions/:id/restore", post(productions::restore_production))
        .route("/productions/:id/status", post(productions::change_status))
        .route("/productions/:id/versions", post(productions::create_version))
        .route("/productions/:id/summary", get(productions::production_summary))
        .route("/productions/:id/partners", get(productions::production_partners))
        .route(
            "/productions/:id/enrollments",
            get(productions::list_enrollments).post(productions::add_enrollment),
        )
        .route(
            "/productions/:id/enrollments/:enrollment_id",
            get(productions::get_enrollment)
                .patch(productions::update_enrollment)
                .delete(productions::delete_enrollment),
        )
}
