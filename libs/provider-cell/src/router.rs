use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn provider_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_profile))
        .route("/search", get(handlers::search_providers))
        .route("/{provider_id}", get(handlers::get_profile))
        .route("/{provider_id}", put(handlers::update_profile))
        .route("/{provider_id}/availability", post(handlers::create_availability))
        .route("/{provider_id}/availability", get(handlers::list_availability))
        .route(
            "/{provider_id}/availability/{rule_id}",
            put(handlers::update_availability),
        )
        .route(
            "/{provider_id}/availability/{rule_id}",
            delete(handlers::delete_availability),
        )
        .route("/{provider_id}/overrides", post(handlers::create_override))
        .route("/{provider_id}/overrides", get(handlers::list_overrides))
        .route("/{provider_id}/slots", get(handlers::get_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
