use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn verification_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::submit_verification))
        .route("/providers/{provider_id}", get(handlers::provider_requests))
        // Admin review surface
        .route("/queue", get(handlers::review_queue))
        .route("/{request_id}", get(handlers::request_detail))
        .route("/{request_id}/approve", post(handlers::approve_request))
        .route("/{request_id}/reject", post(handlers::reject_request))
        // Document annotations
        .route(
            "/documents/{document_id}/annotations",
            post(handlers::create_annotation).get(handlers::list_annotations),
        )
        .route(
            "/documents/{document_id}/annotations/{annotation_id}",
            put(handlers::update_annotation).delete(handlers::delete_annotation),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
