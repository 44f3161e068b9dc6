use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn referral_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_referral).get(handlers::list_referrals))
        .route("/pending", get(handlers::pending_referrals))
        .route("/{referral_id}", get(handlers::get_referral))
        .route("/{referral_id}/accept", post(handlers::accept_referral))
        .route("/{referral_id}/decline", post(handlers::decline_referral))
        .route("/{referral_id}/assign", post(handlers::assign_referral))
        .route("/{referral_id}/schedule", post(handlers::schedule_referral))
        .route("/{referral_id}/start", post(handlers::start_referral))
        .route("/{referral_id}/complete", post(handlers::complete_referral))
        .route("/{referral_id}/cancel", post(handlers::cancel_referral))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
