use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn admin_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        // Moderation
        .route("/users/{user_id}/suspend", post(handlers::suspend_user))
        .route("/users/{user_id}/reinstate", post(handlers::reinstate_user))
        .route("/users/{user_id}/moderation", get(handlers::moderation_history))
        // Analytics dashboard
        .route("/analytics/appointments-per-day", get(handlers::appointments_per_day))
        .route("/analytics/bookings", get(handlers::bookings_breakdown))
        .route("/analytics/verification-throughput", get(handlers::verification_throughput))
        .route("/analytics/referral-funnel", get(handlers::referral_funnel))
        .route("/analytics/top-providers", get(handlers::top_providers))
        // Anomaly detection
        .route("/analytics/anomalies", get(handlers::booking_anomalies))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
