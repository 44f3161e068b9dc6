use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use admin_cell::router::admin_routes;
use appointment_cell::router::appointment_routes;
use auth_cell::router::auth_routes;
use notification_cell::router::notification_routes;
use pet_cell::router::pet_routes;
use provider_cell::router::provider_routes;
use referral_cell::router::referral_routes;
use shared_config::AppConfig;
use verification_cell::router::verification_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "PawRoute API is running!" }))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/pets", pet_routes(state.clone()))
        .nest("/providers", provider_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/referrals", referral_routes(state.clone()))
        .nest("/verifications", verification_routes(state.clone()))
        .nest("/admin", admin_routes(state.clone()))
        .nest("/notifications", notification_routes(state))
}
