pub mod analytics;
pub mod anomaly;
pub mod moderation;
