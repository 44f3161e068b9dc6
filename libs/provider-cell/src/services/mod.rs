pub mod availability;
pub mod profile;
