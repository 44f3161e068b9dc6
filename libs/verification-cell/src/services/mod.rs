pub mod annotations;
pub mod review;
pub mod scoring;
pub mod sla;
pub mod submission;
