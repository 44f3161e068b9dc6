pub mod referral;
pub mod routing;
