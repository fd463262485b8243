pub mod api;
pub mod claims;
pub mod token;
