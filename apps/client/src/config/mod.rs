pub mod client;
pub mod env;

pub use client::ClientConfig;
