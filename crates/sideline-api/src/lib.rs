pub mod client;
pub mod mock;

pub use client::{ApiConfig, HttpApi};
pub use mock::MockApi;
