//! AWX REST API client

pub mod associations;
pub mod client;
pub mod common;
pub mod error;
pub mod jobs;
pub mod objects;
pub mod pool;
pub mod settings;

pub use client::{Auth, Client, RetryConfig};
pub use common::ApiQueryParams;
pub use error::ApiError;
