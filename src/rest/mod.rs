// ABOUTME: REST adapters for the query engine and the durable document backend
// ABOUTME: One HTTP client serves both roles for a configured query service

pub mod client;
pub mod models;

pub use client::RestClient;
pub use models::RowsResponse;
