pub mod api;
pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod infrastructure;

pub use crate::core::errors::ExpenseError;
pub use crate::core::services::{ExpenseService, ServiceSettings};

#[cfg(test)]
mod tests; // Include integration tests
