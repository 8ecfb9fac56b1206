pub mod cache_keys;
pub mod in_memory;

use crate::core::budget::BudgetSummary;
use crate::core::errors::ExpenseError;
use crate::core::models::Category;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_categories(&self, program_id: &str) -> Result<Option<Vec<Category>>, ExpenseError>;
    async fn save_categories(
        &self,
        program_id: &str,
        categories: &[Category],
        ttl: Duration,
    ) -> Result<(), ExpenseError>;
    async fn invalidate_categories(&self, program_id: &str) -> Result<(), ExpenseError>;

    async fn get_budget_summary(&self, program_id: &str) -> Result<Option<BudgetSummary>, ExpenseError>;
    async fn save_budget_summary(&self, summary: &BudgetSummary, ttl: Duration) -> Result<(), ExpenseError>;
    async fn invalidate_budget_summary(&self, program_id: &str) -> Result<(), ExpenseError>;
}
