use crate::core::errors::ExpenseError;
use crate::core::models::{Category, Expense, ExpenseAudit, ExpenseFilter, ExpenseStatus, Program, User};
use async_trait::async_trait;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_user_if_not_exists(&self, user: User) -> Result<Option<User>, ExpenseError>;
    async fn save_user(&self, user: User) -> Result<(), ExpenseError>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, ExpenseError>;
    async fn list_users(&self) -> Result<Vec<User>, ExpenseError>;

    async fn save_program(&self, program: Program) -> Result<(), ExpenseError>;
    async fn get_program(&self, program_id: &str) -> Result<Option<Program>, ExpenseError>;
    async fn list_programs(&self) -> Result<Vec<Program>, ExpenseError>;

    async fn save_category(&self, category: Category) -> Result<(), ExpenseError>;
    async fn get_categories(&self, program_id: &str) -> Result<Vec<Category>, ExpenseError>;

    async fn save_expense(&self, expense: Expense) -> Result<(), ExpenseError>;
    /// Overwrites the stored expense only if it still carries `expense.version`.
    /// Returns the stored record with its new version, or `None` when another write got there first.
    async fn replace_expense(&self, expense: Expense) -> Result<Option<Expense>, ExpenseError>;
    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, ExpenseError>;
    async fn delete_expense(&self, expense_id: &str) -> Result<bool, ExpenseError>;
    /// Matching expenses in the filter's sort order.
    async fn query_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>, ExpenseError>;
    async fn get_program_expenses(&self, program_id: &str) -> Result<Vec<Expense>, ExpenseError>;
    /// Atomically moves the expense to `to` only if it currently holds `from`.
    async fn update_status_if(
        &self,
        expense_id: &str,
        from: ExpenseStatus,
        to: ExpenseStatus,
    ) -> Result<bool, ExpenseError>;

    async fn save_expense_audit(&self, audit: ExpenseAudit) -> Result<(), ExpenseError>;
    async fn get_expense_audits(&self, expense_id: &str) -> Result<Vec<ExpenseAudit>, ExpenseError>;
}

pub mod in_memory;
