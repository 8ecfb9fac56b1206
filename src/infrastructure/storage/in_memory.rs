use crate::core::errors::ExpenseError;
use crate::core::models::{Category, Expense, ExpenseAudit, ExpenseFilter, ExpenseStatus, Program, User};
use crate::infrastructure::storage::Storage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    users: Arc<RwLock<HashMap<String, User>>>,
    users_by_email: Arc<RwLock<HashMap<String, String>>>,
    programs: Arc<RwLock<HashMap<String, Program>>>,
    categories: Arc<RwLock<HashMap<String, Vec<Category>>>>,
    expenses: Arc<RwLock<HashMap<String, Expense>>>,
    expense_audits: Arc<RwLock<HashMap<String, Vec<ExpenseAudit>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user_if_not_exists(&self, user: User) -> Result<Option<User>, ExpenseError> {
        let email = user.email.to_lowercase();
        let mut users_by_email = self.users_by_email.write().await;
        if users_by_email.contains_key(&email) {
            return Ok(None);
        }
        users_by_email.insert(email, user.id.clone());
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(Some(user))
    }

    async fn save_user(&self, user: User) -> Result<(), ExpenseError> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(ExpenseError::UserNotFound(user.id));
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, ExpenseError> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, ExpenseError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn save_program(&self, program: Program) -> Result<(), ExpenseError> {
        self.programs.write().await.insert(program.id.clone(), program);
        Ok(())
    }

    async fn get_program(&self, program_id: &str) -> Result<Option<Program>, ExpenseError> {
        Ok(self.programs.read().await.get(program_id).cloned())
    }

    async fn list_programs(&self) -> Result<Vec<Program>, ExpenseError> {
        let mut programs: Vec<Program> = self.programs.read().await.values().cloned().collect();
        programs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(programs)
    }

    async fn save_category(&self, category: Category) -> Result<(), ExpenseError> {
        let mut categories = self.categories.write().await;
        let program_categories = categories.entry(category.program_id.clone()).or_default();
        program_categories.retain(|c| c.id != category.id);
        program_categories.push(category);
        Ok(())
    }

    async fn get_categories(&self, program_id: &str) -> Result<Vec<Category>, ExpenseError> {
        Ok(self
            .categories
            .read()
            .await
            .get(program_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_expense(&self, expense: Expense) -> Result<(), ExpenseError> {
        self.expenses.write().await.insert(expense.id.clone(), expense);
        Ok(())
    }

    async fn replace_expense(&self, mut expense: Expense) -> Result<Option<Expense>, ExpenseError> {
        let mut expenses = self.expenses.write().await;
        let stored = expenses
            .get_mut(&expense.id)
            .ok_or_else(|| ExpenseError::ExpenseNotFound(expense.id.clone()))?;
        if stored.version != expense.version {
            return Ok(None);
        }
        expense.version += 1;
        *stored = expense.clone();
        Ok(Some(expense))
    }

    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, ExpenseError> {
        Ok(self.expenses.read().await.get(expense_id).cloned())
    }

    async fn delete_expense(&self, expense_id: &str) -> Result<bool, ExpenseError> {
        Ok(self.expenses.write().await.remove(expense_id).is_some())
    }

    async fn query_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>, ExpenseError> {
        let mut matching: Vec<Expense> = self
            .expenses
            .read()
            .await
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        filter.sort(&mut matching);
        Ok(matching)
    }

    async fn get_program_expenses(&self, program_id: &str) -> Result<Vec<Expense>, ExpenseError> {
        Ok(self
            .expenses
            .read()
            .await
            .values()
            .filter(|e| e.program_id == program_id)
            .cloned()
            .collect())
    }

    async fn update_status_if(
        &self,
        expense_id: &str,
        from: ExpenseStatus,
        to: ExpenseStatus,
    ) -> Result<bool, ExpenseError> {
        let mut expenses = self.expenses.write().await;
        let expense = expenses
            .get_mut(expense_id)
            .ok_or_else(|| ExpenseError::ExpenseNotFound(expense_id.to_string()))?;
        if expense.status != from {
            return Ok(false);
        }
        expense.status = to;
        expense.version += 1;
        Ok(true)
    }

    async fn save_expense_audit(&self, audit: ExpenseAudit) -> Result<(), ExpenseError> {
        self.expense_audits
            .write()
            .await
            .entry(audit.expense_id.clone())
            .or_default()
            .push(audit);
        Ok(())
    }

    async fn get_expense_audits(&self, expense_id: &str) -> Result<Vec<ExpenseAudit>, ExpenseError> {
        Ok(self
            .expense_audits
            .read()
            .await
            .get(expense_id)
            .cloned()
            .unwrap_or_default())
    }
}
