use crate::auth::jwt::{Claims, JwtService};
use crate::config::Config;
use crate::constants::{
    BUDGET_CACHE_TTL_SECS, CATEGORY_CACHE_TTL_SECS, CATEGORY_CREATED, DEFAULT_PAGE_SIZE, DOWNLOAD_SENT,
    EXPENSE_CREATED, EXPENSE_DELETED, EXPENSE_UPDATED, FILE_ATTACHED, FILE_DOWNLOADED, MAX_AMOUNT, MAX_PAGE_SIZE,
    MAX_TEXT_LENGTH, PRIORITY_TOGGLED, PROGRAM_ASSIGNED, PROGRAM_CREATED, PROGRAM_UNASSIGNED, PROGRAM_UPDATED,
    STATUS_CHANGED, USER_CREATED,
};
use crate::core::budget::{self, BudgetSummary};
use crate::core::errors::ExpenseError;
use crate::core::lifecycle::{self, ExpenseAction};
use crate::core::models::{
    AppLog, Category, Expense, ExpenseAudit, ExpenseFiles, ExpenseFilter, ExpenseKind, ExpensePage, ExpenseStatus,
    FileRef, FileSlot, Priority, Program, ProgramUpdate, SalaryDetails, User, UserRole,
};
use crate::core::payroll::SalaryInput;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::files::{FileKey, FileStore};
use crate::infrastructure::logging::LoggingService;
use crate::infrastructure::notifier::{DownloadNotice, Notifier};
use crate::infrastructure::storage::Storage;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub jwt_secret: String,
    /// Fraction of the total budget a program may overrun before creation is blocked.
    pub over_budget_margin: Decimal,
    pub max_files_per_slot: usize,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        ServiceSettings {
            jwt_secret: config.jwt_secret.clone(),
            over_budget_margin: config.over_budget_margin_percent / Decimal::ONE_HUNDRED,
            max_files_per_slot: config.max_files_per_slot,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            jwt_secret: "secret".to_string(),
            over_budget_margin: Decimal::ZERO,
            max_files_per_slot: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub program_id: String,
    pub kind: ExpenseKind,
    pub amount: Decimal,
    pub categories: Vec<String>,
    pub priority: Priority,
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub invoice_number: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewSalaryExpense {
    pub program_id: String,
    pub salary: SalaryInput,
    pub categories: Vec<String>,
    pub priority: Priority,
    /// Payee
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct ExpenseUpdate {
    pub amount: Option<Decimal>,
    pub categories: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub invoice_number: Option<String>,
    pub date: Option<NaiveDate>,
    pub rate: Option<Decimal>,
    pub quantity: Option<u32>,
    pub is_gross: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum FileDownload {
    Delivered {
        file: FileRef,
        content: Vec<u8>,
        status_advanced: bool,
    },
    /// Fetching failed; the client should open the raw object URL instead.
    Fallback { url: String },
}

/// Marks one expense as busy until dropped.
pub(crate) struct InFlightGuard<'a> {
    requests: &'a Mutex<HashSet<String>>,
    expense_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.remove(&self.expense_id);
        }
    }
}

pub struct ExpenseService<L: LoggingService, S: Storage, C: Cache, F: FileStore, N: Notifier> {
    storage: S,
    logging: L,
    cache: C,
    files: F,
    notifier: Arc<N>,
    jwt_service: JwtService,
    settings: ServiceSettings,
    in_flight: Mutex<HashSet<String>>,
    /// Per-program invalidation counter for cached budget summaries.
    budget_generations: Mutex<HashMap<String, u64>>,
}

impl<L: LoggingService, S: Storage, C: Cache, F: FileStore, N: Notifier> ExpenseService<L, S, C, F, N> {
    pub fn new(storage: S, logging: L, cache: C, files: F, notifier: N, settings: ServiceSettings) -> Self {
        ExpenseService {
            storage,
            logging,
            cache,
            files,
            notifier: Arc::new(notifier),
            jwt_service: JwtService::new(settings.jwt_secret.clone()),
            settings,
            in_flight: Mutex::new(HashSet::new()),
            budget_generations: Mutex::new(HashMap::new()),
        }
    }

    // AUTHENTICATION

    pub fn validate_token(&self, token: &str) -> Result<Claims, ExpenseError> {
        self.jwt_service.validate_token(token)
    }

    pub fn issue_token(&self, user: &User, ttl_secs: u64) -> Result<String, ExpenseError> {
        self.jwt_service.generate_token(&user.id, &user.role.to_string(), ttl_secs)
    }

    /// Resolves the caller behind a bearer token. The stored record, not the token, decides the role.
    pub async fn authenticate(&self, token: &str) -> Result<User, ExpenseError> {
        let claims = self.validate_token(token)?;
        self.storage
            .get_user(&claims.sub)
            .await?
            .ok_or_else(|| ExpenseError::Unauthenticated(format!("Unknown user {}", claims.sub)))
    }

    // VALIDATION HELPERS

    fn require_admin(&self, user: &User) -> Result<(), ExpenseError> {
        if !user.is_admin() {
            warn!(user_id = %user.id, "admin action refused");
            return Err(ExpenseError::NotAuthorized(user.id.clone()));
        }
        Ok(())
    }

    fn require_staff(&self, user: &User) -> Result<(), ExpenseError> {
        if !user.is_staff() {
            warn!(user_id = %user.id, "staff action refused");
            return Err(ExpenseError::NotAuthorized(user.id.clone()));
        }
        Ok(())
    }

    fn validate_string_input(&self, field: &str, value: &str, max_length: usize) -> Result<(), ExpenseError> {
        if value.trim().is_empty() {
            return Err(ExpenseError::invalid(
                field,
                format!("Invalid {}", field),
                format!("{} cannot be empty", field),
            ));
        }
        if value.chars().count() > max_length {
            return Err(ExpenseError::invalid(
                field,
                format!("{} Too Long", field),
                format!("{} cannot exceed {} characters", field, max_length),
            ));
        }
        if value.chars().any(|c| c.is_control() || "<>{}[]".contains(c)) {
            return Err(ExpenseError::invalid(
                field,
                format!("Invalid {}", field),
                format!("{} contains invalid characters", field),
            ));
        }
        Ok(())
    }

    fn validate_optional_text(&self, field: &str, value: &Option<String>) -> Result<(), ExpenseError> {
        match value {
            Some(v) => self.validate_string_input(field, v, MAX_TEXT_LENGTH),
            None => Ok(()),
        }
    }

    fn validate_amount_input(&self, field: &str, amount: Decimal) -> Result<(), ExpenseError> {
        if amount <= Decimal::ZERO {
            return Err(ExpenseError::invalid(
                field,
                "Invalid Amount",
                "Amount must be greater than 0",
            ));
        }
        if amount > MAX_AMOUNT {
            return Err(ExpenseError::invalid(
                field,
                "Amount Too Large",
                format!("Amount cannot exceed {}", MAX_AMOUNT),
            ));
        }
        if amount.normalize().scale() > 2 {
            return Err(ExpenseError::invalid(
                field,
                "Invalid Amount",
                "Amount cannot have more than 2 decimal places",
            ));
        }
        Ok(())
    }

    fn validate_budget_input(&self, field: &str, value: Decimal) -> Result<(), ExpenseError> {
        if value.is_sign_negative() {
            return Err(ExpenseError::invalid(
                field,
                "Invalid Budget",
                "Budget figures cannot be negative",
            ));
        }
        Ok(())
    }

    fn validate_email(&self, email: &str) -> Result<(), ExpenseError> {
        if !email.contains('@') || !email.contains('.') || email.len() < 5 {
            return Err(ExpenseError::invalid("email", "Invalid Email", format!("{} is not a valid email", email)));
        }
        Ok(())
    }

    /// Categories must be non-empty and defined for the program. Duplicates collapse.
    async fn validate_categories(&self, program_id: &str, categories: &[String]) -> Result<Vec<String>, ExpenseError> {
        if categories.is_empty() {
            return Err(ExpenseError::invalid(
                "categories",
                "Missing Categories",
                "At least one category is required",
            ));
        }
        let known = self.program_categories(program_id).await?;
        let mut validated: Vec<String> = Vec::with_capacity(categories.len());
        for category_id in categories {
            if !known.iter().any(|c| c.id == *category_id) {
                return Err(ExpenseError::UnknownCategory(category_id.clone()));
            }
            if !validated.contains(category_id) {
                validated.push(category_id.clone());
            }
        }
        Ok(validated)
    }

    /// Rejected and closed expenses are frozen. Plain users may only touch their own
    /// expenses before processing starts.
    fn ensure_editable(&self, expense: &Expense, user: &User) -> Result<(), ExpenseError> {
        if expense.status.is_terminal() {
            return Err(ExpenseError::ExpenseLocked(expense.id.clone()));
        }
        if user.is_staff() {
            return Ok(());
        }
        let untouched = matches!(
            expense.status,
            ExpenseStatus::New | ExpenseStatus::PettyCash | ExpenseStatus::Salary
        );
        if expense.user_id != user.id || !untouched {
            return Err(ExpenseError::NotAuthorized(user.id.clone()));
        }
        Ok(())
    }

    pub(crate) fn begin_request(&self, expense_id: &str) -> Result<InFlightGuard<'_>, ExpenseError> {
        let mut requests = self
            .in_flight
            .lock()
            .map_err(|e| ExpenseError::InternalServerError(format!("In-flight registry poisoned: {}", e)))?;
        if !requests.insert(expense_id.to_string()) {
            debug!(expense_id, "duplicate request rejected");
            return Err(ExpenseError::RequestInFlight(expense_id.to_string()));
        }
        Ok(InFlightGuard {
            requests: &self.in_flight,
            expense_id: expense_id.to_string(),
        })
    }

    fn budget_generation(&self, program_id: &str) -> Result<u64, ExpenseError> {
        let generations = self
            .budget_generations
            .lock()
            .map_err(|e| ExpenseError::InternalServerError(format!("Budget generations poisoned: {}", e)))?;
        Ok(generations.get(program_id).copied().unwrap_or(0))
    }

    async fn invalidate_budget(&self, program_id: &str) -> Result<(), ExpenseError> {
        {
            let mut generations = self
                .budget_generations
                .lock()
                .map_err(|e| ExpenseError::InternalServerError(format!("Budget generations poisoned: {}", e)))?;
            *generations.entry(program_id.to_string()).or_insert(0) += 1;
        }
        self.cache.invalidate_budget_summary(program_id).await
    }

    /// Writes back a modified expense unless another write landed since it was read.
    async fn write_back(&self, expense: Expense) -> Result<Expense, ExpenseError> {
        let expense_id = expense.id.clone();
        match self.storage.replace_expense(expense).await? {
            Some(stored) => Ok(stored),
            None => {
                debug!(expense_id = %expense_id, "expense changed concurrently, write refused");
                Err(ExpenseError::RequestInFlight(expense_id))
            }
        }
    }

    async fn log_and_audit(
        &self,
        expense_id: Option<&str>,
        action: &str,
        log_details: serde_json::Value,
        user_id: Option<&str>,
    ) -> Result<(), ExpenseError> {
        self.logging.log_action(action, log_details.clone(), user_id).await?;
        if let Some(eid) = expense_id {
            self.storage
                .save_expense_audit(ExpenseAudit {
                    id: Uuid::new_v4().to_string(),
                    expense_id: eid.to_string(),
                    action: action.to_string(),
                    user_id: user_id.map(String::from),
                    details: serde_json::from_value(log_details).unwrap_or_default(),
                    timestamp: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    // USERS

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, ExpenseError> {
        self.storage.get_user(user_id).await
    }

    /// Seeds the first administrator. Existing records are left untouched.
    pub async fn ensure_admin(&self, id: &str, name: &str, email: &str) -> Result<User, ExpenseError> {
        if let Some(existing) = self.storage.get_user(id).await? {
            return Ok(existing);
        }
        self.validate_email(email)?;
        let admin = User {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role: UserRole::Admin,
            program_ids: Vec::new(),
        };
        let created = self
            .storage
            .create_user_if_not_exists(admin)
            .await?
            .ok_or_else(|| ExpenseError::EmailAlreadyRegistered(email.to_string()))?;
        info!(user_id = %created.id, "bootstrap administrator created");
        self.log_and_audit(None, USER_CREATED, json!({ "user_id": created.id, "role": created.role }), None)
            .await?;
        Ok(created)
    }

    pub async fn create_user(
        &self,
        name: String,
        email: String,
        role: UserRole,
        program_ids: Vec<String>,
        created_by: &User,
    ) -> Result<User, ExpenseError> {
        self.require_admin(created_by)?;
        self.validate_string_input("name", &name, 100)?;
        self.validate_email(&email)?;
        for program_id in &program_ids {
            self.require_program(program_id).await?;
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name,
            email: email.clone(),
            role,
            program_ids,
        };
        let created = self
            .storage
            .create_user_if_not_exists(user)
            .await?
            .ok_or(ExpenseError::EmailAlreadyRegistered(email))?;

        info!(user_id = %created.id, role = %created.role, "user created");
        self.log_and_audit(
            None,
            USER_CREATED,
            json!({ "user_id": created.id, "name": created.name, "email": created.email, "role": created.role }),
            Some(created_by.id.as_str()),
        )
        .await?;
        Ok(created)
    }

    pub async fn list_users(&self, queried_by: &User) -> Result<Vec<User>, ExpenseError> {
        self.require_admin(queried_by)?;
        self.storage.list_users().await
    }

    pub async fn assign_program(&self, user_id: &str, program_id: &str, assigned_by: &User) -> Result<User, ExpenseError> {
        self.require_admin(assigned_by)?;
        self.require_program(program_id).await?;
        let mut user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| ExpenseError::UserNotFound(user_id.to_string()))?;

        if !user.program_ids.iter().any(|p| p == program_id) {
            user.program_ids.push(program_id.to_string());
            self.storage.save_user(user.clone()).await?;
            self.log_and_audit(
                None,
                PROGRAM_ASSIGNED,
                json!({ "user_id": user_id, "program_id": program_id }),
                Some(assigned_by.id.as_str()),
            )
            .await?;
        }
        Ok(user)
    }

    pub async fn unassign_program(
        &self,
        user_id: &str,
        program_id: &str,
        unassigned_by: &User,
    ) -> Result<User, ExpenseError> {
        self.require_admin(unassigned_by)?;
        let mut user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| ExpenseError::UserNotFound(user_id.to_string()))?;

        let before = user.program_ids.len();
        user.program_ids.retain(|p| p != program_id);
        if user.program_ids.len() != before {
            self.storage.save_user(user.clone()).await?;
            self.log_and_audit(
                None,
                PROGRAM_UNASSIGNED,
                json!({ "user_id": user_id, "program_id": program_id }),
                Some(unassigned_by.id.as_str()),
            )
            .await?;
        }
        Ok(user)
    }

    // PROGRAMS

    async fn require_program(&self, program_id: &str) -> Result<Program, ExpenseError> {
        self.storage
            .get_program(program_id)
            .await?
            .ok_or_else(|| ExpenseError::ProgramNotFound(program_id.to_string()))
    }

    async fn visible_program(&self, program_id: &str, user: &User) -> Result<Program, ExpenseError> {
        let program = self.require_program(program_id).await?;
        if !user.can_view_program(program_id) {
            return Err(ExpenseError::NotAuthorized(user.id.clone()));
        }
        Ok(program)
    }

    pub async fn create_program(
        &self,
        name: String,
        base_budget: Decimal,
        extra_budget: Option<Decimal>,
        income: Option<Decimal>,
        created_by: &User,
    ) -> Result<Program, ExpenseError> {
        self.require_admin(created_by)?;
        self.validate_string_input("name", &name, 100)?;
        self.validate_budget_input("base_budget", base_budget)?;
        if let Some(extra) = extra_budget {
            self.validate_budget_input("extra_budget", extra)?;
        }
        if let Some(income) = income {
            self.validate_budget_input("income", income)?;
        }

        let program = Program {
            id: Uuid::new_v4().to_string(),
            name,
            base_budget,
            extra_budget,
            income,
        };
        self.storage.save_program(program.clone()).await?;

        info!(program_id = %program.id, "program created");
        self.log_and_audit(
            None,
            PROGRAM_CREATED,
            json!({ "program_id": program.id, "name": program.name, "total_budget": program.total_budget() }),
            Some(created_by.id.as_str()),
        )
        .await?;
        Ok(program)
    }

    pub async fn update_program(
        &self,
        program_id: &str,
        update: ProgramUpdate,
        updated_by: &User,
    ) -> Result<Program, ExpenseError> {
        self.require_admin(updated_by)?;
        let mut program = self.require_program(program_id).await?;

        if let Some(name) = update.name {
            self.validate_string_input("name", &name, 100)?;
            program.name = name;
        }
        if let Some(base) = update.base_budget {
            self.validate_budget_input("base_budget", base)?;
            program.base_budget = base;
        }
        // Zero clears an optional figure.
        if let Some(extra) = update.extra_budget {
            self.validate_budget_input("extra_budget", extra)?;
            program.extra_budget = (!extra.is_zero()).then_some(extra);
        }
        if let Some(income) = update.income {
            self.validate_budget_input("income", income)?;
            program.income = (!income.is_zero()).then_some(income);
        }

        self.storage.save_program(program.clone()).await?;
        self.invalidate_budget(program_id).await?;

        self.log_and_audit(
            None,
            PROGRAM_UPDATED,
            json!({ "program_id": program.id, "name": program.name, "total_budget": program.total_budget() }),
            Some(updated_by.id.as_str()),
        )
        .await?;
        Ok(program)
    }

    pub async fn get_program(&self, program_id: &str, queried_by: &User) -> Result<Program, ExpenseError> {
        self.visible_program(program_id, queried_by).await
    }

    pub async fn list_programs(&self, queried_by: &User) -> Result<Vec<Program>, ExpenseError> {
        Ok(self
            .storage
            .list_programs()
            .await?
            .into_iter()
            .filter(|p| queried_by.can_view_program(&p.id))
            .collect())
    }

    async fn fresh_summary(&self, program: &Program) -> Result<BudgetSummary, ExpenseError> {
        let expenses = self.storage.get_program_expenses(&program.id).await?;
        Ok(budget::summarize(program, &expenses, self.settings.over_budget_margin))
    }

    async fn summary_for(&self, program: &Program) -> Result<BudgetSummary, ExpenseError> {
        if let Some(cached) = self.cache.get_budget_summary(&program.id).await? {
            return Ok(cached);
        }
        let generation = self.budget_generation(&program.id)?;
        let summary = self.fresh_summary(program).await?;
        self.cache
            .save_budget_summary(&summary, Duration::from_secs(BUDGET_CACHE_TTL_SECS))
            .await?;
        // An invalidation that raced the read leaves a stale entry behind; drop it.
        if self.budget_generation(&program.id)? != generation {
            debug!(program_id = %program.id, "budget changed while summarizing, cache entry dropped");
            self.cache.invalidate_budget_summary(&program.id).await?;
        }
        Ok(summary)
    }

    pub async fn budget_summary(&self, program_id: &str, queried_by: &User) -> Result<BudgetSummary, ExpenseError> {
        let program = self.visible_program(program_id, queried_by).await?;
        self.summary_for(&program).await
    }

    pub async fn programs_summary(&self, queried_by: &User) -> Result<Vec<BudgetSummary>, ExpenseError> {
        let programs = self.list_programs(queried_by).await?;
        futures::future::try_join_all(programs.iter().map(|p| self.summary_for(p))).await
    }

    async fn ensure_budget_allows(&self, program: &Program) -> Result<(), ExpenseError> {
        let summary = self.fresh_summary(program).await?;
        if summary.creation_blocked {
            warn!(
                program_id = %program.id,
                remaining = %summary.remaining_balance,
                "expense creation blocked by budget"
            );
            return Err(ExpenseError::OverBudget(program.id.clone()));
        }
        Ok(())
    }

    // CATEGORIES

    async fn program_categories(&self, program_id: &str) -> Result<Vec<Category>, ExpenseError> {
        if let Some(cached) = self.cache.get_categories(program_id).await? {
            return Ok(cached);
        }
        let categories = self.storage.get_categories(program_id).await?;
        self.cache
            .save_categories(program_id, &categories, Duration::from_secs(CATEGORY_CACHE_TTL_SECS))
            .await?;
        Ok(categories)
    }

    pub async fn create_category(&self, program_id: &str, name: String, created_by: &User) -> Result<Category, ExpenseError> {
        self.require_admin(created_by)?;
        self.require_program(program_id).await?;
        self.validate_string_input("name", &name, 100)?;

        let existing = self.storage.get_categories(program_id).await?;
        if existing.iter().any(|c| c.name.to_lowercase() == name.trim().to_lowercase()) {
            return Err(ExpenseError::invalid(
                "name",
                "Duplicate Category",
                format!("Category {} already exists in this program", name),
            ));
        }

        let category = Category {
            id: Uuid::new_v4().to_string(),
            program_id: program_id.to_string(),
            name: name.trim().to_string(),
        };
        self.storage.save_category(category.clone()).await?;
        self.cache.invalidate_categories(program_id).await?;

        self.log_and_audit(
            None,
            CATEGORY_CREATED,
            json!({ "category_id": category.id, "program_id": program_id, "name": category.name }),
            Some(created_by.id.as_str()),
        )
        .await?;
        Ok(category)
    }

    pub async fn list_categories(&self, program_id: &str, queried_by: &User) -> Result<Vec<Category>, ExpenseError> {
        self.visible_program(program_id, queried_by).await?;
        self.program_categories(program_id).await
    }

    // EXPENSES

    async fn visible_expense(&self, expense_id: &str, user: &User) -> Result<Expense, ExpenseError> {
        let expense = self
            .storage
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| ExpenseError::ExpenseNotFound(expense_id.to_string()))?;
        if !user.can_view_program(&expense.program_id) {
            return Err(ExpenseError::NotAuthorized(user.id.clone()));
        }
        Ok(expense)
    }

    async fn persist_new_expense(&self, expense: Expense, program: &Program, created_by: &User) -> Result<Expense, ExpenseError> {
        self.ensure_budget_allows(program).await?;
        self.storage.save_expense(expense.clone()).await?;
        self.invalidate_budget(&program.id).await?;

        info!(
            expense_id = %expense.id,
            program_id = %program.id,
            kind = ?expense.kind,
            amount = %expense.amount,
            "expense created"
        );
        self.log_and_audit(
            Some(&expense.id),
            EXPENSE_CREATED,
            json!({
                "expense_id": expense.id,
                "program_id": expense.program_id,
                "kind": expense.kind,
                "status": expense.status,
                "amount": expense.amount,
                "categories": expense.categories,
            }),
            Some(created_by.id.as_str()),
        )
        .await?;
        Ok(expense)
    }

    pub async fn create_expense(&self, new: NewExpense, created_by: &User) -> Result<Expense, ExpenseError> {
        if new.kind == ExpenseKind::Salary {
            return Err(ExpenseError::invalid(
                "kind",
                "Invalid Kind",
                "Salary reports are derived from rate and quantity",
            ));
        }
        let program = self.visible_program(&new.program_id, created_by).await?;
        self.validate_amount_input("amount", new.amount)?;
        let categories = self.validate_categories(&program.id, &new.categories).await?;
        self.validate_optional_text("supplier_name", &new.supplier_name)?;
        self.validate_optional_text("description", &new.description)?;
        self.validate_optional_text("invoice_number", &new.invoice_number)?;

        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            program_id: program.id.clone(),
            user_id: created_by.id.clone(),
            kind: new.kind,
            status: lifecycle::initial_status(new.kind),
            priority: new.priority,
            amount: new.amount,
            salary: None,
            categories,
            supplier_name: new.supplier_name,
            description: new.description,
            invoice_number: new.invoice_number,
            date: new.date.unwrap_or_else(|| now.date_naive()),
            files: ExpenseFiles::default(),
            created_at: now,
            version: 0,
        };
        self.persist_new_expense(expense, &program, created_by).await
    }

    pub async fn create_salary_expense(&self, new: NewSalaryExpense, created_by: &User) -> Result<Expense, ExpenseError> {
        let program = self.visible_program(&new.program_id, created_by).await?;
        let figures = new.salary.compute()?;
        let categories = self.validate_categories(&program.id, &new.categories).await?;
        self.validate_optional_text("supplier_name", &new.supplier_name)?;
        self.validate_optional_text("description", &new.description)?;

        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            program_id: program.id.clone(),
            user_id: created_by.id.clone(),
            kind: ExpenseKind::Salary,
            status: lifecycle::initial_status(ExpenseKind::Salary),
            priority: new.priority,
            amount: figures.amount,
            salary: Some(SalaryDetails {
                rate: new.salary.rate,
                quantity: new.salary.quantity,
                is_gross: new.salary.is_gross,
                employer_cost: figures.employer_cost,
            }),
            categories,
            supplier_name: new.supplier_name,
            description: new.description,
            invoice_number: None,
            date: new.date.unwrap_or_else(|| now.date_naive()),
            files: ExpenseFiles::default(),
            created_at: now,
            version: 0,
        };
        self.persist_new_expense(expense, &program, created_by).await
    }

    pub async fn get_expense(&self, expense_id: &str, queried_by: &User) -> Result<Expense, ExpenseError> {
        self.visible_expense(expense_id, queried_by).await
    }

    pub async fn list_expenses(
        &self,
        mut filter: ExpenseFilter,
        offset: usize,
        limit: Option<usize>,
        queried_by: &User,
    ) -> Result<ExpensePage, ExpenseError> {
        if !queried_by.is_staff() {
            filter.program_scope = Some(queried_by.program_ids.clone());
        }
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let matching = self.storage.query_expenses(&filter).await?;
        Ok(ExpensePage::paginate(matching, offset, limit))
    }

    pub async fn update_expense(
        &self,
        expense_id: &str,
        update: ExpenseUpdate,
        updated_by: &User,
    ) -> Result<Expense, ExpenseError> {
        let mut expense = self.visible_expense(expense_id, updated_by).await?;
        self.ensure_editable(&expense, updated_by)?;
        let mut changed: Vec<&str> = Vec::new();

        let touches_salary = update.rate.is_some() || update.quantity.is_some() || update.is_gross.is_some();
        match expense.salary.as_mut() {
            Some(salary) => {
                if update.amount.is_some() {
                    return Err(ExpenseError::invalid(
                        "amount",
                        "Derived Amount",
                        "Salary amounts are derived from rate × quantity",
                    ));
                }
                if touches_salary {
                    let input = SalaryInput {
                        rate: update.rate.unwrap_or(salary.rate),
                        quantity: update.quantity.unwrap_or(salary.quantity),
                        is_gross: update.is_gross.unwrap_or(salary.is_gross),
                    };
                    let figures = input.compute()?;
                    salary.rate = input.rate;
                    salary.quantity = input.quantity;
                    salary.is_gross = input.is_gross;
                    salary.employer_cost = figures.employer_cost;
                    expense.amount = figures.amount;
                    changed.push("salary");
                }
            }
            None => {
                if touches_salary {
                    return Err(ExpenseError::invalid(
                        "rate",
                        "Not A Salary Report",
                        "Rate and quantity only apply to salary reports",
                    ));
                }
                if let Some(amount) = update.amount {
                    self.validate_amount_input("amount", amount)?;
                    expense.amount = amount;
                    changed.push("amount");
                }
            }
        }

        if let Some(categories) = update.categories {
            expense.categories = self.validate_categories(&expense.program_id, &categories).await?;
            changed.push("categories");
        }
        if let Some(priority) = update.priority {
            expense.priority = priority;
            changed.push("priority");
        }
        if update.supplier_name.is_some() {
            self.validate_optional_text("supplier_name", &update.supplier_name)?;
            expense.supplier_name = update.supplier_name;
            changed.push("supplier_name");
        }
        if update.description.is_some() {
            self.validate_optional_text("description", &update.description)?;
            expense.description = update.description;
            changed.push("description");
        }
        if update.invoice_number.is_some() {
            self.validate_optional_text("invoice_number", &update.invoice_number)?;
            expense.invoice_number = update.invoice_number;
            changed.push("invoice_number");
        }
        if let Some(date) = update.date {
            expense.date = date;
            changed.push("date");
        }

        let expense = self.write_back(expense).await?;
        self.invalidate_budget(&expense.program_id).await?;

        self.log_and_audit(
            Some(&expense.id),
            EXPENSE_UPDATED,
            json!({ "expense_id": expense.id, "fields": changed, "amount": expense.amount }),
            Some(updated_by.id.as_str()),
        )
        .await?;
        Ok(expense)
    }

    pub async fn delete_expense(&self, expense_id: &str, deleted_by: &User) -> Result<(), ExpenseError> {
        let expense = self.visible_expense(expense_id, deleted_by).await?;
        let owner_may_delete = expense.user_id == deleted_by.id
            && matches!(
                expense.status,
                ExpenseStatus::New | ExpenseStatus::PettyCash | ExpenseStatus::Salary
            );
        if !deleted_by.is_admin() && !owner_may_delete {
            return Err(ExpenseError::NotAuthorized(deleted_by.id.clone()));
        }

        if !self.storage.delete_expense(expense_id).await? {
            return Err(ExpenseError::ExpenseNotFound(expense_id.to_string()));
        }
        self.files.remove_expense_files(expense_id).await?;
        self.invalidate_budget(&expense.program_id).await?;

        info!(expense_id, "expense deleted");
        self.log_and_audit(
            Some(expense_id),
            EXPENSE_DELETED,
            json!({ "expense_id": expense_id, "program_id": expense.program_id, "amount": expense.amount }),
            Some(deleted_by.id.as_str()),
        )
        .await?;
        Ok(())
    }

    // STATUS LIFECYCLE

    /// Explicit status change requested by staff. Downloads and receipt uploads
    /// move the status through their own operations.
    pub async fn apply_status_action(
        &self,
        expense_id: &str,
        action: ExpenseAction,
        requested_by: &User,
    ) -> Result<Expense, ExpenseError> {
        if matches!(action, ExpenseAction::DownloadFile | ExpenseAction::UploadReceipt) {
            return Err(ExpenseError::invalid(
                "action",
                "Implicit Action",
                "This status change happens when the file is downloaded or uploaded",
            ));
        }
        self.require_staff(requested_by)?;
        let expense = self.visible_expense(expense_id, requested_by).await?;
        let next = lifecycle::transition(expense.status, action)?;

        if !self.storage.update_status_if(expense_id, expense.status, next).await? {
            return Err(ExpenseError::RequestInFlight(expense_id.to_string()));
        }
        self.invalidate_budget(&expense.program_id).await?;

        info!(expense_id, from = %expense.status, to = %next, "expense status changed");
        self.log_and_audit(
            Some(expense_id),
            STATUS_CHANGED,
            json!({ "expense_id": expense_id, "from": expense.status, "to": next, "action": action }),
            Some(requested_by.id.as_str()),
        )
        .await?;
        self.visible_expense(expense_id, requested_by).await
    }

    /// Moves a `new` expense to `sent_for_payment`. Returns `false` without error
    /// when the expense already left `new`.
    pub async fn advance_if_new(&self, expense_id: &str, actor: &User) -> Result<bool, ExpenseError> {
        let next = lifecycle::transition(ExpenseStatus::New, ExpenseAction::DownloadFile)?;
        let advanced = self
            .storage
            .update_status_if(expense_id, ExpenseStatus::New, next)
            .await?;
        if advanced {
            info!(expense_id, "expense sent for payment");
            self.log_and_audit(
                Some(expense_id),
                STATUS_CHANGED,
                json!({ "expense_id": expense_id, "from": ExpenseStatus::New, "to": next, "action": ExpenseAction::DownloadFile }),
                Some(actor.id.as_str()),
            )
            .await?;
        }
        Ok(advanced)
    }

    pub async fn toggle_urgent(&self, expense_id: &str, toggled_by: &User) -> Result<Expense, ExpenseError> {
        let _guard = self.begin_request(expense_id)?;
        let mut expense = self.visible_expense(expense_id, toggled_by).await?;
        self.ensure_editable(&expense, toggled_by)?;

        expense.priority = expense.priority.toggled();
        let expense = self.write_back(expense).await?;

        self.log_and_audit(
            Some(expense_id),
            PRIORITY_TOGGLED,
            json!({ "expense_id": expense_id, "priority": expense.priority }),
            Some(toggled_by.id.as_str()),
        )
        .await?;
        Ok(expense)
    }

    // FILES

    pub async fn attach_file(
        &self,
        expense_id: &str,
        slot: FileSlot,
        file: NewFile,
        uploaded_by: &User,
    ) -> Result<Expense, ExpenseError> {
        let _guard = self.begin_request(expense_id)?;
        let mut expense = self.visible_expense(expense_id, uploaded_by).await?;
        if !expense.kind.accepts(slot) {
            return Err(ExpenseError::AttachmentNotAllowed(slot.to_string()));
        }
        self.validate_string_input("file_name", &file.name, MAX_TEXT_LENGTH)?;
        if file.content.is_empty() {
            return Err(ExpenseError::invalid("file", "Empty File", "Uploaded file has no content"));
        }

        let follows_lifecycle = matches!(expense.kind, ExpenseKind::Invoice | ExpenseKind::Expected);
        let next_status = if slot == FileSlot::ReceiptFile && follows_lifecycle {
            if !uploaded_by.is_staff() && expense.user_id != uploaded_by.id {
                return Err(ExpenseError::NotAuthorized(uploaded_by.id.clone()));
            }
            Some(lifecycle::transition(expense.status, ExpenseAction::UploadReceipt)?)
        } else {
            self.ensure_editable(&expense, uploaded_by)?;
            None
        };

        let index = expense.files.slot(slot).len();
        if index >= self.settings.max_files_per_slot {
            return Err(ExpenseError::SlotFull(slot.to_string(), self.settings.max_files_per_slot));
        }

        let file_ref = FileRef {
            name: file.name,
            content_type: file.content_type,
            size: file.content.len(),
            uploaded_at: Utc::now(),
        };
        let key = FileKey::new(expense_id, slot, index);
        self.files.put(&key, file.content).await?;
        expense.files.slot_mut(slot).push(file_ref.clone());

        let previous_status = expense.status;
        if let Some(next) = next_status {
            expense.status = next;
        }
        let expense = match self.write_back(expense).await {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(cleanup) = self.files.remove(&key).await {
                    warn!(expense_id, path = %key.path(), error = %cleanup, "orphaned attachment left behind");
                }
                return Err(e);
            }
        };

        self.log_and_audit(
            Some(expense_id),
            FILE_ATTACHED,
            json!({ "expense_id": expense_id, "slot": slot, "index": index, "name": file_ref.name, "size": file_ref.size }),
            Some(uploaded_by.id.as_str()),
        )
        .await?;
        if expense.status != previous_status {
            info!(expense_id, from = %previous_status, to = %expense.status, "receipt uploaded");
            self.log_and_audit(
                Some(expense_id),
                STATUS_CHANGED,
                json!({ "expense_id": expense_id, "from": previous_status, "to": expense.status, "action": ExpenseAction::UploadReceipt }),
                Some(uploaded_by.id.as_str()),
            )
            .await?;
        }
        Ok(expense)
    }

    /// Delivers an attachment. A staff download then advances a `new` expense and
    /// notifies the owner in the background. Bookkeeping failures never undo the download.
    pub async fn download_file(
        &self,
        expense_id: &str,
        slot: FileSlot,
        index: usize,
        downloaded_by: &User,
    ) -> Result<FileDownload, ExpenseError> {
        let expense = self.visible_expense(expense_id, downloaded_by).await?;
        let file = expense
            .files
            .get(slot, index)
            .cloned()
            .ok_or_else(|| ExpenseError::FileNotFound(format!("{}/{}/{}", expense_id, slot, index)))?;
        let key = FileKey::new(expense_id, slot, index);

        let content = match self.files.fetch(&key).await {
            Ok(content) => content,
            Err(e) => {
                warn!(expense_id, %slot, index, error = %e, "file fetch failed, falling back to raw url");
                return Ok(FileDownload::Fallback {
                    url: self.files.raw_url(&key),
                });
            }
        };

        // Only staff downloads mean processing has begun.
        let status_advanced = if downloaded_by.is_staff() {
            match self.advance_if_new(expense_id, downloaded_by).await {
                Ok(advanced) => advanced,
                Err(e) => {
                    warn!(expense_id, error = %e, "status advance after download failed");
                    false
                }
            }
        } else {
            false
        };

        if let Err(e) = self
            .log_and_audit(
                Some(expense_id),
                FILE_DOWNLOADED,
                json!({ "expense_id": expense_id, "slot": slot, "index": index }),
                Some(downloaded_by.id.as_str()),
            )
            .await
        {
            warn!(expense_id, error = %e, "download audit failed");
        }

        if downloaded_by.is_staff() {
            match self.download_notice(&expense, Some(slot), downloaded_by).await {
                Ok(notice) => self.dispatch_download_notice(notice),
                Err(e) => warn!(expense_id, error = %e, "download notice skipped"),
            }
        }

        Ok(FileDownload::Delivered {
            file,
            content,
            status_advanced,
        })
    }

    async fn download_notice(
        &self,
        expense: &Expense,
        slot: Option<FileSlot>,
        requested_by: &User,
    ) -> Result<DownloadNotice, ExpenseError> {
        let owner = self
            .storage
            .get_user(&expense.user_id)
            .await?
            .ok_or_else(|| ExpenseError::UserNotFound(expense.user_id.clone()))?;
        Ok(DownloadNotice {
            expense_id: expense.id.clone(),
            program_id: expense.program_id.clone(),
            slot,
            requested_by: requested_by.id.clone(),
            recipient: owner.email,
            sent_at: Utc::now(),
        })
    }

    /// Fire-and-forget: the result is only logged.
    fn dispatch_download_notice(&self, notice: DownloadNotice) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let expense_id = notice.expense_id.clone();
            if let Err(e) = notifier.send_download_notice(notice).await {
                debug!(%expense_id, error = %e, "download notice dropped");
            }
        });
    }

    pub async fn download_and_send(&self, expense_id: &str, requested_by: &User) -> Result<(), ExpenseError> {
        let expense = self.visible_expense(expense_id, requested_by).await?;
        let notice = self.download_notice(&expense, None, requested_by).await?;
        self.notifier.send_download_notice(notice).await?;

        self.log_and_audit(
            Some(expense_id),
            DOWNLOAD_SENT,
            json!({ "expense_id": expense_id }),
            Some(requested_by.id.as_str()),
        )
        .await?;
        Ok(())
    }

    // AUDIT

    pub async fn expense_history(&self, expense_id: &str, queried_by: &User) -> Result<Vec<ExpenseAudit>, ExpenseError> {
        self.visible_expense(expense_id, queried_by).await?;
        self.storage.get_expense_audits(expense_id).await
    }

    pub async fn get_app_logs(&self, queried_by: &User) -> Result<Vec<AppLog>, ExpenseError> {
        self.require_admin(queried_by)?;
        self.logging.get_logs().await
    }
}
