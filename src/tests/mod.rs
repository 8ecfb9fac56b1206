mod expense_tests;

use crate::api::handlers::AppService;
use crate::core::models::{Category, ExpenseKind, Priority, Program, User, UserRole};
use crate::core::services::{ExpenseService, NewExpense, ServiceSettings};
use crate::infrastructure::cache::{Cache, in_memory::InMemoryCache};
use crate::infrastructure::files::{FileStore, in_memory::InMemoryFileStore};
use crate::infrastructure::logging::{LoggingService, in_memory::InMemoryLogging};
use crate::infrastructure::notifier::{Notifier, in_memory::InMemoryNotifier};
use crate::infrastructure::storage::{Storage, in_memory::InMemoryStorage};
use rust_decimal::Decimal;

pub fn create_test_service() -> AppService {
    create_test_service_with(ServiceSettings::default()).0
}

/// Service plus a handle on the notifier so tests can inspect sent notices.
pub fn create_test_service_with(settings: ServiceSettings) -> (AppService, InMemoryNotifier) {
    let storage = InMemoryStorage::new();
    let logging = InMemoryLogging::new();
    let cache = InMemoryCache::new();
    let files = InMemoryFileStore::new("https://files.example.com");
    let notifier = InMemoryNotifier::new();
    let service = ExpenseService::new(storage, logging, cache, files, notifier.clone(), settings);
    (service, notifier)
}

pub async fn seed_admin<L: LoggingService, S: Storage, C: Cache, F: FileStore, N: Notifier>(
    service: &ExpenseService<L, S, C, F, N>,
) -> User {
    service
        .ensure_admin("admin", "Admin", "admin@example.com")
        .await
        .unwrap()
}

/// Program with a single "Supplies" category.
pub async fn seed_program<L: LoggingService, S: Storage, C: Cache, F: FileStore, N: Notifier>(
    service: &ExpenseService<L, S, C, F, N>,
    admin: &User,
    base_budget: Decimal,
) -> (Program, Category) {
    let program = service
        .create_program("Youth Center".to_string(), base_budget, None, None, admin)
        .await
        .unwrap();
    let category = service
        .create_category(&program.id, "Supplies".to_string(), admin)
        .await
        .unwrap();
    (program, category)
}

pub async fn seed_user<L: LoggingService, S: Storage, C: Cache, F: FileStore, N: Notifier>(
    service: &ExpenseService<L, S, C, F, N>,
    admin: &User,
    name: &str,
    role: UserRole,
    program_ids: Vec<String>,
) -> User {
    service
        .create_user(
            name.to_string(),
            format!("{}@example.com", name.to_lowercase()),
            role,
            program_ids,
            admin,
        )
        .await
        .unwrap()
}

pub fn invoice(program: &Program, category: &Category, amount: Decimal) -> NewExpense {
    NewExpense {
        program_id: program.id.clone(),
        kind: ExpenseKind::Invoice,
        amount,
        categories: vec![category.id.clone()],
        priority: Priority::Normal,
        supplier_name: Some("Office Depot".to_string()),
        description: Some("Paper and toner".to_string()),
        invoice_number: Some("INV-1001".to_string()),
        date: None,
    }
}
