// src/tests/expense_tests.rs

use super::{create_test_service, create_test_service_with, invoice, seed_admin, seed_program, seed_user};
use crate::constants::{EXPENSE_CREATED, FILE_ATTACHED, FILE_DOWNLOADED, STATUS_CHANGED};
use crate::core::errors::ExpenseError;
use crate::core::lifecycle::{ExpenseAction, TransitionError};
use crate::core::models::{
    ExpenseFilter, ExpenseKind, ExpenseSort, ExpenseStatus, FileSlot, Priority, UserRole,
};
use crate::core::payroll::SalaryInput;
use crate::core::services::{
    ExpenseService, ExpenseUpdate, FileDownload, NewFile, NewSalaryExpense, ServiceSettings,
};
use crate::infrastructure::cache::in_memory::InMemoryCache;
use crate::infrastructure::files::{FileKey, FileStore};
use crate::infrastructure::logging::in_memory::InMemoryLogging;
use crate::infrastructure::notifier::in_memory::InMemoryNotifier;
use crate::infrastructure::storage::in_memory::InMemoryStorage;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

fn pdf(name: &str) -> NewFile {
    NewFile {
        name: name.to_string(),
        content_type: "application/pdf".to_string(),
        content: b"%PDF-1.7 test".to_vec(),
    }
}

fn salary_request(program_id: &str, category_id: &str, is_gross: bool) -> NewSalaryExpense {
    NewSalaryExpense {
        program_id: program_id.to_string(),
        salary: SalaryInput {
            rate: dec!(50),
            quantity: 3,
            is_gross,
        },
        categories: vec![category_id.to_string()],
        priority: Priority::Normal,
        supplier_name: Some("Noa".to_string()),
        description: Some("March sessions".to_string()),
        date: None,
    }
}

/// Accepts uploads but can never serve them back.
struct UnreachableFileStore;

#[async_trait]
impl FileStore for UnreachableFileStore {
    async fn put(&self, _key: &FileKey, _content: Vec<u8>) -> Result<(), ExpenseError> {
        Ok(())
    }

    async fn fetch(&self, key: &FileKey) -> Result<Vec<u8>, ExpenseError> {
        Err(ExpenseError::FileStoreError(format!("{} timed out", key.path())))
    }

    async fn remove(&self, _key: &FileKey) -> Result<(), ExpenseError> {
        Ok(())
    }

    async fn remove_expense_files(&self, _expense_id: &str) -> Result<(), ExpenseError> {
        Ok(())
    }

    fn raw_url(&self, key: &FileKey) -> String {
        format!("https://raw.example.com/{}", key.path())
    }
}

async fn wait_for_notices(notifier: &InMemoryNotifier, expected: usize) -> usize {
    for _ in 0..20 {
        let sent = notifier.sent().await.len();
        if sent >= expected {
            return sent;
        }
        tokio::task::yield_now().await;
    }
    notifier.sent().await.len()
}

#[tokio::test]
async fn test_create_invoice_starts_new() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;

    let expense = service
        .create_expense(invoice(&program, &category, dec!(120.50)), &admin)
        .await
        .unwrap();

    assert_eq!(expense.status, ExpenseStatus::New);
    assert_eq!(expense.priority, Priority::Normal);
    assert_eq!(expense.amount, dec!(120.50));
    assert_eq!(expense.user_id, admin.id);
    assert!(expense.salary.is_none());

    let history = service.expense_history(&expense.id, &admin).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, EXPENSE_CREATED);
}

#[tokio::test]
async fn test_create_expense_validation() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;

    let zero = service
        .create_expense(invoice(&program, &category, dec!(0)), &admin)
        .await;
    assert!(matches!(zero, Err(ExpenseError::InvalidInput(field, _)) if field == "amount"));

    let fractional = service
        .create_expense(invoice(&program, &category, dec!(10.005)), &admin)
        .await;
    assert!(matches!(fractional, Err(ExpenseError::InvalidInput(field, _)) if field == "amount"));

    let mut no_categories = invoice(&program, &category, dec!(10));
    no_categories.categories.clear();
    let result = service.create_expense(no_categories, &admin).await;
    assert!(matches!(result, Err(ExpenseError::InvalidInput(field, _)) if field == "categories"));

    let mut unknown = invoice(&program, &category, dec!(10));
    unknown.categories = vec!["not-a-category".to_string()];
    let result = service.create_expense(unknown, &admin).await;
    assert!(matches!(result, Err(ExpenseError::UnknownCategory(id)) if id == "not-a-category"));

    let mut markup = invoice(&program, &category, dec!(10));
    markup.supplier_name = Some("<script>".to_string());
    let result = service.create_expense(markup, &admin).await;
    assert!(matches!(result, Err(ExpenseError::InvalidInput(field, _)) if field == "supplier_name"));

    let mut salary_kind = invoice(&program, &category, dec!(10));
    salary_kind.kind = ExpenseKind::Salary;
    let result = service.create_expense(salary_kind, &admin).await;
    assert!(matches!(result, Err(ExpenseError::InvalidInput(field, _)) if field == "kind"));

    let mut missing_program = invoice(&program, &category, dec!(10));
    missing_program.program_id = "nowhere".to_string();
    let result = service.create_expense(missing_program, &admin).await;
    assert!(matches!(result, Err(ExpenseError::ProgramNotFound(_))));
}

#[tokio::test]
async fn test_duplicate_categories_collapse() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let food = service
        .create_category(&program.id, "Food".to_string(), &admin)
        .await
        .unwrap();

    let mut new = invoice(&program, &category, dec!(10));
    new.categories = vec![category.id.clone(), food.id.clone(), category.id.clone()];
    let expense = service.create_expense(new, &admin).await.unwrap();
    assert_eq!(expense.categories, vec![category.id.clone(), food.id.clone()]);

    let duplicate = service
        .create_category(&program.id, " food ".to_string(), &admin)
        .await;
    assert!(matches!(duplicate, Err(ExpenseError::InvalidInput(field, _)) if field == "name"));
}

#[tokio::test]
async fn test_salary_expense_derives_amount() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;

    let expense = service
        .create_salary_expense(salary_request(&program.id, &category.id, false), &admin)
        .await
        .unwrap();

    assert_eq!(expense.kind, ExpenseKind::Salary);
    assert_eq!(expense.status, ExpenseStatus::Salary);
    assert_eq!(expense.amount, dec!(150.00));
    let salary = expense.salary.clone().unwrap();
    assert_eq!(salary.employer_cost, dec!(196.57));
    assert!(!salary.is_gross);
}

#[tokio::test]
async fn test_salary_update_recomputes_figures() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let expense = service
        .create_salary_expense(salary_request(&program.id, &category.id, false), &admin)
        .await
        .unwrap();

    let updated = service
        .update_expense(
            &expense.id,
            ExpenseUpdate {
                rate: Some(dec!(100)),
                quantity: Some(2),
                is_gross: Some(true),
                ..Default::default()
            },
            &admin,
        )
        .await
        .unwrap();
    assert_eq!(updated.amount, dec!(200.00));
    assert_eq!(updated.salary.unwrap().employer_cost, dec!(230.20));

    let direct_amount = service
        .update_expense(
            &expense.id,
            ExpenseUpdate {
                amount: Some(dec!(999)),
                ..Default::default()
            },
            &admin,
        )
        .await;
    assert!(matches!(direct_amount, Err(ExpenseError::InvalidInput(field, _)) if field == "amount"));
}

#[tokio::test]
async fn test_rate_update_on_invoice_is_refused() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let expense = service
        .create_expense(invoice(&program, &category, dec!(80)), &admin)
        .await
        .unwrap();

    let result = service
        .update_expense(
            &expense.id,
            ExpenseUpdate {
                rate: Some(dec!(10)),
                ..Default::default()
            },
            &admin,
        )
        .await;
    assert!(matches!(result, Err(ExpenseError::InvalidInput(field, _)) if field == "rate"));

    let updated = service
        .update_expense(
            &expense.id,
            ExpenseUpdate {
                amount: Some(dec!(95.10)),
                description: Some("Updated".to_string()),
                ..Default::default()
            },
            &admin,
        )
        .await
        .unwrap();
    assert_eq!(updated.amount, dec!(95.10));
    assert_eq!(updated.description.as_deref(), Some("Updated"));
}

#[tokio::test]
async fn test_download_advances_once_and_notifies_owner() {
    let (service, notifier) = create_test_service_with(ServiceSettings::default());
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let owner = seed_user(&service, &admin, "Maya", UserRole::User, vec![program.id.clone()]).await;
    let assistant = seed_user(&service, &admin, "Omer", UserRole::Assistant, vec![]).await;

    let expense = service
        .create_expense(invoice(&program, &category, dec!(250)), &owner)
        .await
        .unwrap();
    service
        .attach_file(&expense.id, FileSlot::InvoiceFile, pdf("invoice.pdf"), &owner)
        .await
        .unwrap();

    match service
        .download_file(&expense.id, FileSlot::InvoiceFile, 0, &assistant)
        .await
        .unwrap()
    {
        FileDownload::Delivered {
            file,
            content,
            status_advanced,
        } => {
            assert_eq!(file.name, "invoice.pdf");
            assert_eq!(content, b"%PDF-1.7 test".to_vec());
            assert!(status_advanced);
        }
        FileDownload::Fallback { url } => panic!("unexpected fallback to {}", url),
    }
    let current = service.get_expense(&expense.id, &assistant).await.unwrap();
    assert_eq!(current.status, ExpenseStatus::SentForPayment);

    let second = service
        .download_file(&expense.id, FileSlot::InvoiceFile, 0, &assistant)
        .await
        .unwrap();
    assert!(matches!(second, FileDownload::Delivered { status_advanced: false, .. }));
    let current = service.get_expense(&expense.id, &assistant).await.unwrap();
    assert_eq!(current.status, ExpenseStatus::SentForPayment);

    assert_eq!(wait_for_notices(&notifier, 2).await, 2);
    let notices = notifier.sent().await;
    assert!(notices.iter().all(|n| n.recipient == "maya@example.com"));
    assert!(notices.iter().all(|n| n.slot == Some(FileSlot::InvoiceFile)));

    let history = service.expense_history(&expense.id, &admin).await.unwrap();
    let status_changes = history.iter().filter(|a| a.action == STATUS_CHANGED).count();
    let downloads = history.iter().filter(|a| a.action == FILE_DOWNLOADED).count();
    assert_eq!(status_changes, 1);
    assert_eq!(downloads, 2);
}

#[tokio::test]
async fn test_owner_download_leaves_status_alone() {
    let (service, notifier) = create_test_service_with(ServiceSettings::default());
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let owner = seed_user(&service, &admin, "Maya", UserRole::User, vec![program.id.clone()]).await;

    let expense = service
        .create_expense(invoice(&program, &category, dec!(80)), &owner)
        .await
        .unwrap();
    service
        .attach_file(&expense.id, FileSlot::InvoiceFile, pdf("invoice.pdf"), &owner)
        .await
        .unwrap();

    let download = service
        .download_file(&expense.id, FileSlot::InvoiceFile, 0, &owner)
        .await
        .unwrap();
    assert!(matches!(download, FileDownload::Delivered { status_advanced: false, .. }));
    assert_eq!(wait_for_notices(&notifier, 1).await, 0);

    // still editable by its owner
    let edited = service
        .update_expense(
            &expense.id,
            ExpenseUpdate {
                amount: Some(dec!(85)),
                ..Default::default()
            },
            &owner,
        )
        .await
        .unwrap();
    assert_eq!(edited.status, ExpenseStatus::New);
    assert_eq!(edited.amount, dec!(85));
}

#[tokio::test]
async fn test_failed_fetch_falls_back_without_side_effects() {
    let notifier = InMemoryNotifier::new();
    let service = ExpenseService::new(
        InMemoryStorage::new(),
        InMemoryLogging::new(),
        InMemoryCache::new(),
        UnreachableFileStore,
        notifier.clone(),
        ServiceSettings::default(),
    );
    let admin = service
        .ensure_admin("admin", "Admin", "admin@example.com")
        .await
        .unwrap();
    let program = service
        .create_program("Library".to_string(), dec!(1000), None, None, &admin)
        .await
        .unwrap();
    let category = service
        .create_category(&program.id, "Books".to_string(), &admin)
        .await
        .unwrap();
    let expense = service
        .create_expense(invoice(&program, &category, dec!(40)), &admin)
        .await
        .unwrap();
    service
        .attach_file(&expense.id, FileSlot::BankDetailsFile, pdf("bank.pdf"), &admin)
        .await
        .unwrap();

    let download = service
        .download_file(&expense.id, FileSlot::BankDetailsFile, 0, &admin)
        .await
        .unwrap();
    match download {
        FileDownload::Fallback { url } => {
            assert_eq!(url, format!("https://raw.example.com/{}/bank_details_file/0", expense.id));
        }
        FileDownload::Delivered { .. } => panic!("fetch should have failed"),
    }

    let current = service.get_expense(&expense.id, &admin).await.unwrap();
    assert_eq!(current.status, ExpenseStatus::New);
    tokio::task::yield_now().await;
    assert!(notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_download_of_missing_file() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let expense = service
        .create_expense(invoice(&program, &category, dec!(40)), &admin)
        .await
        .unwrap();

    let result = service
        .download_file(&expense.id, FileSlot::InvoiceFile, 3, &admin)
        .await;
    assert!(matches!(result, Err(ExpenseError::FileNotFound(_))));
}

#[tokio::test]
async fn test_full_lifecycle_with_receipt() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let expense = service
        .create_expense(invoice(&program, &category, dec!(75)), &admin)
        .await
        .unwrap();

    let early_receipt = service
        .attach_file(&expense.id, FileSlot::ReceiptFile, pdf("receipt.pdf"), &admin)
        .await;
    assert!(matches!(
        early_receipt,
        Err(ExpenseError::Transition(TransitionError::NotAllowed { .. }))
    ));

    assert!(service.advance_if_new(&expense.id, &admin).await.unwrap());
    let paid = service
        .apply_status_action(&expense.id, ExpenseAction::MarkPaid, &admin)
        .await
        .unwrap();
    assert_eq!(paid.status, ExpenseStatus::Paid);

    let needs_receipt = service
        .apply_status_action(&expense.id, ExpenseAction::Advance, &admin)
        .await;
    assert!(matches!(
        needs_receipt,
        Err(ExpenseError::Transition(TransitionError::ReceiptRequired))
    ));

    let with_receipt = service
        .attach_file(&expense.id, FileSlot::ReceiptFile, pdf("receipt.pdf"), &admin)
        .await
        .unwrap();
    assert_eq!(with_receipt.status, ExpenseStatus::ReceiptUploaded);
    assert_eq!(with_receipt.files.receipt_file.len(), 1);

    let closed = service
        .apply_status_action(&expense.id, ExpenseAction::Advance, &admin)
        .await
        .unwrap();
    assert_eq!(closed.status, ExpenseStatus::Closed);

    let locked = service
        .update_expense(
            &expense.id,
            ExpenseUpdate {
                description: Some("late edit".to_string()),
                ..Default::default()
            },
            &admin,
        )
        .await;
    assert!(matches!(locked, Err(ExpenseError::ExpenseLocked(_))));

    let reopen = service
        .apply_status_action(&expense.id, ExpenseAction::Reject, &admin)
        .await;
    assert!(matches!(
        reopen,
        Err(ExpenseError::Transition(TransitionError::Terminal(ExpenseStatus::Closed)))
    ));
}

#[tokio::test]
async fn test_implicit_actions_cannot_be_requested_directly() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let expense = service
        .create_expense(invoice(&program, &category, dec!(75)), &admin)
        .await
        .unwrap();

    let result = service
        .apply_status_action(&expense.id, ExpenseAction::DownloadFile, &admin)
        .await;
    assert!(matches!(result, Err(ExpenseError::InvalidInput(field, _)) if field == "action"));
}

#[tokio::test]
async fn test_petty_cash_takes_only_receipts() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let mut new = invoice(&program, &category, dec!(35));
    new.kind = ExpenseKind::PettyCash;
    new.invoice_number = None;
    let expense = service.create_expense(new, &admin).await.unwrap();
    assert_eq!(expense.status, ExpenseStatus::PettyCash);

    let invoice_file = service
        .attach_file(&expense.id, FileSlot::InvoiceFile, pdf("invoice.pdf"), &admin)
        .await;
    assert!(matches!(invoice_file, Err(ExpenseError::AttachmentNotAllowed(_))));

    let with_receipt = service
        .attach_file(&expense.id, FileSlot::ReceiptFile, pdf("receipt.jpg"), &admin)
        .await
        .unwrap();
    assert_eq!(with_receipt.status, ExpenseStatus::PettyCash);

    let status_change = service
        .apply_status_action(&expense.id, ExpenseAction::Advance, &admin)
        .await;
    assert!(matches!(
        status_change,
        Err(ExpenseError::Transition(TransitionError::NotInLifecycle(ExpenseStatus::PettyCash)))
    ));
}

#[tokio::test]
async fn test_slot_capacity() {
    let (service, _) = create_test_service_with(ServiceSettings {
        max_files_per_slot: 1,
        ..ServiceSettings::default()
    });
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let expense = service
        .create_expense(invoice(&program, &category, dec!(35)), &admin)
        .await
        .unwrap();

    service
        .attach_file(&expense.id, FileSlot::InvoiceFile, pdf("a.pdf"), &admin)
        .await
        .unwrap();
    let second = service
        .attach_file(&expense.id, FileSlot::InvoiceFile, pdf("b.pdf"), &admin)
        .await;
    assert!(matches!(second, Err(ExpenseError::SlotFull(slot, 1)) if slot == "invoice_file"));

    let empty = service
        .attach_file(
            &expense.id,
            FileSlot::BankDetailsFile,
            NewFile {
                name: "empty.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                content: Vec::new(),
            },
            &admin,
        )
        .await;
    assert!(matches!(empty, Err(ExpenseError::InvalidInput(field, _)) if field == "file"));

    let history = service.expense_history(&expense.id, &admin).await.unwrap();
    assert_eq!(history.iter().filter(|a| a.action == FILE_ATTACHED).count(), 1);
}

#[tokio::test]
async fn test_toggle_urgent_refuses_concurrent_request() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let expense = service
        .create_expense(invoice(&program, &category, dec!(35)), &admin)
        .await
        .unwrap();

    {
        let _busy = service.begin_request(&expense.id).unwrap();
        let result = service.toggle_urgent(&expense.id, &admin).await;
        assert!(matches!(result, Err(ExpenseError::RequestInFlight(id)) if id == expense.id));
    }

    let urgent = service.toggle_urgent(&expense.id, &admin).await.unwrap();
    assert_eq!(urgent.priority, Priority::Urgent);
    let normal = service.toggle_urgent(&expense.id, &admin).await.unwrap();
    assert_eq!(normal.priority, Priority::Normal);
}

#[tokio::test]
async fn test_plain_user_permissions() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let (other_program, other_category) = seed_program(&service, &admin, dec!(5000)).await;
    let owner = seed_user(&service, &admin, "Maya", UserRole::User, vec![program.id.clone()]).await;
    let stranger = seed_user(&service, &admin, "Lior", UserRole::User, vec![other_program.id.clone()]).await;

    let outside = service
        .create_expense(invoice(&other_program, &other_category, dec!(10)), &owner)
        .await;
    assert!(matches!(outside, Err(ExpenseError::NotAuthorized(_))));

    let expense = service
        .create_expense(invoice(&program, &category, dec!(10)), &owner)
        .await
        .unwrap();
    assert!(matches!(
        service.get_expense(&expense.id, &stranger).await,
        Err(ExpenseError::NotAuthorized(_))
    ));
    assert!(matches!(
        service
            .apply_status_action(&expense.id, ExpenseAction::Reject, &owner)
            .await,
        Err(ExpenseError::NotAuthorized(_))
    ));
    assert!(matches!(
        service.list_users(&owner).await,
        Err(ExpenseError::NotAuthorized(_))
    ));

    service.advance_if_new(&expense.id, &admin).await.unwrap();
    let late_edit = service
        .update_expense(
            &expense.id,
            ExpenseUpdate {
                amount: Some(dec!(11)),
                ..Default::default()
            },
            &owner,
        )
        .await;
    assert!(matches!(late_edit, Err(ExpenseError::NotAuthorized(_))));
    assert!(matches!(
        service.delete_expense(&expense.id, &owner).await,
        Err(ExpenseError::NotAuthorized(_))
    ));

    service.delete_expense(&expense.id, &admin).await.unwrap();
    assert!(matches!(
        service.get_expense(&expense.id, &admin).await,
        Err(ExpenseError::ExpenseNotFound(_))
    ));
}

#[tokio::test]
async fn test_program_assignment() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, _) = seed_program(&service, &admin, dec!(5000)).await;
    let user = seed_user(&service, &admin, "Maya", UserRole::User, vec![]).await;

    assert!(service.list_programs(&user).await.unwrap().is_empty());
    let user = service.assign_program(&user.id, &program.id, &admin).await.unwrap();
    assert_eq!(user.program_ids, vec![program.id.clone()]);
    assert_eq!(service.list_programs(&user).await.unwrap().len(), 1);

    let user = service
        .unassign_program(&user.id, &program.id, &admin)
        .await
        .unwrap();
    assert!(user.program_ids.is_empty());
}

#[tokio::test]
async fn test_email_uniqueness_ignores_case() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    seed_user(&service, &admin, "Maya", UserRole::User, vec![]).await;

    let result = service
        .create_user(
            "Maya Again".to_string(),
            "MAYA@example.com".to_string(),
            UserRole::User,
            vec![],
            &admin,
        )
        .await;
    assert!(matches!(result, Err(ExpenseError::EmailAlreadyRegistered(_))));
}

#[tokio::test]
async fn test_list_expenses_filters_and_pages() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(100000)).await;
    let (other_program, other_category) = seed_program(&service, &admin, dec!(100000)).await;
    let owner = seed_user(&service, &admin, "Maya", UserRole::User, vec![program.id.clone()]).await;

    for day in 1..=5u32 {
        let mut new = invoice(&program, &category, dec!(10) * rust_decimal::Decimal::from(day));
        new.date = NaiveDate::from_ymd_opt(2024, 3, day);
        new.supplier_name = Some(format!("Supplier {}", day));
        service.create_expense(new, &admin).await.unwrap();
    }
    service
        .create_expense(invoice(&other_program, &other_category, dec!(999)), &admin)
        .await
        .unwrap();

    let own_view = service
        .list_expenses(ExpenseFilter::default(), 0, None, &owner)
        .await
        .unwrap();
    assert_eq!(own_view.total, 5);
    assert_eq!(own_view.items[0].date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());

    let first_page = service
        .list_expenses(
            ExpenseFilter {
                program_id: Some(program.id.clone()),
                sort: ExpenseSort::AmountAsc,
                ..Default::default()
            },
            0,
            Some(2),
            &admin,
        )
        .await
        .unwrap();
    assert_eq!(first_page.items.len(), 2);
    assert_eq!(first_page.items[0].amount, dec!(10));
    assert!(first_page.has_more);

    let last_page = service
        .list_expenses(
            ExpenseFilter {
                program_id: Some(program.id.clone()),
                ..Default::default()
            },
            4,
            Some(2),
            &admin,
        )
        .await
        .unwrap();
    assert_eq!(last_page.items.len(), 1);
    assert!(!last_page.has_more);

    let ranged = service
        .list_expenses(
            ExpenseFilter {
                from: NaiveDate::from_ymd_opt(2024, 3, 2),
                to: NaiveDate::from_ymd_opt(2024, 3, 3),
                ..Default::default()
            },
            0,
            None,
            &admin,
        )
        .await
        .unwrap();
    assert_eq!(ranged.total, 2);

    let searched = service
        .list_expenses(
            ExpenseFilter {
                text: Some("supplier 4".to_string()),
                ..Default::default()
            },
            0,
            None,
            &admin,
        )
        .await
        .unwrap();
    assert_eq!(searched.total, 1);
    assert_eq!(searched.items[0].amount, dec!(40));

    let only_new = service
        .list_expenses(
            ExpenseFilter {
                status: Some(ExpenseStatus::SentForPayment),
                ..Default::default()
            },
            0,
            None,
            &admin,
        )
        .await
        .unwrap();
    assert_eq!(only_new.total, 0);
}

#[tokio::test]
async fn test_download_and_send_notifies_immediately() {
    let (service, notifier) = create_test_service_with(ServiceSettings::default());
    let admin = seed_admin(&service).await;
    let (program, category) = seed_program(&service, &admin, dec!(5000)).await;
    let expense = service
        .create_expense(invoice(&program, &category, dec!(10)), &admin)
        .await
        .unwrap();

    service.download_and_send(&expense.id, &admin).await.unwrap();

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].slot, None);
    assert_eq!(sent[0].recipient, "admin@example.com");
    let current = service.get_expense(&expense.id, &admin).await.unwrap();
    assert_eq!(current.status, ExpenseStatus::New);
}

#[tokio::test]
async fn test_app_logs_are_admin_only() {
    let service = create_test_service();
    let admin = seed_admin(&service).await;
    seed_program(&service, &admin, dec!(5000)).await;
    let assistant = seed_user(&service, &admin, "Omer", UserRole::Assistant, vec![]).await;

    assert!(!service.get_app_logs(&admin).await.unwrap().is_empty());
    assert!(matches!(
        service.get_app_logs(&assistant).await,
        Err(ExpenseError::NotAuthorized(_))
    ));
}
