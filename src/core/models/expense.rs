use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    New,
    SentForPayment,
    Paid,
    ReceiptUploaded,
    Closed,
    Rejected,
    PettyCash,
    Salary,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::New => "new",
            ExpenseStatus::SentForPayment => "sent_for_payment",
            ExpenseStatus::Paid => "paid",
            ExpenseStatus::ReceiptUploaded => "receipt_uploaded",
            ExpenseStatus::Closed => "closed",
            ExpenseStatus::Rejected => "rejected",
            ExpenseStatus::PettyCash => "petty_cash",
            ExpenseStatus::Salary => "salary",
        }
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown expense status `{}`", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// Case-insensitive; `-` and spaces are accepted in place of `_`.
impl FromStr for ExpenseStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "new" => Ok(ExpenseStatus::New),
            "sent_for_payment" => Ok(ExpenseStatus::SentForPayment),
            "paid" => Ok(ExpenseStatus::Paid),
            "receipt_uploaded" => Ok(ExpenseStatus::ReceiptUploaded),
            "closed" => Ok(ExpenseStatus::Closed),
            "rejected" => Ok(ExpenseStatus::Rejected),
            "petty_cash" => Ok(ExpenseStatus::PettyCash),
            "salary" => Ok(ExpenseStatus::Salary),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    #[default]
    Normal,
}

impl Priority {
    pub fn toggled(self) -> Self {
        match self {
            Priority::Urgent => Priority::Normal,
            Priority::Normal => Priority::Urgent,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseKind {
    #[default]
    Invoice,
    PettyCash,
    Salary,
    Expected,
}

impl ExpenseKind {
    /// Petty cash and salary reports never carry invoice paperwork.
    pub fn accepts(&self, slot: FileSlot) -> bool {
        match self {
            ExpenseKind::Invoice | ExpenseKind::Expected => true,
            ExpenseKind::PettyCash | ExpenseKind::Salary => slot == FileSlot::ReceiptFile,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileSlot {
    InvoiceFile,
    BankDetailsFile,
    ReceiptFile,
}

impl FileSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSlot::InvoiceFile => "invoice_file",
            FileSlot::BankDetailsFile => "bank_details_file",
            FileSlot::ReceiptFile => "receipt_file",
        }
    }
}

impl fmt::Display for FileSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub content_type: String,
    pub size: usize,
    #[schema(value_type = String, example = "2024-06-01T12:34:56Z")]
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ExpenseFiles {
    pub invoice_file: Vec<FileRef>,
    pub bank_details_file: Vec<FileRef>,
    pub receipt_file: Vec<FileRef>,
}

impl ExpenseFiles {
    pub fn slot(&self, slot: FileSlot) -> &Vec<FileRef> {
        match slot {
            FileSlot::InvoiceFile => &self.invoice_file,
            FileSlot::BankDetailsFile => &self.bank_details_file,
            FileSlot::ReceiptFile => &self.receipt_file,
        }
    }

    pub fn slot_mut(&mut self, slot: FileSlot) -> &mut Vec<FileRef> {
        match slot {
            FileSlot::InvoiceFile => &mut self.invoice_file,
            FileSlot::BankDetailsFile => &mut self.bank_details_file,
            FileSlot::ReceiptFile => &mut self.receipt_file,
        }
    }

    pub fn get(&self, slot: FileSlot, index: usize) -> Option<&FileRef> {
        self.slot(slot).get(index)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct SalaryDetails {
    pub rate: Decimal,
    pub quantity: u32,
    pub is_gross: bool,
    /// True cost to the program budget, including payroll overhead.
    pub employer_cost: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Expense {
    pub id: String,
    pub program_id: String,
    pub user_id: String,
    pub kind: ExpenseKind,
    pub status: ExpenseStatus,
    pub priority: Priority,
    pub amount: Decimal,
    pub salary: Option<SalaryDetails>,
    pub categories: Vec<String>,
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub invoice_number: Option<String>,
    #[schema(value_type = String, example = "2024-06-01")]
    pub date: NaiveDate,
    pub files: ExpenseFiles,
    #[schema(value_type = String, example = "2024-06-01T12:34:56Z")]
    pub created_at: DateTime<Utc>,
    /// Bumped by storage on every write.
    #[serde(default)]
    pub version: u64,
}

impl Expense {
    /// Amount charged against the program budget. Rejected expenses charge nothing.
    pub fn budget_impact(&self) -> Decimal {
        if self.status == ExpenseStatus::Rejected {
            return Decimal::ZERO;
        }
        match (&self.kind, &self.salary) {
            (ExpenseKind::Salary, Some(salary)) => salary.employer_cost,
            _ => self.amount,
        }
    }

    fn matches_text(&self, needle: &str) -> bool {
        [&self.supplier_name, &self.description, &self.invoice_number]
            .into_iter()
            .flatten()
            .any(|value| value.to_lowercase().contains(needle))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseSort {
    #[default]
    DateDesc,
    DateAsc,
    AmountDesc,
    AmountAsc,
}

#[derive(Clone, Debug, Default)]
pub struct ExpenseFilter {
    pub program_id: Option<String>,
    pub status: Option<ExpenseStatus>,
    pub kind: Option<ExpenseKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub text: Option<String>,
    pub sort: ExpenseSort,
    /// Restricts results to these programs; `None` means every program.
    pub program_scope: Option<Vec<String>>,
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        if let Some(scope) = &self.program_scope {
            if !scope.contains(&expense.program_id) {
                return false;
            }
        }
        if self.program_id.as_ref().is_some_and(|p| *p != expense.program_id) {
            return false;
        }
        if self.status.is_some_and(|s| s != expense.status) {
            return false;
        }
        if self.kind.is_some_and(|k| k != expense.kind) {
            return false;
        }
        if self.from.is_some_and(|from| expense.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| expense.date > to) {
            return false;
        }
        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => expense.matches_text(&text.to_lowercase()),
            _ => true,
        }
    }

    pub fn sort(&self, expenses: &mut [Expense]) {
        match self.sort {
            ExpenseSort::DateDesc => {
                expenses.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)))
            }
            ExpenseSort::DateAsc => {
                expenses.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)))
            }
            ExpenseSort::AmountDesc => expenses.sort_by(|a, b| b.amount.cmp(&a.amount)),
            ExpenseSort::AmountAsc => expenses.sort_by(|a, b| a.amount.cmp(&b.amount)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExpensePage {
    pub items: Vec<Expense>,
    pub total: usize,
    pub offset: usize,
    pub has_more: bool,
}

impl ExpensePage {
    pub fn paginate(expenses: Vec<Expense>, offset: usize, limit: usize) -> Self {
        let total = expenses.len();
        let items: Vec<Expense> = expenses.into_iter().skip(offset).take(limit).collect();
        let has_more = offset + items.len() < total;
        ExpensePage {
            items,
            total,
            offset,
            has_more,
        }
    }
}
