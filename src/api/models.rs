use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::constants::GENERIC_SAVE_FAILED;
use crate::core::errors::{ExpenseError, FieldError};
use crate::core::lifecycle::{ExpenseAction, TransitionError};
use crate::core::models::{ExpenseFilter, ExpenseKind, ExpenseSort, ExpenseStatus, Priority, UserRole};
use crate::core::payroll::SalaryInput;
use crate::core::services::{ExpenseUpdate, NewExpense, NewSalaryExpense};

// Request structs for JSON payloads
#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub program_ids: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateProgramRequest {
    pub name: String,
    pub base_budget: Decimal,
    pub extra_budget: Option<Decimal>,
    pub income: Option<Decimal>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateExpenseRequest {
    pub program_id: String,
    #[serde(default)]
    pub kind: ExpenseKind,
    pub amount: Decimal,
    pub categories: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub invoice_number: Option<String>,
    #[schema(value_type = Option<String>, example = "2024-06-01")]
    pub date: Option<NaiveDate>,
}

impl From<CreateExpenseRequest> for NewExpense {
    fn from(req: CreateExpenseRequest) -> Self {
        NewExpense {
            program_id: req.program_id,
            kind: req.kind,
            amount: req.amount,
            categories: req.categories,
            priority: req.priority,
            supplier_name: req.supplier_name,
            description: req.description,
            invoice_number: req.invoice_number,
            date: req.date,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSalaryRequest {
    pub program_id: String,
    pub rate: Decimal,
    pub quantity: u32,
    pub is_gross: bool,
    pub categories: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    pub payee_name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, example = "2024-06-01")]
    pub date: Option<NaiveDate>,
}

impl From<CreateSalaryRequest> for NewSalaryExpense {
    fn from(req: CreateSalaryRequest) -> Self {
        NewSalaryExpense {
            program_id: req.program_id,
            salary: SalaryInput {
                rate: req.rate,
                quantity: req.quantity,
                is_gross: req.is_gross,
            },
            categories: req.categories,
            priority: req.priority,
            supplier_name: req.payee_name,
            description: req.description,
            date: req.date,
        }
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateExpenseRequest {
    pub amount: Option<Decimal>,
    pub categories: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub invoice_number: Option<String>,
    #[schema(value_type = Option<String>, example = "2024-06-01")]
    pub date: Option<NaiveDate>,
    pub rate: Option<Decimal>,
    pub quantity: Option<u32>,
    pub is_gross: Option<bool>,
}

impl From<UpdateExpenseRequest> for ExpenseUpdate {
    fn from(req: UpdateExpenseRequest) -> Self {
        ExpenseUpdate {
            amount: req.amount,
            categories: req.categories,
            priority: req.priority,
            supplier_name: req.supplier_name,
            description: req.description,
            invoice_number: req.invoice_number,
            date: req.date,
            rate: req.rate,
            quantity: req.quantity,
            is_gross: req.is_gross,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct StatusActionRequest {
    pub action: ExpenseAction,
}

#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ListExpensesQuery {
    pub program_id: Option<String>,
    #[param(value_type = Option<String>)]
    pub status: Option<ExpenseStatus>,
    #[param(value_type = Option<String>)]
    pub kind: Option<ExpenseKind>,
    #[param(value_type = Option<String>, example = "2024-01-01")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, example = "2024-12-31")]
    pub to: Option<NaiveDate>,
    /// Matches supplier name, description and invoice number
    pub q: Option<String>,
    #[param(value_type = Option<String>)]
    pub sort: Option<ExpenseSort>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ListExpensesQuery {
    pub fn into_filter(self) -> (ExpenseFilter, usize, Option<usize>) {
        let filter = ExpenseFilter {
            program_id: self.program_id,
            status: self.status,
            kind: self.kind,
            from: self.from,
            to: self.to,
            text: self.q,
            sort: self.sort.unwrap_or_default(),
            program_scope: None,
        };
        (filter, self.offset.unwrap_or(0), self.limit)
    }
}

// Error response struct
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable code
    pub error: String,
    /// Text suitable for showing to the user
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

// Newtype wrapper for ExpenseError to implement IntoResponse
pub struct ApiError(pub ExpenseError);

impl From<ExpenseError> for ApiError {
    fn from(err: ExpenseError) -> Self {
        ApiError(err)
    }
}

fn transition_status(err: &TransitionError) -> (StatusCode, &'static str) {
    match err {
        TransitionError::Terminal(_) => (StatusCode::CONFLICT, "terminal_status"),
        TransitionError::NotInLifecycle(_) => (StatusCode::CONFLICT, "not_in_lifecycle"),
        TransitionError::NotAllowed { .. } => (StatusCode::CONFLICT, "transition_not_allowed"),
        TransitionError::ReceiptRequired => (StatusCode::UNPROCESSABLE_ENTITY, "receipt_required"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.0.is_internal() {
            error!(error = %self.0, "request failed");
            let body = ErrorResponse {
                error: "internal_error".to_string(),
                message: GENERIC_SAVE_FAILED.to_string(),
                field: None,
            };
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }

        let message = self.0.to_string();
        let mut field = None;
        let (status, code) = match &self.0 {
            ExpenseError::ExpenseNotFound(_) => (StatusCode::NOT_FOUND, "expense_not_found"),
            ExpenseError::ProgramNotFound(_) => (StatusCode::NOT_FOUND, "program_not_found"),
            ExpenseError::UserNotFound(_) => (StatusCode::NOT_FOUND, "user_not_found"),
            ExpenseError::FileNotFound(_) => (StatusCode::NOT_FOUND, "file_not_found"),
            ExpenseError::UnknownCategory(_) => {
                field = Some("categories".to_string());
                (StatusCode::BAD_REQUEST, "unknown_category")
            }
            ExpenseError::EmailAlreadyRegistered(_) => (StatusCode::CONFLICT, "email_already_registered"),
            ExpenseError::InvalidInput(_, FieldError { field: name, .. }) => {
                field = Some(name.clone());
                (StatusCode::BAD_REQUEST, "invalid_input")
            }
            ExpenseError::Transition(err) => transition_status(err),
            ExpenseError::ExpenseLocked(_) => (StatusCode::CONFLICT, "expense_locked"),
            ExpenseError::SlotFull(_, _) => (StatusCode::CONFLICT, "slot_full"),
            ExpenseError::AttachmentNotAllowed(_) => (StatusCode::BAD_REQUEST, "attachment_not_allowed"),
            ExpenseError::OverBudget(_) => (StatusCode::UNPROCESSABLE_ENTITY, "over_budget"),
            ExpenseError::RequestInFlight(_) => (StatusCode::CONFLICT, "request_in_flight"),
            ExpenseError::NotAuthorized(_) => (StatusCode::FORBIDDEN, "not_authorized"),
            ExpenseError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let message = match &self.0 {
            ExpenseError::InvalidInput(_, detail) => detail.description.clone(),
            _ => message,
        };
        (
            status,
            Json(ErrorResponse {
                error: code.to_string(),
                message,
                field,
            }),
        )
            .into_response()
    }
}
