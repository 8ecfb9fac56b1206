use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    api::models::{
        CreateCategoryRequest, CreateExpenseRequest, CreateProgramRequest, CreateSalaryRequest, CreateUserRequest,
        ErrorResponse, StatusActionRequest, UpdateExpenseRequest,
    },
    core::{
        budget::{BudgetAlert, BudgetSummary},
        lifecycle::ExpenseAction,
        models::{
            AppLog, Category, Expense, ExpenseAudit, ExpenseFiles, ExpenseKind, ExpensePage, ExpenseSort,
            ExpenseStatus, FileRef, FileSlot, Priority, Program, ProgramUpdate, SalaryDetails, User, UserRole,
        },
    },
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::me,
        super::handlers::list_users,
        super::handlers::create_user,
        super::handlers::assign_program,
        super::handlers::unassign_program,
        super::handlers::list_programs,
        super::handlers::create_program,
        super::handlers::programs_summary,
        super::handlers::get_program,
        super::handlers::update_program,
        super::handlers::program_budget,
        super::handlers::list_categories,
        super::handlers::create_category,
        super::handlers::list_expenses,
        super::handlers::create_expense,
        super::handlers::create_salary_expense,
        super::handlers::get_expense,
        super::handlers::update_expense,
        super::handlers::delete_expense,
        super::handlers::apply_status_action,
        super::handlers::toggle_urgent,
        super::handlers::upload_file,
        super::handlers::download_file,
        super::handlers::download_and_send,
        super::handlers::expense_history,
        super::handlers::get_app_logs
    ),
    components(schemas(
        CreateUserRequest,
        CreateProgramRequest,
        CreateCategoryRequest,
        CreateExpenseRequest,
        CreateSalaryRequest,
        UpdateExpenseRequest,
        StatusActionRequest,
        ErrorResponse,
        User,
        UserRole,
        Program,
        ProgramUpdate,
        Category,
        Expense,
        ExpenseKind,
        ExpenseStatus,
        ExpenseAction,
        ExpenseSort,
        ExpensePage,
        ExpenseFiles,
        FileRef,
        FileSlot,
        Priority,
        SalaryDetails,
        BudgetSummary,
        BudgetAlert,
        AppLog,
        ExpenseAudit
    )),
    modifiers(&BearerAuth),
    info(
        title = "Expensio API",
        description = "API for program budgets, expense reports and their payment lifecycle",
        version = "0.1.0"
    )
)]
pub struct ApiDoc;
