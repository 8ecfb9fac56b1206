use crate::{
    api::models::*,
    core::{
        budget::BudgetSummary,
        errors::ExpenseError,
        models::{AppLog, Category, Expense, ExpenseAudit, ExpensePage, FileSlot, Program, ProgramUpdate, User},
        services::{ExpenseService, FileDownload, NewFile},
    },
    infrastructure::{
        cache::in_memory::InMemoryCache, files::in_memory::InMemoryFileStore, logging::in_memory::InMemoryLogging,
        notifier::in_memory::InMemoryNotifier, storage::in_memory::InMemoryStorage,
    },
};
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, patch, post},
};
use http::header;

use std::sync::Arc;

pub type AppService =
    ExpenseService<InMemoryLogging, InMemoryStorage, InMemoryCache, InMemoryFileStore, InMemoryNotifier>;

/// Request header carrying the original file name on uploads.
pub const FILE_NAME_HEADER: &str = "x-file-name";
/// Response header telling the client whether the download moved the expense forward.
pub const STATUS_ADVANCED_HEADER: &str = "x-status-advanced";

// Middleware to validate the bearer token and attach the caller
async fn auth_middleware(
    State(service): State<Arc<AppService>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ExpenseError::Unauthenticated("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ExpenseError::Unauthenticated("Invalid Authorization header".to_string()))?;

    let caller = service.authenticate(token).await?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

// Define API routes
pub fn api_routes(service: Arc<AppService>) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{user_id}/programs/{program_id}",
            post(assign_program).delete(unassign_program),
        )
        .route("/programs", get(list_programs).post(create_program))
        .route("/programs/summary", get(programs_summary))
        .route("/programs/{program_id}", get(get_program).put(update_program))
        .route("/programs/{program_id}/budget", get(program_budget))
        .route(
            "/programs/{program_id}/categories",
            get(list_categories).post(create_category),
        )
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/salary", post(create_salary_expense))
        .route(
            "/expenses/{expense_id}",
            get(get_expense).patch(update_expense).delete(delete_expense),
        )
        .route("/expenses/{expense_id}/status", patch(apply_status_action))
        .route("/expenses/{expense_id}/urgent", post(toggle_urgent))
        .route("/expenses/{expense_id}/files/{field}", post(upload_file))
        .route("/expenses/{expense_id}/files/{field}/{index}", get(download_file))
        .route("/expenses/{expense_id}/download-and-send", post(download_and_send))
        .route("/expenses/{expense_id}/history", get(expense_history))
        .route("/logs", get(get_app_logs))
        .route_layer(middleware::from_fn_with_state(service.clone(), auth_middleware))
        .with_state(service)
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Caller record", body = User),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn me(Extension(caller): Extension<User>) -> Json<User> {
    Json(caller)
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Not an administrator", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_users(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(service.list_users(&caller).await?))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User or assistant created", body = User),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_user(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = service
        .create_user(req.name, req.email, req.role, req.program_ids, &caller)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    post,
    path = "/api/users/{user_id}/programs/{program_id}",
    params(
        ("user_id" = String, Path, description = "User to assign"),
        ("program_id" = String, Path, description = "Program to assign")
    ),
    responses(
        (status = 200, description = "Program assigned", body = User),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 404, description = "User or program not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn assign_program(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path((user_id, program_id)): Path<(String, String)>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(service.assign_program(&user_id, &program_id, &caller).await?))
}

#[utoipa::path(
    delete,
    path = "/api/users/{user_id}/programs/{program_id}",
    params(
        ("user_id" = String, Path, description = "User to unassign"),
        ("program_id" = String, Path, description = "Program to remove")
    ),
    responses(
        (status = 200, description = "Program unassigned", body = User),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn unassign_program(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path((user_id, program_id)): Path<(String, String)>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(service.unassign_program(&user_id, &program_id, &caller).await?))
}

#[utoipa::path(
    get,
    path = "/api/programs",
    responses(
        (status = 200, description = "Programs visible to the caller", body = [Program])
    ),
    security(("Bearer" = []))
)]
async fn list_programs(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
) -> Result<Json<Vec<Program>>, ApiError> {
    Ok(Json(service.list_programs(&caller).await?))
}

#[utoipa::path(
    post,
    path = "/api/programs",
    request_body = CreateProgramRequest,
    responses(
        (status = 201, description = "Program created", body = Program),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_program(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Json(req): Json<CreateProgramRequest>,
) -> Result<(StatusCode, Json<Program>), ApiError> {
    let program = service
        .create_program(req.name, req.base_budget, req.extra_budget, req.income, &caller)
        .await?;
    Ok((StatusCode::CREATED, Json(program)))
}

#[utoipa::path(
    get,
    path = "/api/programs/summary",
    responses(
        (status = 200, description = "Budget summary of every visible program", body = [BudgetSummary])
    ),
    security(("Bearer" = []))
)]
async fn programs_summary(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
) -> Result<Json<Vec<BudgetSummary>>, ApiError> {
    Ok(Json(service.programs_summary(&caller).await?))
}

#[utoipa::path(
    get,
    path = "/api/programs/{program_id}",
    params(("program_id" = String, Path, description = "Program ID")),
    responses(
        (status = 200, description = "Program", body = Program),
        (status = 403, description = "Program not assigned to caller", body = ErrorResponse),
        (status = 404, description = "Program not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_program(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(program_id): Path<String>,
) -> Result<Json<Program>, ApiError> {
    Ok(Json(service.get_program(&program_id, &caller).await?))
}

#[utoipa::path(
    put,
    path = "/api/programs/{program_id}",
    params(("program_id" = String, Path, description = "Program ID")),
    request_body = ProgramUpdate,
    responses(
        (status = 200, description = "Program updated", body = Program),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 404, description = "Program not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn update_program(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(program_id): Path<String>,
    Json(update): Json<ProgramUpdate>,
) -> Result<Json<Program>, ApiError> {
    Ok(Json(service.update_program(&program_id, update, &caller).await?))
}

#[utoipa::path(
    get,
    path = "/api/programs/{program_id}/budget",
    params(("program_id" = String, Path, description = "Program ID")),
    responses(
        (status = 200, description = "Budget summary with alert level", body = BudgetSummary),
        (status = 404, description = "Program not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn program_budget(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(program_id): Path<String>,
) -> Result<Json<BudgetSummary>, ApiError> {
    Ok(Json(service.budget_summary(&program_id, &caller).await?))
}

#[utoipa::path(
    get,
    path = "/api/programs/{program_id}/categories",
    params(("program_id" = String, Path, description = "Program ID")),
    responses(
        (status = 200, description = "Categories of the program", body = [Category]),
        (status = 404, description = "Program not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_categories(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(program_id): Path<String>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(service.list_categories(&program_id, &caller).await?))
}

#[utoipa::path(
    post,
    path = "/api/programs/{program_id}/categories",
    params(("program_id" = String, Path, description = "Program ID")),
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_category(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(program_id): Path<String>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = service.create_category(&program_id, req.name, &caller).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    get,
    path = "/api/expenses",
    params(ListExpensesQuery),
    responses(
        (status = 200, description = "One page of matching expenses", body = ExpensePage)
    ),
    security(("Bearer" = []))
)]
async fn list_expenses(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Query(query): Query<ListExpensesQuery>,
) -> Result<Json<ExpensePage>, ApiError> {
    let (filter, offset, limit) = query.into_filter();
    Ok(Json(service.list_expenses(filter, offset, limit, &caller).await?))
}

#[utoipa::path(
    post,
    path = "/api/expenses",
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense created", body = Expense),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 422, description = "Program is over budget", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_expense(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let expense = service.create_expense(req.into(), &caller).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[utoipa::path(
    post,
    path = "/api/expenses/salary",
    request_body = CreateSalaryRequest,
    responses(
        (status = 201, description = "Salary report created with derived amount", body = Expense),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 422, description = "Program is over budget", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_salary_expense(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Json(req): Json<CreateSalaryRequest>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let expense = service.create_salary_expense(req.into(), &caller).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[utoipa::path(
    get,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = String, Path, description = "Expense ID")),
    responses(
        (status = 200, description = "Expense", body = Expense),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_expense(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(expense_id): Path<String>,
) -> Result<Json<Expense>, ApiError> {
    Ok(Json(service.get_expense(&expense_id, &caller).await?))
}

#[utoipa::path(
    patch,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = String, Path, description = "Expense ID")),
    request_body = UpdateExpenseRequest,
    responses(
        (status = 200, description = "Expense updated", body = Expense),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 409, description = "Expense is locked", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn update_expense(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(expense_id): Path<String>,
    Json(req): Json<UpdateExpenseRequest>,
) -> Result<Json<Expense>, ApiError> {
    Ok(Json(service.update_expense(&expense_id, req.into(), &caller).await?))
}

#[utoipa::path(
    delete,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = String, Path, description = "Expense ID")),
    responses(
        (status = 204, description = "Expense deleted"),
        (status = 403, description = "Not allowed to delete", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn delete_expense(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(expense_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    service.delete_expense(&expense_id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/api/expenses/{expense_id}/status",
    params(("expense_id" = String, Path, description = "Expense ID")),
    request_body = StatusActionRequest,
    responses(
        (status = 200, description = "Status changed", body = Expense),
        (status = 403, description = "Staff only", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn apply_status_action(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(expense_id): Path<String>,
    Json(req): Json<StatusActionRequest>,
) -> Result<Json<Expense>, ApiError> {
    Ok(Json(
        service
            .apply_status_action(&expense_id, req.action, &caller)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/expenses/{expense_id}/urgent",
    params(("expense_id" = String, Path, description = "Expense ID")),
    responses(
        (status = 200, description = "Priority toggled", body = Expense),
        (status = 409, description = "A toggle for this expense is already running", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn toggle_urgent(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(expense_id): Path<String>,
) -> Result<Json<Expense>, ApiError> {
    Ok(Json(service.toggle_urgent(&expense_id, &caller).await?))
}

#[utoipa::path(
    post,
    path = "/api/expenses/{expense_id}/files/{field}",
    params(
        ("expense_id" = String, Path, description = "Expense ID"),
        ("field" = FileSlot, Path, description = "Attachment slot"),
        ("x-file-name" = String, Header, description = "Original file name")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "File attached", body = Expense),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 409, description = "Slot full or transition not allowed", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn upload_file(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path((expense_id, field)): Path<(String, FileSlot)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Expense>, ApiError> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let file = NewFile {
        name: header_value(FILE_NAME_HEADER).unwrap_or_default(),
        content_type: header_value(header::CONTENT_TYPE.as_str())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        content: body.to_vec(),
    };
    Ok(Json(service.attach_file(&expense_id, field, file, &caller).await?))
}

#[utoipa::path(
    get,
    path = "/api/expenses/{expense_id}/files/{field}/{index}",
    params(
        ("expense_id" = String, Path, description = "Expense ID"),
        ("field" = FileSlot, Path, description = "Attachment slot"),
        ("index" = usize, Path, description = "Position within the slot")
    ),
    responses(
        (status = 200, description = "File content; a staff download sends a new expense for payment"),
        (status = 307, description = "File could not be fetched; follow the raw URL"),
        (status = 404, description = "File not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn download_file(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path((expense_id, field, index)): Path<(String, FileSlot, usize)>,
) -> Result<Response, ApiError> {
    match service.download_file(&expense_id, field, index, &caller).await? {
        FileDownload::Delivered {
            file,
            content,
            status_advanced,
        } => {
            let disposition = format!("attachment; filename=\"{}\"", file.name.replace('"', ""));
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&file.content_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
            );
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            headers.insert(
                STATUS_ADVANCED_HEADER,
                HeaderValue::from_static(if status_advanced { "true" } else { "false" }),
            );
            Ok((StatusCode::OK, headers, content).into_response())
        }
        FileDownload::Fallback { url } => Ok(Redirect::temporary(&url).into_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/expenses/{expense_id}/download-and-send",
    params(("expense_id" = String, Path, description = "Expense ID")),
    responses(
        (status = 202, description = "Notification sent"),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn download_and_send(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(expense_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    service.download_and_send(&expense_id, &caller).await?;
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    get,
    path = "/api/expenses/{expense_id}/history",
    params(("expense_id" = String, Path, description = "Expense ID")),
    responses(
        (status = 200, description = "Change history", body = [ExpenseAudit]),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn expense_history(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
    Path(expense_id): Path<String>,
) -> Result<Json<Vec<ExpenseAudit>>, ApiError> {
    Ok(Json(service.expense_history(&expense_id, &caller).await?))
}

#[utoipa::path(
    get,
    path = "/api/logs",
    responses(
        (status = 200, description = "Application log", body = [AppLog]),
        (status = 403, description = "Not an administrator", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_app_logs(
    State(service): State<Arc<AppService>>,
    Extension(caller): Extension<User>,
) -> Result<Json<Vec<AppLog>>, ApiError> {
    Ok(Json(service.get_app_logs(&caller).await?))
}
