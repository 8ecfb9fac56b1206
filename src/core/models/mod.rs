pub mod audit;
pub mod expense;
pub mod program;
pub mod user;

pub use audit::{AppLog, ExpenseAudit};
pub use expense::{
    Expense, ExpenseFiles, ExpenseFilter, ExpenseKind, ExpensePage, ExpenseSort, ExpenseStatus, FileRef, FileSlot,
    Priority, SalaryDetails,
};
pub use program::{Category, Program, ProgramUpdate};
pub use user::{User, UserRole};
