pub mod budget;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod payroll;
pub mod services;
