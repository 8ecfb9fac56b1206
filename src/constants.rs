use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Audit action names
pub const USER_CREATED: &str = "USER_CREATED";
pub const PROGRAM_CREATED: &str = "PROGRAM_CREATED";
pub const PROGRAM_UPDATED: &str = "PROGRAM_UPDATED";
pub const PROGRAM_ASSIGNED: &str = "PROGRAM_ASSIGNED";
pub const PROGRAM_UNASSIGNED: &str = "PROGRAM_UNASSIGNED";
pub const CATEGORY_CREATED: &str = "CATEGORY_CREATED";
pub const EXPENSE_CREATED: &str = "EXPENSE_CREATED";
pub const EXPENSE_UPDATED: &str = "EXPENSE_UPDATED";
pub const EXPENSE_DELETED: &str = "EXPENSE_DELETED";
pub const STATUS_CHANGED: &str = "STATUS_CHANGED";
pub const PRIORITY_TOGGLED: &str = "PRIORITY_TOGGLED";
pub const FILE_ATTACHED: &str = "FILE_ATTACHED";
pub const FILE_DOWNLOADED: &str = "FILE_DOWNLOADED";
pub const DOWNLOAD_SENT: &str = "DOWNLOAD_SENT";

/// Statutory payroll overhead applied on top of a gross salary.
pub const EMPLOYER_COST_MULTIPLIER: Decimal = dec!(1.151);
/// Net salary divided by this factor gives the gross salary.
pub const NET_TO_GROSS_FACTOR: Decimal = dec!(0.8783);

pub const MAX_AMOUNT: Decimal = dec!(10000000);
pub const MAX_TEXT_LENGTH: usize = 255;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

pub const CATEGORY_CACHE_TTL_SECS: u64 = 600;
pub const BUDGET_CACHE_TTL_SECS: u64 = 60;

/// Shown to clients whenever a failure detail must not leak ("Save failed, try again").
pub const GENERIC_SAVE_FAILED: &str = "שמירה נכשלה. נסו שוב";
