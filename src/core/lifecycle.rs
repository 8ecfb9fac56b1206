//! Expense status lifecycle.
//!
//! Regular invoices move `new → sent_for_payment → paid → receipt_uploaded → closed`.
//! `rejected` is terminal and only reachable from `new`. Petty cash and salary
//! entries carry a classification status and never move.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::core::models::{ExpenseKind, ExpenseStatus};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseAction {
    /// Someone fetched the invoice or bank details to start processing.
    DownloadFile,
    MarkPaid,
    UploadReceipt,
    Close,
    Reject,
    /// Next step of the lifecycle, decided by the server.
    Advance,
}

#[derive(Error, Debug, Clone, Serialize, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Expense is {0} and cannot change status")]
    Terminal(ExpenseStatus),

    #[error("Expenses with status {0} do not follow the payment lifecycle")]
    NotInLifecycle(ExpenseStatus),

    #[error("Action {action:?} is not allowed from status {from}")]
    NotAllowed { from: ExpenseStatus, action: ExpenseAction },

    #[error("A receipt must be uploaded before the expense can advance")]
    ReceiptRequired,
}

/// Status a freshly created expense of `kind` starts in.
pub fn initial_status(kind: ExpenseKind) -> ExpenseStatus {
    match kind {
        ExpenseKind::Invoice | ExpenseKind::Expected => ExpenseStatus::New,
        ExpenseKind::PettyCash => ExpenseStatus::PettyCash,
        ExpenseKind::Salary => ExpenseStatus::Salary,
    }
}

pub fn transition(current: ExpenseStatus, action: ExpenseAction) -> Result<ExpenseStatus, TransitionError> {
    use ExpenseAction as A;
    use ExpenseStatus as S;

    match current {
        S::Closed | S::Rejected => return Err(TransitionError::Terminal(current)),
        S::PettyCash | S::Salary => return Err(TransitionError::NotInLifecycle(current)),
        _ => {}
    }

    match (current, action) {
        (S::New, A::DownloadFile | A::Advance) => Ok(S::SentForPayment),
        (S::New, A::Reject) => Ok(S::Rejected),
        (S::SentForPayment, A::MarkPaid | A::Advance) => Ok(S::Paid),
        (S::SentForPayment | S::Paid | S::ReceiptUploaded, A::UploadReceipt) => Ok(S::ReceiptUploaded),
        (S::Paid, A::Advance) => Err(TransitionError::ReceiptRequired),
        (S::ReceiptUploaded, A::Close | A::Advance) => Ok(S::Closed),
        (from, action) => Err(TransitionError::NotAllowed { from, action }),
    }
}

impl ExpenseStatus {
    /// Moves `new` to `sent_for_payment`. Any other status is left untouched and
    /// `false` is returned, so repeated downloads advance at most once.
    pub fn advance_if_new(&mut self) -> bool {
        if *self != ExpenseStatus::New {
            return false;
        }
        match transition(*self, ExpenseAction::DownloadFile) {
            Ok(next) => {
                *self = next;
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExpenseStatus::Closed | ExpenseStatus::Rejected)
    }
}
