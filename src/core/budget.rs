use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::models::{Expense, ExpenseKind, Program};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BudgetAlert {
    None,
    Mild,
    Strong,
    Urgent,
    OverBudget,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct BudgetSummary {
    pub program_id: String,
    pub program_name: String,
    pub total_budget: Decimal,
    pub base_budget: Option<Decimal>,
    pub extra_budget: Option<Decimal>,
    pub income: Option<Decimal>,
    pub actual_expenses: Decimal,
    pub expected_expenses: Decimal,
    pub total_expenses: Decimal,
    pub remaining_balance: Decimal,
    pub percent_left: u32,
    pub alert: BudgetAlert,
    pub creation_blocked: bool,
}

/// `max(0, round(remaining / total × 100))`; a program without budget has nothing left.
pub fn percent_left(remaining_balance: Decimal, total_budget: Decimal) -> u32 {
    if total_budget <= Decimal::ZERO || remaining_balance <= Decimal::ZERO {
        return 0;
    }
    (remaining_balance / total_budget * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(u32::MAX)
}

pub fn alert_for(percent_left: u32, remaining_balance: Decimal) -> BudgetAlert {
    if remaining_balance < Decimal::ZERO {
        return BudgetAlert::OverBudget;
    }
    match percent_left {
        20.. => BudgetAlert::None,
        10..=19 => BudgetAlert::Mild,
        5..=9 => BudgetAlert::Strong,
        _ => BudgetAlert::Urgent,
    }
}

/// Blocks new expenses once the overage reaches `margin` (a fraction) of the total budget.
pub fn creation_blocked(remaining_balance: Decimal, total_budget: Decimal, margin: Decimal) -> bool {
    if remaining_balance >= Decimal::ZERO {
        return false;
    }
    -remaining_balance >= margin * total_budget.max(Decimal::ZERO)
}

pub fn summarize(program: &Program, expenses: &[Expense], over_budget_margin: Decimal) -> BudgetSummary {
    let (expected, actual): (Vec<&Expense>, Vec<&Expense>) = expenses
        .iter()
        .filter(|e| e.program_id == program.id)
        .partition(|e| e.kind == ExpenseKind::Expected);

    let actual_expenses: Decimal = actual.iter().map(|e| e.budget_impact()).sum();
    let expected_expenses: Decimal = expected.iter().map(|e| e.budget_impact()).sum();
    let total_expenses = actual_expenses + expected_expenses;
    let total_budget = program.total_budget();
    let remaining_balance = total_budget - total_expenses;
    let percent_left = percent_left(remaining_balance, total_budget);

    BudgetSummary {
        program_id: program.id.clone(),
        program_name: program.name.clone(),
        total_budget,
        base_budget: Some(program.base_budget),
        extra_budget: program.extra_budget,
        income: program.income,
        actual_expenses,
        expected_expenses,
        total_expenses,
        remaining_balance,
        percent_left,
        alert: alert_for(percent_left, remaining_balance),
        creation_blocked: creation_blocked(remaining_balance, total_budget, over_budget_margin),
    }
}
