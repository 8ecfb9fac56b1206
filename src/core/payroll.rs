//! Salary report figures.
//!
//! `amount` is what the payee receives and what the expense records.
//! `employer_cost` is what the program budget actually pays. Only the amount
//! and the final employer cost are rounded; the net-to-gross conversion keeps
//! full precision.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::constants::{EMPLOYER_COST_MULTIPLIER, MAX_AMOUNT, NET_TO_GROSS_FACTOR};
use crate::core::errors::ExpenseError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SalaryInput {
    pub rate: Decimal,
    pub quantity: u32,
    pub is_gross: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SalaryFigures {
    pub amount: Decimal,
    pub employer_cost: Decimal,
}

/// Half-up rounding to cents.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn derive_amount(rate: Decimal, quantity: u32) -> Decimal {
    round_money(rate * Decimal::from(quantity))
}

pub fn employer_cost(amount: Decimal, is_gross: bool) -> Decimal {
    let gross = if is_gross { amount } else { amount / NET_TO_GROSS_FACTOR };
    round_money(gross * EMPLOYER_COST_MULTIPLIER)
}

impl SalaryInput {
    pub fn validate(&self) -> Result<(), ExpenseError> {
        if self.rate <= Decimal::ZERO {
            return Err(ExpenseError::invalid(
                "rate",
                "Invalid Rate",
                "Rate must be greater than 0",
            ));
        }
        if self.quantity == 0 {
            return Err(ExpenseError::invalid(
                "quantity",
                "Invalid Quantity",
                "Quantity must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn compute(&self) -> Result<SalaryFigures, ExpenseError> {
        self.validate()?;
        let amount = self
            .rate
            .checked_mul(Decimal::from(self.quantity))
            .map(round_money)
            .filter(|amount| *amount <= MAX_AMOUNT)
            .ok_or_else(|| {
                ExpenseError::invalid(
                    "amount",
                    "Amount Too Large",
                    format!("Rate × quantity cannot exceed {}", MAX_AMOUNT),
                )
            })?;
        if amount <= Decimal::ZERO {
            return Err(ExpenseError::invalid(
                "amount",
                "Invalid Amount",
                "Rate × quantity rounds to zero",
            ));
        }
        Ok(SalaryFigures {
            amount,
            employer_cost: employer_cost(amount, self.is_gross),
        })
    }
}
