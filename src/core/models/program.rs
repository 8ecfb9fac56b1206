use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub base_budget: Decimal,
    pub extra_budget: Option<Decimal>,
    pub income: Option<Decimal>,
}

impl Program {
    pub fn total_budget(&self) -> Decimal {
        self.base_budget + self.extra_budget.unwrap_or_default() + self.income.unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ProgramUpdate {
    pub name: Option<String>,
    pub base_budget: Option<Decimal>,
    /// Zero clears the figure.
    pub extra_budget: Option<Decimal>,
    /// Zero clears the figure.
    pub income: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub program_id: String,
    pub name: String,
}
