pub fn program_categories_key(program_id: &str) -> String {
    format!("program_categories:{}", program_id)
}

pub fn budget_summary_key(program_id: &str) -> String {
    format!("budget_summary:{}", program_id)
}
