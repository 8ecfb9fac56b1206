use crate::core::budget::BudgetSummary;
use crate::core::errors::ExpenseError;
use crate::core::models::Category;
use crate::infrastructure::cache::{Cache, cache_keys};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

type Entries<T> = Arc<RwLock<HashMap<String, (T, DateTime<Utc>)>>>;

#[derive(Clone, Default)]
pub struct InMemoryCache {
    categories: Entries<Vec<Category>>,
    summaries: Entries<BudgetSummary>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn expiry(ttl: Duration) -> Result<DateTime<Utc>, ExpenseError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| ExpenseError::CacheError(format!("Failed to convert TTL: {}", e)))?;
    Ok(Utc::now() + ttl)
}

async fn read_fresh<T: Clone>(entries: &Entries<T>, key: &str) -> Option<T> {
    let expired = match entries.read().await.get(key) {
        Some((value, expires_at)) if *expires_at > Utc::now() => return Some(value.clone()),
        Some(_) => true,
        None => false,
    };
    if expired {
        entries.write().await.remove(key);
    }
    None
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_categories(&self, program_id: &str) -> Result<Option<Vec<Category>>, ExpenseError> {
        Ok(read_fresh(&self.categories, &cache_keys::program_categories_key(program_id)).await)
    }

    async fn save_categories(
        &self,
        program_id: &str,
        categories: &[Category],
        ttl: Duration,
    ) -> Result<(), ExpenseError> {
        let expires_at = expiry(ttl)?;
        self.categories.write().await.insert(
            cache_keys::program_categories_key(program_id),
            (categories.to_vec(), expires_at),
        );
        Ok(())
    }

    async fn invalidate_categories(&self, program_id: &str) -> Result<(), ExpenseError> {
        self.categories
            .write()
            .await
            .remove(&cache_keys::program_categories_key(program_id));
        Ok(())
    }

    async fn get_budget_summary(&self, program_id: &str) -> Result<Option<BudgetSummary>, ExpenseError> {
        Ok(read_fresh(&self.summaries, &cache_keys::budget_summary_key(program_id)).await)
    }

    async fn save_budget_summary(&self, summary: &BudgetSummary, ttl: Duration) -> Result<(), ExpenseError> {
        let expires_at = expiry(ttl)?;
        self.summaries.write().await.insert(
            cache_keys::budget_summary_key(&summary.program_id),
            (summary.clone(), expires_at),
        );
        Ok(())
    }

    async fn invalidate_budget_summary(&self, program_id: &str) -> Result<(), ExpenseError> {
        self.summaries
            .write()
            .await
            .remove(&cache_keys::budget_summary_key(program_id));
        Ok(())
    }
}
