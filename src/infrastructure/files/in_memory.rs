use crate::core::errors::ExpenseError;
use crate::infrastructure::files::{FileKey, FileStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemoryFileStore {
    base_url: String,
    objects: Arc<RwLock<HashMap<FileKey, Vec<u8>>>>,
}

impl InMemoryFileStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        InMemoryFileStore {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn put(&self, key: &FileKey, content: Vec<u8>) -> Result<(), ExpenseError> {
        self.objects.write().await.insert(key.clone(), content);
        Ok(())
    }

    async fn fetch(&self, key: &FileKey) -> Result<Vec<u8>, ExpenseError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ExpenseError::FileStoreError(format!("object {} is missing", key.path())))
    }

    async fn remove(&self, key: &FileKey) -> Result<(), ExpenseError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn remove_expense_files(&self, expense_id: &str) -> Result<(), ExpenseError> {
        self.objects.write().await.retain(|key, _| key.expense_id != expense_id);
        Ok(())
    }

    fn raw_url(&self, key: &FileKey) -> String {
        format!("{}/{}", self.base_url, key.path())
    }
}
