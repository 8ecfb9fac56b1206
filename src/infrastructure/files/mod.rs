pub mod in_memory;

use crate::core::errors::ExpenseError;
use crate::core::models::FileSlot;
use async_trait::async_trait;

/// Position of one attachment: expense, slot, and index within the slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileKey {
    pub expense_id: String,
    pub slot: FileSlot,
    pub index: usize,
}

impl FileKey {
    pub fn new(expense_id: &str, slot: FileSlot, index: usize) -> Self {
        FileKey {
            expense_id: expense_id.to_string(),
            slot,
            index,
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.expense_id, self.slot, self.index)
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, key: &FileKey, content: Vec<u8>) -> Result<(), ExpenseError>;
    async fn fetch(&self, key: &FileKey) -> Result<Vec<u8>, ExpenseError>;
    async fn remove(&self, key: &FileKey) -> Result<(), ExpenseError>;
    async fn remove_expense_files(&self, expense_id: &str) -> Result<(), ExpenseError>;
    /// Direct link to the stored object, used when fetching through the service fails.
    fn raw_url(&self, key: &FileKey) -> String;
}
