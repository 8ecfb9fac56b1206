pub mod in_memory;

use crate::core::errors::ExpenseError;
use crate::core::models::FileSlot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Email telling the expense owner that its paperwork was picked up for payment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadNotice {
    pub expense_id: String,
    pub program_id: String,
    /// `None` when every attachment was sent at once.
    pub slot: Option<FileSlot>,
    pub requested_by: String,
    pub recipient: String,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send_download_notice(&self, notice: DownloadNotice) -> Result<(), ExpenseError>;
}
