use crate::core::errors::ExpenseError;
use crate::infrastructure::notifier::{DownloadNotice, Notifier};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Records notices instead of sending mail.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<Vec<DownloadNotice>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<DownloadNotice> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_download_notice(&self, notice: DownloadNotice) -> Result<(), ExpenseError> {
        info!(
            expense_id = %notice.expense_id,
            recipient = %notice.recipient,
            "download notice queued"
        );
        self.sent.write().await.push(notice);
        Ok(())
    }
}
