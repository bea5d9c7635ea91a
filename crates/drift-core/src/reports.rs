use tokio::sync::Mutex;
use uuid::Uuid;

use drift_types::models::Report;

/// Append-only ledger of abuse reports. The engine only ever writes;
/// reading is for the external moderation consumer and for tests.
#[derive(Default)]
pub struct ReportLedger {
    entries: Mutex<Vec<Report>>,
}

impl ReportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, report: Report) {
        self.entries.lock().await.push(report);
    }

    pub async fn all(&self) -> Vec<Report> {
        self.entries.lock().await.clone()
    }

    pub async fn for_session(&self, session_id: Uuid) -> Vec<Report> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }
}
