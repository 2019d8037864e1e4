//! Monitoring context backed by the SQLite monitor store.

use std::sync::Arc;

use evalloop_core::{SampleRow, ScoredTable};
use evalloop_monitor::{MonitorStore, ResultRecord};

use crate::app::{MonitoringApplication, MonitoringContext};
use crate::judge::RowFailure;
use crate::JudgeError;

/// A monitoring window whose artifacts and result go to a [`MonitorStore`].
pub struct StoreContext {
    store: Arc<MonitorStore>,
    sample: Vec<SampleRow>,
    end_infer_time: String,
    failures: Vec<RowFailure>,
}

impl StoreContext {
    pub fn new(store: Arc<MonitorStore>, sample: Vec<SampleRow>, end_infer_time: impl Into<String>) -> Self {
        Self {
            store,
            sample,
            end_infer_time: end_infer_time.into(),
            failures: Vec::new(),
        }
    }

    /// Rows the last tracked application left out of its table.
    pub fn failures(&self) -> &[RowFailure] {
        &self.failures
    }

    /// Runs `app` over this window and persists the result it returns.
    pub async fn track(&mut self, app: &dyn MonitoringApplication) -> Result<ResultRecord, JudgeError> {
        self.failures.clear();
        let result = app.do_tracking(self).await?;
        let record = self.store.insert_result(&result, &self.end_infer_time)?;
        tracing::debug!(app = app.name(), result_id = %record.id, "Stored monitoring result");
        Ok(record)
    }
}

impl MonitoringContext for StoreContext {
    fn sample(&self) -> &[SampleRow] {
        &self.sample
    }

    fn end_infer_time(&self) -> &str {
        &self.end_infer_time
    }

    fn log_dataset(&mut self, key: &str, table: &ScoredTable, tag: &str) -> Result<(), JudgeError> {
        self.store.log_dataset(key, table, tag)?;
        Ok(())
    }

    fn report_failures(&mut self, failures: &[RowFailure]) {
        self.failures = failures.to_vec();
    }
}
