use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use registrar::registry::{Notice, NotificationSink, NotifyError, Recipient};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Sink that writes every notice to the service log. Stands in for the
/// campus mail relay until that integration lands.
#[derive(Debug, Default, Clone)]
pub(crate) struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, recipient: Recipient, notice: Notice) -> Result<(), NotifyError> {
        info!(?recipient, kind = ?notice.kind, message = %notice.message, "notice");
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
