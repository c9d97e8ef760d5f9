use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capabilities::WatchHandle;
use crate::config::PanelConfig;
use crate::utils::is_image_filename;
use crate::{AppResult, DEFAULT_NOTIFICATION_DURATION_MS};

/// Backend record identifier (an order or a quote).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        }
    }

    /// Bootstrap alert modifier; errors render as `danger`.
    #[must_use]
    pub const fn alert_class(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "danger",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub message: String,
    pub severity: Severity,
    pub duration: Duration,
}

impl NotificationRequest {
    #[must_use]
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            duration: Duration::from_millis(DEFAULT_NOTIFICATION_DURATION_MS),
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: u64,
    pub filename: String,
}

impl AttachmentRef {
    #[must_use]
    pub fn is_image(&self) -> bool {
        is_image_filename(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportData {
    pub entry_id: EntryId,
    /// As typed in the form, normally `YYYY-MM-DD`.
    pub date: String,
    pub order_number: String,
    pub client_number: String,
    pub client_name: String,
    pub project: Option<String>,
    pub attachments: Vec<AttachmentRef>,
}

impl ReportData {
    #[must_use]
    pub fn modal_id(&self) -> String {
        crate::report::report_modal_id(self.entry_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub nao_iniciado: u64,
    #[serde(default)]
    pub em_andamento: u64,
    #[serde(default)]
    pub concluido: u64,
}

/// Typed view of the dashboard payload returned after a status change.
/// Host-facing; the raw payload is what reaches [`crate::capabilities::DashboardRefresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    #[serde(default)]
    pub pedidos: StatusCounts,
    #[serde(default)]
    pub orcamentos: StatusCounts,
}

impl DashboardSummary {
    #[must_use]
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        if !payload.is_object() {
            return None;
        }
        serde_json::from_value(payload.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub dashboard: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentsResponse {
    pub success: bool,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Timers and observers owned by one lifecycle.
#[derive(Default)]
pub struct Resources {
    pub auto_update: Option<JoinHandle<()>>,
    pub timers: Vec<JoinHandle<()>>,
    pub watchers: Vec<Box<dyn WatchHandle>>,
}

impl Resources {
    #[must_use]
    pub fn timer_count(&self) -> usize {
        self.timers.iter().filter(|t| !t.is_finished()).count()
            + usize::from(self.auto_update.is_some())
    }

    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.auto_update.is_none() && self.timers.is_empty() && self.watchers.is_empty()
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources")
            .field("auto_update", &self.auto_update.is_some())
            .field("timers", &self.timers.len())
            .field("watchers", &self.watchers.len())
            .finish()
    }
}

pub(crate) type InitOutcome = Option<AppResult<()>>;

/// The single per-page record. Only the lifecycle controller mutates it.
#[derive(Debug)]
pub struct SystemState {
    pub initialized: bool,
    pub initializing: bool,
    pub(crate) pending_init: Option<watch::Receiver<InitOutcome>>,
    pub auto_update_active: bool,
    pub update_interval_ms: u64,
    pub failed_attempts: u32,
    pub connection_ok: bool,
    pub last_update: Option<NaiveDateTime>,
    pub(crate) resources: Resources,
    pub(crate) epoch: u64,
}

impl SystemState {
    #[must_use]
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            initialized: false,
            initializing: false,
            pending_init: None,
            auto_update_active: config.auto_update,
            update_interval_ms: config.update_interval_ms,
            failed_attempts: 0,
            connection_ok: true,
            last_update: None,
            resources: Resources::default(),
            epoch: 0,
        }
    }

    /// Back to defaults, handing over whatever was still owned. The epoch
    /// moves on so an initialization started before the reset can tell.
    pub(crate) fn reset(&mut self, config: &PanelConfig) -> Resources {
        let epoch = self.epoch.wrapping_add(1);
        let previous = std::mem::replace(self, Self::new(config));
        self.epoch = epoch;
        previous.resources
    }

    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            initialized: self.initialized,
            initializing: self.initializing,
            init_pending: self.pending_init.is_some(),
            auto_update_active: self.auto_update_active,
            update_interval_ms: self.update_interval_ms,
            failed_attempts: self.failed_attempts,
            connection_ok: self.connection_ok,
            last_update: self.last_update,
            active_timers: self.resources.timer_count(),
            active_watchers: self.resources.watcher_count(),
        }
    }
}

/// Copy of [`SystemState`] for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub initialized: bool,
    pub initializing: bool,
    pub init_pending: bool,
    pub auto_update_active: bool,
    pub update_interval_ms: u64,
    pub failed_attempts: u32,
    pub connection_ok: bool,
    pub last_update: Option<NaiveDateTime>,
    pub active_timers: usize,
    pub active_watchers: usize,
}

impl StateSnapshot {
    #[must_use]
    pub fn defaults(config: &PanelConfig) -> Self {
        SystemState::new(config).snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_alert_class() {
        assert_eq!(Severity::Error.alert_class(), "danger");
        assert_eq!(Severity::Warning.alert_class(), "warning");
        assert_eq!(Severity::Info.to_string(), "info");
    }

    #[test]
    fn test_notification_request_defaults() {
        let request = NotificationRequest::new("Salvo", Severity::Success);
        assert_eq!(request.duration, Duration::from_millis(5_000));
        let short = request.with_duration(Duration::from_secs(1));
        assert_eq!(short.duration, Duration::from_secs(1));
    }

    #[test]
    fn test_status_response_optional_fields() {
        let parsed: StatusUpdateResponse = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(parsed.success);
        assert!(parsed.message.is_none());
        assert!(parsed.dashboard.is_none());
    }

    #[test]
    fn test_attachments_response_parses() {
        let parsed: AttachmentsResponse = serde_json::from_value(json!({
            "success": true,
            "attachments": [{"id": 1, "filename": "a.png"}, {"id": 2, "filename": "b.txt"}]
        }))
        .unwrap();
        assert_eq!(parsed.attachments.len(), 2);
        assert!(parsed.attachments[0].is_image());
        assert!(!parsed.attachments[1].is_image());
    }

    #[test]
    fn test_dashboard_summary_from_payload() {
        let payload = json!({
            "pedidos": {"total": 5, "nao_iniciado": 1, "em_andamento": 2, "concluido": 2},
            "orcamentos": {"total": 1, "nao_iniciado": 1, "em_andamento": 0, "concluido": 0}
        });
        let summary = DashboardSummary::from_payload(&payload).unwrap();
        assert_eq!(summary.pedidos.em_andamento, 2);
        assert_eq!(summary.orcamentos.total, 1);

        assert!(DashboardSummary::from_payload(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_report_modal_id() {
        let report = ReportData {
            entry_id: EntryId(12),
            date: "2024-05-01".into(),
            order_number: "100".into(),
            client_number: "C-9".into(),
            client_name: "Ana".into(),
            project: None,
            attachments: vec![],
        };
        assert_eq!(report.modal_id(), "report-preview-12");
    }

    #[test]
    fn test_reset_bumps_epoch_and_clears_flags() {
        let config = PanelConfig::default();
        let mut state = SystemState::new(&config);
        state.initialized = true;
        state.failed_attempts = 2;
        state.connection_ok = false;

        let released = state.reset(&config);
        assert!(released.is_empty());
        assert_eq!(state.epoch, 1);
        assert_eq!(state.snapshot(), StateSnapshot::defaults(&config));
    }
}
