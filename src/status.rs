use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::api::ApiClient;
use crate::capabilities::{DashboardRefresh, Dom};
use crate::model::{DashboardSummary, EntryId, Severity};
use crate::notification::NotificationCenter;
use crate::{AppError, AppResult, ErrorKind, UNKNOWN_ERROR_MESSAGE};

/// The workflow states an entry moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    #[serde(rename = "Não iniciado")]
    NotStarted,
    #[serde(rename = "Em andamento")]
    InProgress,
    #[serde(rename = "Concluído")]
    Completed,
}

impl WorkflowStatus {
    pub const ALL: [Self; 3] = [Self::NotStarted, Self::InProgress, Self::Completed];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Não iniciado",
            Self::InProgress => "Em andamento",
            Self::Completed => "Concluído",
        }
    }

    #[must_use]
    pub const fn button_class(self) -> &'static str {
        match self {
            Self::NotStarted => "btn-danger",
            Self::InProgress => "btn-warning",
            Self::Completed => "btn-success",
        }
    }

    #[must_use]
    pub const fn outline_class(self) -> &'static str {
        match self {
            Self::NotStarted => "btn-outline-danger",
            Self::InProgress => "btn-outline-warning",
            Self::Completed => "btn-outline-success",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WorkflowStatus {
    type Err = ();

    /// Exact label match; the labels are what the server stores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.label() == s).ok_or(())
    }
}

#[must_use]
pub fn status_class(status: &str) -> &'static str {
    status
        .parse::<WorkflowStatus>()
        .map_or("btn-secondary", WorkflowStatus::button_class)
}

/// Style of a status entry inside the dropdown menu. Host-facing: the shell
/// renders the menu options.
#[must_use]
pub fn status_outline_class(status: &str) -> &'static str {
    status
        .parse::<WorkflowStatus>()
        .map_or("btn-outline-secondary", WorkflowStatus::outline_class)
}

#[must_use]
pub fn status_button_id(entry_id: EntryId) -> String {
    format!("status-btn-{entry_id}")
}

#[must_use]
pub fn status_button_class(status: &str) -> String {
    format!("btn {} btn-sm dropdown-toggle", status_class(status))
}

/// Sends status changes and reflects them on the entry's dropdown button.
#[derive(Clone)]
pub struct StatusUpdater {
    api: ApiClient,
    dom: Arc<dyn Dom>,
    notifications: NotificationCenter,
    dashboard: Option<Arc<dyn DashboardRefresh>>,
}

impl StatusUpdater {
    pub fn new(
        api: ApiClient,
        dom: Arc<dyn Dom>,
        notifications: NotificationCenter,
        dashboard: Option<Arc<dyn DashboardRefresh>>,
    ) -> Self {
        Self {
            api,
            dom,
            notifications,
            dashboard,
        }
    }

    /// Returns whether the change went through. Failures have already been
    /// logged and shown to the user when this returns `false`.
    #[instrument(skip(self), fields(entry_id = %entry_id))]
    pub async fn update_status(&self, entry_id: EntryId, status: &str) -> bool {
        match self.try_update_status(entry_id, status).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Erro ao atualizar status");
                self.notifications.notify(
                    &format!("Erro ao atualizar o status: {}", e.message),
                    Severity::Error,
                );
                false
            }
        }
    }

    async fn try_update_status(&self, entry_id: EntryId, status: &str) -> AppResult<()> {
        let response = self.api.update_status(entry_id, status).await?;
        if !response.success {
            return Err(AppError::new(
                ErrorKind::Domain,
                response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            ));
        }

        let button_id = status_button_id(entry_id);
        let found = self.dom.set_text(&button_id, status).and_then(|found| {
            self.dom
                .set_class_name(&button_id, &status_button_class(status))
                .map(|_| found)
        });
        match found {
            Ok(true) => {}
            Ok(false) => debug!(button_id, "status button not on page"),
            Err(e) => warn!(button_id, error = %e, "could not update status button"),
        }

        if let Some(payload) = response.dashboard.as_ref() {
            match DashboardSummary::from_payload(payload) {
                Some(summary) => debug!(
                    pedidos = summary.pedidos.total,
                    orcamentos = summary.orcamentos.total,
                    "dashboard atualizado"
                ),
                None => warn!("dashboard payload is not an object"),
            }
            if let Some(dashboard) = &self.dashboard {
                if let Err(e) = dashboard.refresh(payload) {
                    warn!(error = %e, "dashboard refresh failed");
                }
            }
        }

        debug!("Status atualizado para: {status}");
        Ok(())
    }
}
