use serde::{Deserialize, Serialize};

use crate::model::EntryId;

/// Input from the shell. Page events drive the lifecycle, the rest are user
/// actions forwarded from delegated listeners.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    // Page lifecycle
    PageReady,
    PageUnload,
    VisibilityChanged {
        visible: bool,
    },

    // User actions
    StatusOptionSelected {
        entry_id: EntryId,
        status: String,
    },
    ReportRequested {
        entry_id: EntryId,
    },
    AutoUpdateToggled {
        enabled: bool,
    },
    RefreshRequested,
}

impl UiEvent {
    /// Parse an event posted by the shell as JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn entry_id(&self) -> Option<EntryId> {
        match self {
            Self::StatusOptionSelected { entry_id, .. } | Self::ReportRequested { entry_id } => {
                Some(*entry_id)
            }
            _ => None,
        }
    }
}
