//! Optional page components the panel calls into when the host provides them.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::model::Severity;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("hook failed: {0}")]
    Failed(String),

    #[error("hook unavailable")]
    Unavailable,
}

/// The page's own notification widget.
pub trait HostNotifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity) -> Result<(), HookError>;
}

/// Re-renders dashboard counters from the payload sent after a status change.
pub trait DashboardRefresh: Send + Sync {
    fn refresh(&self, payload: &serde_json::Value) -> Result<(), HookError>;
}

/// Re-applies overlay protection after the page mutated.
pub trait ModalProtection: Send + Sync {
    fn protect(&self) -> Result<(), HookError>;
}

/// Re-attaches attachment widgets when a hidden tab becomes visible again.
pub trait AttachmentRestore: Send + Sync {
    fn restore(&self) -> Result<(), HookError>;
}

/// One round of the periodic refresh. Returns the server clock when known.
#[async_trait]
pub trait AutoRefresh: Send + Sync {
    async fn refresh(&self) -> Result<Option<NaiveDateTime>, HookError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
