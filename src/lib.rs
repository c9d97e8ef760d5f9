// lib.rs - control panel core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod api;
pub mod capabilities;
pub mod config;
pub mod connection;
pub mod event;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod notification;
pub mod report;
pub mod status;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use capabilities::Capabilities;
pub use config::PanelConfig;
pub use event::UiEvent;
pub use lifecycle::PanelController;
pub use model::{
    AttachmentRef, EntryId, NotificationRequest, ReportData, Severity, StateSnapshot, SystemState,
};

pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 3;
pub const DEFAULT_DEBOUNCE_DELAY_MS: u64 = 50;
pub const DEFAULT_NOTIFICATION_DURATION_MS: u64 = 5_000;
pub const DEFAULT_VISIBILITY_RESTORE_DELAY_MS: u64 = 100;

pub const CONNECTION_STATUS_ID: &str = "connection-status";
pub const LAST_UPDATE_TIME_ID: &str = "last-update-time";
pub const LISTENER_MARKER_ATTR: &str = "data-listener-attached";
pub const STATUS_OPTION_SELECTOR: &str = "[data-status-option]";
pub const REPORT_TRIGGER_SELECTOR: &str = "[data-report-trigger]";

/// Extensions shown in the report gallery, compared lowercase.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

pub const UNKNOWN_ERROR_MESSAGE: &str = "Erro desconhecido";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The server answered with a non-success HTTP status.
    Transport,
    /// The server answered 2xx but flagged a logical failure.
    Domain,
    Network,
    Timeout,
    Decode,
    Initialization,
    Teardown,
    Dom,
    Hook,
    Config,
    Cancelled,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT_ERROR",
            Self::Domain => "DOMAIN_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Decode => "DECODE_ERROR",
            Self::Initialization => "INITIALIZATION_ERROR",
            Self::Teardown => "TEARDOWN_ERROR",
            Self::Dom => "DOM_ERROR",
            Self::Hook => "HOOK_ERROR",
            Self::Config => "CONFIG_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Transport | Self::Network | Self::Timeout | Self::Cancelled => {
                ErrorSeverity::Transient
            }

            Self::Domain | Self::Decode | Self::Dom | Self::Hook | Self::Config => {
                ErrorSeverity::Permanent
            }

            Self::Initialization | Self::Teardown => ErrorSeverity::Fatal,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Transport | Self::Network | Self::Timeout | Self::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && matches!(self.severity, ErrorSeverity::Transient)
    }

    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        self.context.get("http_status").and_then(|s| s.parse().ok())
    }

    /// Portuguese text for the panel user, with the underlying message appended.
    #[must_use]
    pub fn user_facing_message(&self) -> String {
        let lead = match self.kind {
            ErrorKind::Transport => "O servidor recusou o pedido",
            ErrorKind::Domain => "Operação não realizada",
            ErrorKind::Network => "Não foi possível conectar ao servidor",
            ErrorKind::Timeout => "O servidor demorou demasiado a responder",
            ErrorKind::Decode => "Resposta inválida do servidor",
            ErrorKind::Initialization => "Falha na inicialização do painel",
            ErrorKind::Teardown => "Erro ao encerrar o painel",
            ErrorKind::Dom => "Erro ao atualizar a página",
            ErrorKind::Hook => "Erro num componente da página",
            ErrorKind::Config => "Configuração inválida",
            ErrorKind::Cancelled => "Operação cancelada",
        };
        if self.message.is_empty() {
            lead.to_string()
        } else {
            format!("{lead}: {}", self.message)
        }
    }

    /// Classify a non-success response. The server's own `message`, when the
    /// body carries one, is kept as the internal message.
    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let server_message = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty());

        let mut error = Self::new(ErrorKind::Transport, format!("HTTP error! status: {status}"))
            .with_context("http_status", status.to_string());
        if let Some(message) = server_message {
            error = error.with_internal(message);
        }
        if (400..500).contains(&status) && status != 408 && status != 429 {
            error = error.with_severity(ErrorSeverity::Permanent);
        }
        error
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

pub type AppResult<T> = Result<T, AppError>;

impl From<capabilities::HttpError> for AppError {
    fn from(e: capabilities::HttpError) -> Self {
        use capabilities::HttpError;

        let kind = match &e {
            HttpError::Network { .. } => ErrorKind::Network,
            HttpError::Timeout { .. } => ErrorKind::Timeout,
            HttpError::Deserialization { .. } => ErrorKind::Decode,
            HttpError::InvalidRequest { .. }
            | HttpError::InvalidHeader { .. }
            | HttpError::Serialization { .. } => ErrorKind::Config,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<capabilities::DomError> for AppError {
    fn from(e: capabilities::DomError) -> Self {
        AppError::new(ErrorKind::Dom, e.to_string())
    }
}

impl From<capabilities::HookError> for AppError {
    fn from(e: capabilities::HookError) -> Self {
        AppError::new(ErrorKind::Hook, e.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::new(ErrorKind::Config, e.to_string())
    }
}
