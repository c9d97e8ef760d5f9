use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomError {
    #[error("invalid markup: {0}")]
    InvalidMarkup(String),

    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("document unavailable: {0}")]
    Unavailable(String),
}

/// Which panel action a delegated click listener feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    /// Dropdown items carrying `data-entry-id` and `data-status`.
    StatusOption,
    /// Buttons carrying `data-entry-id`.
    ReportTrigger,
}

pub type ModalHiddenCallback = Box<dyn FnOnce() + Send>;

/// Element-level access to the host page.
///
/// Operations addressing a missing element report `Ok(false)` / `Ok(None)`;
/// `Err` is kept for a document that cannot be touched at all.
pub trait Dom: Send + Sync {
    fn set_inner_html(&self, id: &str, html: &str) -> Result<bool, DomError>;

    fn set_text(&self, id: &str, text: &str) -> Result<bool, DomError>;

    fn set_class_name(&self, id: &str, class_name: &str) -> Result<bool, DomError>;

    /// Current value of a form control.
    fn input_value(&self, id: &str) -> Result<Option<String>, DomError>;

    /// Values of the checked inputs named `input_name` inside `scope_id`.
    fn checked_values(&self, scope_id: &str, input_name: &str) -> Result<Vec<String>, DomError>;

    fn append_to_body(&self, html: &str) -> Result<(), DomError>;

    fn remove_element(&self, id: &str) -> Result<bool, DomError>;

    /// Attach `kind` to every element matching `selector` that lacks
    /// `marker_attr`, then set the marker. Returns how many were attached.
    fn attach_listener(
        &self,
        selector: &str,
        kind: ListenerKind,
        marker_attr: &str,
    ) -> Result<usize, DomError>;

    /// Remove `attr` from every element carrying it. Returns how many.
    fn strip_attribute(&self, attr: &str) -> Result<usize, DomError>;

    fn show_modal(&self, id: &str) -> Result<bool, DomError>;

    fn hide_modal(&self, id: &str) -> Result<bool, DomError>;

    /// Register a callback for the next "hidden" event of modal `id`.
    fn on_modal_hidden(&self, id: &str, callback: ModalHiddenCallback) -> Result<bool, DomError>;
}
