use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::capabilities::{Dom, HostNotifier};
use crate::model::{NotificationRequest, Severity};
use crate::utils::escape_html;

const BANNER_STYLE: &str = "position: fixed; top: 20px; right: 20px; z-index: 9999; max-width: 300px;";

/// Where a notification ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Host,
    Banner { element_id: String },
    Console,
}

/// Fallback banner markup.
#[must_use]
pub fn render_banner(element_id: &str, message: &str, severity: Severity) -> String {
    format!(
        concat!(
            r#"<div id="{id}" class="alert alert-{class} alert-dismissible fade show" role="alert" style="{style}">"#,
            "{message}",
            r#"<button type="button" class="close" data-dismiss="alert" aria-label="Fechar">"#,
            r#"<span aria-hidden="true">&times;</span></button></div>"#
        ),
        id = element_id,
        class = severity.alert_class(),
        style = BANNER_STYLE,
        message = escape_html(message),
    )
}

/// Shows transient messages. Never fails outward.
#[derive(Clone)]
pub struct NotificationCenter {
    dom: Arc<dyn Dom>,
    host: Option<Arc<dyn HostNotifier>>,
    default_duration: Duration,
}

impl NotificationCenter {
    pub fn new(
        dom: Arc<dyn Dom>,
        host: Option<Arc<dyn HostNotifier>>,
        default_duration: Duration,
    ) -> Self {
        Self {
            dom,
            host,
            default_duration,
        }
    }

    #[must_use]
    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Show with the configured default duration.
    pub fn notify(&self, message: &str, severity: Severity) -> Delivery {
        self.show(message, severity, self.default_duration)
    }

    pub fn show_request(&self, request: &NotificationRequest) -> Delivery {
        self.show(&request.message, request.severity, request.duration)
    }

    pub fn show(&self, message: &str, severity: Severity, duration: Duration) -> Delivery {
        if let Some(host) = &self.host {
            return match host.notify(message, severity) {
                Ok(()) => Delivery::Host,
                Err(e) => {
                    error!(error = %e, "Erro ao exibir notificação");
                    console_fallback(message, severity)
                }
            };
        }

        let element_id = format!("notification-{}", uuid::Uuid::new_v4());
        let markup = render_banner(&element_id, message, severity);
        if let Err(e) = self.dom.append_to_body(&markup) {
            error!(error = %e, "Erro ao exibir notificação");
            return console_fallback(message, severity);
        }

        self.schedule_removal(element_id.clone(), duration);
        Delivery::Banner { element_id }
    }

    fn schedule_removal(&self, element_id: String, duration: Duration) {
        let Ok(runtime) = Handle::try_current() else {
            debug!(element_id, "no runtime, banner left for manual dismissal");
            return;
        };
        let dom = Arc::clone(&self.dom);
        runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            // Already dismissed by the user is fine.
            if let Err(e) = dom.remove_element(&element_id) {
                debug!(element_id, error = %e, "banner removal failed");
            }
        });
    }
}

fn console_fallback(message: &str, severity: Severity) -> Delivery {
    info!(target: "control_panel::console", "Notificação [{severity}]: {message}");
    Delivery::Console
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDom, RecordingNotifier};
    use assert_matches::assert_matches;

    #[test]
    fn test_render_banner_escapes_and_maps_error_to_danger() {
        let html = render_banner("notification-1", "<b>falhou</b>", Severity::Error);
        assert!(html.contains(r#"id="notification-1""#));
        assert!(html.contains("alert alert-danger alert-dismissible fade show"));
        assert!(html.contains("position: fixed"));
        assert!(html.contains("&lt;b&gt;falhou&lt;/b&gt;"));
        assert!(!html.contains("<b>"));
    }

    #[tokio::test]
    async fn test_host_notifier_is_preferred() {
        let dom = Arc::new(FakeDom::new());
        let host = Arc::new(RecordingNotifier::new());
        let center = NotificationCenter::new(dom.clone(), Some(host.clone()), Duration::from_secs(5));

        let delivery = center.notify("Salvo", Severity::Success);
        assert_eq!(delivery, Delivery::Host);
        assert_eq!(host.messages(), vec![("Salvo".to_string(), Severity::Success)]);
        assert!(dom.appended().is_empty());
    }

    #[tokio::test]
    async fn test_failing_host_degrades_to_console() {
        let dom = Arc::new(FakeDom::new());
        let host = Arc::new(RecordingNotifier::failing());
        let center = NotificationCenter::new(dom.clone(), Some(host), Duration::from_secs(5));

        assert_eq!(center.notify("x", Severity::Info), Delivery::Console);
        assert!(dom.appended().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_is_removed_after_duration() {
        let dom = Arc::new(FakeDom::new());
        let center = NotificationCenter::new(dom.clone(), None, Duration::from_secs(5));

        let delivery = center.show("Atenção", Severity::Warning, Duration::from_millis(200));
        let element_id = assert_matches!(delivery, Delivery::Banner { element_id } => element_id);
        assert!(element_id.starts_with("notification-"));
        assert!(dom.element(&element_id).is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(dom.element(&element_id).is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(dom.element(&element_id).is_none());
    }

    #[tokio::test]
    async fn test_append_failure_degrades_to_console() {
        let dom = Arc::new(FakeDom::new().failing_appends());
        let center = NotificationCenter::new(dom, None, Duration::from_secs(5));
        assert_eq!(center.notify("x", Severity::Error), Delivery::Console);
    }
}
