mod dom;
mod hooks;
mod http;
mod watch;

use std::fmt;
use std::sync::Arc;

pub use self::dom::{Dom, DomError, ListenerKind, ModalHiddenCallback};
pub use self::hooks::{
    AttachmentRestore, AutoRefresh, Clock, DashboardRefresh, HookError, HostNotifier,
    ModalProtection, SystemClock,
};
pub use self::http::{
    HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    DEFAULT_TIMEOUT_MS,
};
pub use self::watch::{NoopWatcher, RegionWatcher, ViolationHandler, WatchHandle, WatchRegion};

/// Everything the panel needs from its host. `http` and `dom` are required;
/// the rest fall back to no-ops or the system clock.
#[derive(Clone)]
pub struct Capabilities {
    pub http: Arc<dyn HttpTransport>,
    pub dom: Arc<dyn Dom>,
    pub watcher: Arc<dyn RegionWatcher>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Option<Arc<dyn HostNotifier>>,
    pub dashboard: Option<Arc<dyn DashboardRefresh>>,
    pub modal_protection: Option<Arc<dyn ModalProtection>>,
    pub attachment_restore: Option<Arc<dyn AttachmentRestore>>,
    pub auto_refresh: Option<Arc<dyn AutoRefresh>>,
}

impl Capabilities {
    pub fn new(http: Arc<dyn HttpTransport>, dom: Arc<dyn Dom>) -> Self {
        Self {
            http,
            dom,
            watcher: Arc::new(NoopWatcher),
            clock: Arc::new(SystemClock),
            notifier: None,
            dashboard: None,
            modal_protection: None,
            attachment_restore: None,
            auto_refresh: None,
        }
    }

    #[must_use]
    pub fn with_watcher(mut self, watcher: Arc<dyn RegionWatcher>) -> Self {
        self.watcher = watcher;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn HostNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn with_dashboard(mut self, dashboard: Arc<dyn DashboardRefresh>) -> Self {
        self.dashboard = Some(dashboard);
        self
    }

    #[must_use]
    pub fn with_modal_protection(mut self, protection: Arc<dyn ModalProtection>) -> Self {
        self.modal_protection = Some(protection);
        self
    }

    #[must_use]
    pub fn with_attachment_restore(mut self, restore: Arc<dyn AttachmentRestore>) -> Self {
        self.attachment_restore = Some(restore);
        self
    }

    #[must_use]
    pub fn with_auto_refresh(mut self, refresh: Arc<dyn AutoRefresh>) -> Self {
        self.auto_refresh = Some(refresh);
        self
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("notifier", &self.notifier.is_some())
            .field("dashboard", &self.dashboard.is_some())
            .field("modal_protection", &self.modal_protection.is_some())
            .field("attachment_restore", &self.attachment_restore.is_some())
            .field("auto_refresh", &self.auto_refresh.is_some())
            .finish_non_exhaustive()
    }
}
