//! The panel controller: one-time setup, shared in-flight initialization,
//! and teardown of everything setup acquired.
//!
//! `Uninitialized -> Initializing -> Initialized -> Uninitialized`; `destroy`
//! is accepted in any state and cancels an initialization still in flight.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::api::ApiClient;
use crate::capabilities::{Capabilities, ListenerKind, ViolationHandler, WatchRegion};
use crate::config::PanelConfig;
use crate::connection::ConnectionIndicator;
use crate::event::UiEvent;
use crate::model::{
    EntryId, InitOutcome, NotificationRequest, ReportData, Resources, Severity, StateSnapshot,
    SystemState,
};
use crate::notification::{Delivery, NotificationCenter};
use crate::report::{ReportGenerator, ReportModalBuilder};
use crate::status::StatusUpdater;
use crate::utils::Debouncer;
use crate::{
    AppError, AppResult, ErrorKind, LISTENER_MARKER_ATTR, REPORT_TRIGGER_SELECTOR,
    STATUS_OPTION_SELECTOR,
};

pub const CONNECTION_LOST_MESSAGE: &str = "Conexão com o servidor perdida. Tentando reconectar...";

/// Handle to the page's single panel. Clones share the same state.
#[derive(Clone)]
pub struct PanelController {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<PanelConfig>,
    caps: Capabilities,
    state: Mutex<SystemState>,
    notifications: NotificationCenter,
    connection: ConnectionIndicator,
    status: StatusUpdater,
    reports: ReportGenerator,
    report_builder: ReportModalBuilder,
    protect: Debouncer,
}

impl PanelController {
    pub fn new(config: PanelConfig, caps: Capabilities) -> AppResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let api = ApiClient::new(Arc::clone(&caps.http), Arc::clone(&config));
        let notifications = NotificationCenter::new(
            Arc::clone(&caps.dom),
            caps.notifier.clone(),
            Duration::from_millis(config.notification_duration_ms),
        );
        let connection = ConnectionIndicator::new(Arc::clone(&caps.dom), Arc::clone(&caps.clock));
        let status = StatusUpdater::new(
            api.clone(),
            Arc::clone(&caps.dom),
            notifications.clone(),
            caps.dashboard.clone(),
        );
        let report_builder = ReportModalBuilder::new(Arc::clone(&caps.dom), config.uploads_prefix());
        let reports = ReportGenerator::new(api, Arc::clone(&caps.dom), report_builder.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SystemState::new(&config)),
                protect: Debouncer::new(Duration::from_millis(config.debounce_delay_ms)),
                config,
                caps,
                notifications,
                connection,
                status,
                reports,
                report_builder,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PanelConfig {
        &self.inner.config
    }

    /// Bring the panel up. Already initialized is a no-op; a call made while
    /// another initialization is in flight resolves with that run's outcome.
    #[instrument(skip(self))]
    pub async fn init(&self) -> AppResult<()> {
        let outcome = {
            let mut state = self.inner.state.lock().await;
            if state.initialized {
                debug!("Sistema já inicializado");
                return Ok(());
            }

            let pending = if state.initializing {
                state.pending_init.clone()
            } else {
                None
            };
            match pending {
                Some(rx) => {
                    debug!("Inicialização já em andamento");
                    rx
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.initializing = true;
                    state.pending_init = Some(rx.clone());
                    self.inner.spawn_init(state.epoch, tx);
                    rx
                }
            }
        };

        wait_for_outcome(outcome).await
    }

    /// Release everything and return to defaults. Never fails.
    #[instrument(skip(self))]
    pub async fn destroy(&self) {
        debug!("Destruindo sistema...");
        let released = {
            let mut state = self.inner.state.lock().await;
            state.reset(&self.inner.config)
        };
        self.inner.protect.cancel();
        self.inner.release(released);
        self.inner.strip_markers();
        debug!("Sistema destruído com sucesso");
    }

    pub async fn state(&self) -> StateSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.state.lock().await.initialized
    }

    /// See [`StatusUpdater::update_status`].
    pub async fn update_status(&self, entry_id: EntryId, status: &str) -> bool {
        self.inner.status.update_status(entry_id, status).await
    }

    pub fn notify(&self, message: &str, severity: Severity) -> Delivery {
        self.inner.notifications.notify(message, severity)
    }

    pub fn show_notification(&self, request: &NotificationRequest) -> Delivery {
        self.inner.notifications.show_request(request)
    }

    pub async fn update_connection(&self, is_connected: bool, server_time: Option<NaiveDateTime>) {
        let mut state = self.inner.state.lock().await;
        self.inner
            .connection
            .update_status(&mut state, is_connected, server_time);
    }

    /// Read the entry's report form and open the preview. Failures are also
    /// shown to the user.
    pub async fn generate_report(&self, entry_id: EntryId) -> AppResult<String> {
        let result = self.inner.reports.generate(entry_id).await;
        if let Err(e) = &result {
            error!(error = %e, "Erro ao gerar relatório");
            self.inner.notifications.notify(
                &format!("Erro ao gerar relatório: {}", e.message),
                Severity::Error,
            );
        }
        result
    }

    pub fn open_report(&self, report: &ReportData) -> AppResult<String> {
        self.inner.report_builder.open(report)
    }

    pub async fn set_auto_update(&self, enabled: bool) {
        let mut state = self.inner.state.lock().await;
        state.auto_update_active = enabled;
        if enabled {
            if state.initialized && state.resources.auto_update.is_none() {
                let handle = self.inner.spawn_auto_update(state.update_interval_ms);
                state.resources.auto_update = Some(handle);
            }
        } else if let Some(handle) = state.resources.auto_update.take() {
            handle.abort();
        }
        debug!(enabled, "auto-update toggled");
    }

    /// One refresh round now, whether or not the loop is running.
    pub async fn refresh_now(&self) {
        self.inner.refresh_tick(true).await;
    }

    /// Schedule re-protection of overlays when the page becomes visible.
    pub async fn handle_visibility_change(&self, visible: bool) {
        if !visible {
            return;
        }
        let mut state = self.inner.state.lock().await;
        if !state.initialized {
            return;
        }

        let inner = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.config.visibility_restore_delay_ms);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.restore_after_visible();
            }
        });
        state.resources.timers.retain(|t| !t.is_finished());
        state.resources.timers.push(timer);
    }

    pub async fn dispatch(&self, event: UiEvent) {
        match event {
            UiEvent::PageReady => {
                if let Err(e) = self.init().await {
                    error!(error = %e, "Falha na inicialização automática do painel");
                }
            }
            UiEvent::PageUnload => self.destroy().await,
            UiEvent::VisibilityChanged { visible } => self.handle_visibility_change(visible).await,
            UiEvent::StatusOptionSelected { entry_id, status } => {
                self.update_status(entry_id, &status).await;
            }
            UiEvent::ReportRequested { entry_id } => {
                let _ = self.generate_report(entry_id).await;
            }
            UiEvent::AutoUpdateToggled { enabled } => self.set_auto_update(enabled).await,
            UiEvent::RefreshRequested => self.refresh_now().await,
        }
    }
}

async fn wait_for_outcome(mut rx: watch::Receiver<InitOutcome>) -> AppResult<()> {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => match &*outcome {
            Some(result) => result.clone(),
            None => Err(AppError::new(ErrorKind::Initialization, "sem resultado")),
        },
        Err(_) => Err(AppError::new(
            ErrorKind::Cancelled,
            "Inicialização interrompida",
        )),
    }
}

fn init_error(step: &'static str, cause: &AppError) -> AppError {
    AppError::new(
        ErrorKind::Initialization,
        format!("{step}: {}", cause.message),
    )
    .with_internal(cause.to_string())
    .with_context("step", step)
}

impl Inner {
    /// Run initialization on its own task so every waiter shares one run,
    /// even if the first caller stops polling.
    fn spawn_init(self: &Arc<Self>, epoch: u64, tx: watch::Sender<InitOutcome>) {
        let run = tokio::spawn(Arc::clone(self).run_init(epoch));
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match run.await {
                Ok(result) => result,
                Err(join) => {
                    inner.abandon_init(epoch).await;
                    error!(error = %join, "Erro crítico na inicialização");
                    Err(
                        AppError::new(ErrorKind::Initialization, "Erro crítico na inicialização")
                            .with_internal(join.to_string()),
                    )
                }
            };
            let _ = tx.send(Some(outcome));
        });
    }

    async fn run_init(self: Arc<Self>, epoch: u64) -> AppResult<()> {
        let stale = std::mem::take(&mut self.state.lock().await.resources);
        if !stale.is_empty() {
            debug!(?stale, "releasing stale resources");
        }
        self.release(stale);
        self.strip_markers();

        let mut acquired = Resources::default();
        let result = self.setup(&mut acquired).await;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            drop(state);
            self.release(acquired);
            info!("initialization cancelled by destroy");
            return Err(AppError::new(
                ErrorKind::Cancelled,
                "Inicialização cancelada",
            ));
        }

        state.initializing = false;
        state.pending_init = None;
        match result {
            Ok(()) => {
                state.resources = acquired;
                state.initialized = true;
                info!("Sistema inicializado com sucesso");
                Ok(())
            }
            Err(e) => {
                drop(state);
                self.release(acquired);
                self.strip_markers();
                error!(error = %e, "Falha na inicialização");
                Err(e)
            }
        }
    }

    async fn abandon_init(&self, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch == epoch {
            state.initializing = false;
            state.pending_init = None;
        }
    }

    async fn setup(self: &Arc<Self>, acquired: &mut Resources) -> AppResult<()> {
        self.attach(STATUS_OPTION_SELECTOR, ListenerKind::StatusOption)
            .map_err(|e| init_error("status", &e))?;

        let (auto_update, interval_ms) = {
            let state = self.state.lock().await;
            (state.auto_update_active, state.update_interval_ms)
        };
        if auto_update {
            acquired.auto_update = Some(self.spawn_auto_update(interval_ms));
        }

        self.apply_protection();
        for selector in &self.config.protected_regions {
            let handle = self
                .caps
                .watcher
                .watch(&WatchRegion::subtree(selector.as_str()), self.violation_handler())
                .await
                .map_err(|e| init_error("observers", &AppError::from(e)))?;
            acquired.watchers.push(handle);
        }

        self.attach(REPORT_TRIGGER_SELECTOR, ListenerKind::ReportTrigger)
            .map_err(|e| init_error("listeners", &e))?;
        Ok(())
    }

    fn attach(&self, selector: &str, kind: ListenerKind) -> AppResult<()> {
        let attached = self
            .caps
            .dom
            .attach_listener(selector, kind, LISTENER_MARKER_ATTR)?;
        debug!(selector, attached, "listeners attached");
        Ok(())
    }

    fn violation_handler(self: &Arc<Self>) -> ViolationHandler {
        let weak = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let target: Weak<Self> = Arc::downgrade(&inner);
                inner.protect.call(move || {
                    if let Some(inner) = target.upgrade() {
                        inner.apply_protection();
                    }
                });
            }
        })
    }

    fn apply_protection(&self) {
        if let Some(protection) = &self.caps.modal_protection {
            if let Err(e) = protection.protect() {
                warn!(error = %e, "modal protection failed");
            }
        }
    }

    fn restore_after_visible(&self) {
        self.apply_protection();
        if let Some(restore) = &self.caps.attachment_restore {
            if let Err(e) = restore.restore() {
                warn!(error = %e, "attachment restore failed");
            }
        }
    }

    fn spawn_auto_update(self: &Arc<Self>, interval_ms: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = Duration::from_millis(interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.refresh_tick(false).await;
            }
        })
    }

    async fn refresh_tick(&self, manual: bool) {
        let outcome = match &self.caps.auto_refresh {
            Some(hook) => hook.refresh().await,
            None => Ok(None),
        };

        let mut state = self.state.lock().await;
        if !manual && !state.auto_update_active {
            return;
        }
        match outcome {
            Ok(server_time) => self.connection.update_status(&mut state, true, server_time),
            Err(e) => {
                state.failed_attempts = state.failed_attempts.saturating_add(1);
                warn!(
                    error = %e,
                    failed_attempts = state.failed_attempts,
                    "Falha na atualização automática"
                );
                self.connection.update_status(&mut state, false, None);
                let lost = state.failed_attempts == self.config.max_failed_attempts;
                drop(state);
                if lost {
                    self.notifications
                        .notify(CONNECTION_LOST_MESSAGE, Severity::Warning);
                }
            }
        }
    }

    /// Teardown of owned resources. Failures are logged, never returned.
    /// Page-wide listener markers are left alone; a newer run may own them.
    fn release(&self, mut resources: Resources) {
        if let Some(handle) = resources.auto_update.take() {
            handle.abort();
        }
        for timer in resources.timers.drain(..) {
            timer.abort();
        }
        for mut watcher in resources.watchers.drain(..) {
            if let Err(e) = watcher.disconnect() {
                let e = AppError::new(ErrorKind::Teardown, e.to_string());
                warn!(error = %e, "Erro ao destruir sistema");
            }
        }
    }

    fn strip_markers(&self) {
        match self.caps.dom.strip_attribute(LISTENER_MARKER_ATTR) {
            Ok(stripped) => debug!(stripped, "listener markers removed"),
            Err(e) => {
                let e = AppError::new(ErrorKind::Teardown, e.to_string());
                warn!(error = %e, "Erro ao destruir sistema");
            }
        }
    }
}
