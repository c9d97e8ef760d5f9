use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::capabilities::{Clock, Dom};
use crate::model::SystemState;
use crate::utils::{format_interval, format_time};
use crate::{CONNECTION_STATUS_ID, LAST_UPDATE_TIME_ID};

#[must_use]
pub fn indicator_markup(is_connected: bool, failed_attempts: u32) -> String {
    if is_connected {
        r#"<i class="fas fa-circle text-success"></i> Conectado"#.to_string()
    } else if failed_attempts > 0 {
        format!(r#"<i class="fas fa-circle text-danger"></i> Desconectado ({failed_attempts} falhas)"#)
    } else {
        r#"<i class="fas fa-circle text-danger"></i> Desconectado"#.to_string()
    }
}

#[must_use]
pub fn last_update_label(at: NaiveDateTime, update_interval_ms: u64) -> String {
    format!(
        "Última atualização: {} ({})",
        format_time(at),
        format_interval(update_interval_ms)
    )
}

/// Drives the `connection-status` and `last-update-time` elements.
#[derive(Clone)]
pub struct ConnectionIndicator {
    dom: Arc<dyn Dom>,
    clock: Arc<dyn Clock>,
}

impl ConnectionIndicator {
    pub fn new(dom: Arc<dyn Dom>, clock: Arc<dyn Clock>) -> Self {
        Self { dom, clock }
    }

    /// Reflect a connectivity observation. A connected observation clears the
    /// failure counter before rendering. DOM failures are logged only.
    pub fn update_status(
        &self,
        state: &mut SystemState,
        is_connected: bool,
        server_time: Option<NaiveDateTime>,
    ) {
        state.connection_ok = is_connected;
        if is_connected {
            state.failed_attempts = 0;
        }

        let markup = indicator_markup(is_connected, state.failed_attempts);
        if let Err(e) = self.dom.set_inner_html(CONNECTION_STATUS_ID, &markup) {
            warn!(error = %e, "Erro ao atualizar status de conexão");
        }

        let now = self.clock.now();
        let label = last_update_label(server_time.unwrap_or(now), state.update_interval_ms);
        if let Err(e) = self.dom.set_text(LAST_UPDATE_TIME_ID, &label) {
            warn!(error = %e, "Erro ao atualizar status de conexão");
        }

        state.last_update = Some(now);
        debug!(
            connected = is_connected,
            failed_attempts = state.failed_attempts,
            "Status de conexão atualizado: {}",
            if is_connected { "Conectado" } else { "Desconectado" }
        );
    }
}
