//! Report preview modal.
//!
//! The modal is rebuilt from scratch every time it opens and its markup is
//! removed again once the host reports it hidden.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::api::ApiClient;
use crate::capabilities::Dom;
use crate::model::{AttachmentRef, EntryId, ReportData};
use crate::utils::{escape_html, format_date};
use crate::AppResult;

pub const SELECTED_ATTACHMENTS_INPUT: &str = "selected_attachments";

#[must_use]
pub fn report_modal_id(entry_id: EntryId) -> String {
    format!("report-preview-{entry_id}")
}

#[must_use]
pub fn report_config_id(entry_id: EntryId) -> String {
    format!("report-config-{entry_id}")
}

/// Gallery candidates, in their original order.
#[must_use]
pub fn image_attachments(attachments: &[AttachmentRef]) -> Vec<&AttachmentRef> {
    attachments.iter().filter(|a| a.is_image()).collect()
}

fn info_field(out: &mut String, label: &str, value: &str) {
    let _ = write!(
        out,
        r#"<div class="col-md-6 mb-2"><strong>{label}:</strong> <span>{}</span></div>"#,
        escape_html(value)
    );
}

#[must_use]
pub fn render_report_modal(report: &ReportData, uploads_prefix: &str) -> String {
    let modal_id = escape_html(&report.modal_id());

    let mut info = String::new();
    info_field(&mut info, "Data", &format_date(&report.date));
    info_field(&mut info, "Nº do Pedido", &report.order_number);
    info_field(&mut info, "Nº do Cliente", &report.client_number);
    info_field(&mut info, "Cliente", &report.client_name);
    if let Some(project) = report.project.as_deref().filter(|p| !p.trim().is_empty()) {
        info_field(&mut info, "Projeto", project);
    }

    let images = image_attachments(&report.attachments);
    let mut gallery = String::new();
    if !images.is_empty() {
        gallery.push_str(r#"<h6 class="mt-3">Anexos</h6><div class="row report-gallery">"#);
        for image in images {
            let filename = escape_html(&image.filename);
            let _ = write!(
                gallery,
                concat!(
                    r#"<div class="col-md-4 mb-3">"#,
                    r#"<img src="{prefix}{file}" alt="{file}" class="img-fluid img-thumbnail" data-attachment-id="{id}">"#,
                    "</div>"
                ),
                prefix = escape_html(uploads_prefix),
                file = filename,
                id = image.id,
            );
        }
        gallery.push_str("</div>");
    }

    format!(
        concat!(
            r#"<div class="modal fade" id="{id}" tabindex="-1" role="dialog" aria-hidden="true">"#,
            r#"<div class="modal-dialog modal-lg" role="document"><div class="modal-content">"#,
            r#"<div class="modal-header"><h5 class="modal-title">Relatório</h5>"#,
            r#"<button type="button" class="btn btn-outline-secondary btn-sm" data-report-print="{id}">Imprimir</button>"#,
            r#"<button type="button" class="btn btn-outline-primary btn-sm" data-report-pdf="{id}">Baixar PDF</button>"#,
            r#"<button type="button" class="close" data-dismiss="modal" aria-label="Fechar"><span aria-hidden="true">&times;</span></button>"#,
            "</div>",
            r#"<div class="modal-body"><div class="row report-info">{info}</div>{gallery}</div>"#,
            "</div></div></div>"
        ),
        id = modal_id,
        info = info,
        gallery = gallery,
    )
}

/// Puts a [`ReportData`] preview on screen.
#[derive(Clone)]
pub struct ReportModalBuilder {
    dom: Arc<dyn Dom>,
    uploads_prefix: String,
}

impl ReportModalBuilder {
    pub fn new(dom: Arc<dyn Dom>, uploads_prefix: impl Into<String>) -> Self {
        Self {
            dom,
            uploads_prefix: uploads_prefix.into(),
        }
    }

    /// Replace any open preview for the same entry and show the new one.
    /// Returns the modal's element id.
    pub fn open(&self, report: &ReportData) -> AppResult<String> {
        let modal_id = report.modal_id();
        if self.dom.remove_element(&modal_id)? {
            debug!(modal_id, "replaced previous report modal");
        }

        self.dom
            .append_to_body(&render_report_modal(report, &self.uploads_prefix))?;

        let dom = Arc::clone(&self.dom);
        let cleanup_id = modal_id.clone();
        self.dom.on_modal_hidden(
            &modal_id,
            Box::new(move || {
                if let Err(e) = dom.remove_element(&cleanup_id) {
                    warn!(modal_id = cleanup_id, error = %e, "report modal cleanup failed");
                }
            }),
        )?;

        self.dom.show_modal(&modal_id)?;
        Ok(modal_id)
    }
}

/// Collects the report form of an entry and opens its preview.
#[derive(Clone)]
pub struct ReportGenerator {
    api: ApiClient,
    dom: Arc<dyn Dom>,
    builder: ReportModalBuilder,
}

impl ReportGenerator {
    pub fn new(api: ApiClient, dom: Arc<dyn Dom>, builder: ReportModalBuilder) -> Self {
        Self { api, dom, builder }
    }

    #[instrument(skip(self), fields(entry_id = %entry_id))]
    pub async fn generate(&self, entry_id: EntryId) -> AppResult<String> {
        let field = |name: &str| -> AppResult<String> {
            Ok(self
                .dom
                .input_value(&format!("report-{name}-{entry_id}"))?
                .unwrap_or_default()
                .trim()
                .to_string())
        };

        let date = field("date")?;
        let order_number = field("order-number")?;
        let client_number = field("client-number")?;
        let client_name = field("client-name")?;
        let project = Some(field("project")?).filter(|p| !p.is_empty());

        let config_id = report_config_id(entry_id);
        let selected: Vec<u64> = self
            .dom
            .checked_values(&config_id, SELECTED_ATTACHMENTS_INPUT)?
            .iter()
            .filter_map(|v| v.trim().parse().ok())
            .collect();

        let attachments = if selected.is_empty() {
            Vec::new()
        } else {
            match self.api.fetch_attachments(entry_id).await {
                Ok(available) => selected
                    .iter()
                    .filter_map(|id| available.iter().find(|a| a.id == *id).cloned())
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "Erro ao carregar anexos do relatório");
                    Vec::new()
                }
            }
        };

        self.dom.hide_modal(&config_id)?;

        let report = ReportData {
            entry_id,
            date,
            order_number,
            client_number,
            client_name,
            project,
            attachments,
        };
        self.builder.open(&report)
    }
}
