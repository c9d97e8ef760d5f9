use std::sync::Arc;

use tracing::{debug, instrument};

use crate::capabilities::{HttpRequest, HttpResponse, HttpTransport};
use crate::config::PanelConfig;
use crate::model::{
    AttachmentRef, AttachmentsResponse, EntryId, StatusUpdateRequest, StatusUpdateResponse,
};
use crate::{AppError, AppResult, ErrorKind, UNKNOWN_ERROR_MESSAGE};

/// Typed calls to the panel's backend.
#[derive(Clone)]
pub struct ApiClient {
    http: Arc<dyn HttpTransport>,
    config: Arc<PanelConfig>,
}

impl ApiClient {
    pub fn new(http: Arc<dyn HttpTransport>, config: Arc<PanelConfig>) -> Self {
        Self { http, config }
    }

    /// `POST update-status/{id}`. A 2xx reply is returned even when it
    /// reports `success: false`; judging that is up to the caller.
    #[instrument(skip(self), fields(entry_id = %entry_id))]
    pub async fn update_status(
        &self,
        entry_id: EntryId,
        status: &str,
    ) -> AppResult<StatusUpdateResponse> {
        let url = self
            .config
            .resolve(&self.config.endpoints.update_status_path(entry_id))?;
        let request = HttpRequest::post(url).with_json(&StatusUpdateRequest {
            status: status.to_string(),
        })?;

        let response = self.send(request).await?;
        decode(&response)
    }

    /// `GET` the attachment list of an entry.
    #[instrument(skip(self), fields(entry_id = %entry_id))]
    pub async fn fetch_attachments(&self, entry_id: EntryId) -> AppResult<Vec<AttachmentRef>> {
        let url = self
            .config
            .resolve(&self.config.endpoints.attachments_path(entry_id))?;
        let response = self.send(HttpRequest::get(url)).await?;

        let body: AttachmentsResponse = decode(&response)?;
        if !body.success {
            return Err(AppError::new(
                ErrorKind::Domain,
                body.message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            ));
        }
        Ok(body.attachments)
    }

    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        debug!(
            method = request.method().as_str(),
            url = %request.url(),
            request_id = request.request_id(),
            "sending request"
        );
        let response = self.http.send(request).await?;
        if !response.is_success() {
            return Err(AppError::from_http_status(
                response.status(),
                Some(response.body()),
            ));
        }
        Ok(response)
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> AppResult<T> {
    response
        .json()
        .map_err(|e| AppError::new(ErrorKind::Decode, e.to_string()))
}
