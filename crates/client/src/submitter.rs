use std::collections::BTreeMap;
use std::pin::Pin;

use futures::stream::Stream;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::model::{ConfigurationSnapshot, DatasetKind, ProgressEvent, SchedulingResult, UploadedDataset};
use crate::settings::Settings;
use crate::stream::{decode_events, StreamError};

pub const SCHEDULE_PATH: &str = "/api/schedule";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

fn join_kinds(kinds: &[DatasetKind]) -> String {
    kinds
        .iter()
        .map(|k| k.field_name())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn status_detail(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Missing required files: {}", join_kinds(.0))]
    MissingDatasets(Vec<DatasetKind>),
    #[error("{}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),
    #[error("Failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("HTTP error! status: {status}{}", status_detail(.detail))]
    Status { status: u16, detail: Option<String> },
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Error body the optimizer returns alongside non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Read the `{"error": ...}` detail out of a failed response, if any.
pub(crate) async fn error_detail(response: reqwest::Response) -> Option<String> {
    let body = response.text().await.ok()?;
    serde_json::from_str::<ErrorBody>(&body).ok().map(|b| b.error)
}

pub(crate) fn http_client(settings: &Settings) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Mandatory kinds absent from `datasets`, in canonical order.
pub fn missing_required(datasets: &BTreeMap<DatasetKind, UploadedDataset>) -> Vec<DatasetKind> {
    DatasetKind::MANDATORY
        .iter()
        .copied()
        .filter(|k| !datasets.contains_key(k))
        .collect()
}

/// Everything sent for one job. Built once, never modified after dispatch.
#[derive(Debug, Clone)]
pub struct JobSubmissionRequest {
    datasets: Vec<UploadedDataset>,
    config: ConfigurationSnapshot,
}

impl JobSubmissionRequest {
    /// Fails without touching the network when a mandatory kind is absent.
    pub fn new(
        datasets: &BTreeMap<DatasetKind, UploadedDataset>,
        config: ConfigurationSnapshot,
    ) -> Result<Self, SubmitError> {
        let missing = missing_required(datasets);
        if !missing.is_empty() {
            return Err(SubmitError::MissingDatasets(missing));
        }
        let datasets = DatasetKind::ALL
            .iter()
            .filter_map(|k| datasets.get(k).cloned())
            .collect();
        Ok(Self { datasets, config })
    }

    pub fn config(&self) -> &ConfigurationSnapshot {
        &self.config
    }

    pub fn kinds(&self) -> Vec<DatasetKind> {
        self.datasets.iter().map(|d| d.kind).collect()
    }

    fn to_form(&self) -> Result<Form, SubmitError> {
        let mut form = Form::new();
        for dataset in &self.datasets {
            let part = Part::bytes(dataset.raw.clone())
                .file_name(dataset.file_name.clone())
                .mime_str(dataset.format.mime_type())?;
            form = form.part(dataset.kind.field_name(), part);
        }
        Ok(form.text("config", serde_json::to_string(&self.config)?))
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProgressEvent, StreamError>> + Send>>;

/// The two shapes the job endpoint can answer with.
pub enum JobResponse {
    Direct(SchedulingResult),
    Streaming(EventStream),
}

impl std::fmt::Debug for JobResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobResponse::Direct(result) => f.debug_tuple("Direct").field(result).finish(),
            JobResponse::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

pub struct JobSubmitter {
    client: reqwest::Client,
    settings: Settings,
}

impl JobSubmitter {
    pub fn new(settings: Settings) -> Result<Self, SubmitError> {
        Ok(Self {
            client: http_client(&settings)?,
            settings,
        })
    }

    /// POST the job as one multipart request. The response content type
    /// decides between a direct result and a progress stream.
    pub async fn submit(&self, request: &JobSubmissionRequest) -> Result<JobResponse, SubmitError> {
        let url = self.settings.endpoint(SCHEDULE_PATH);
        info!(
            "submitting job to {} with datasets [{}]",
            url,
            join_kinds(&request.kinds())
        );

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, self.settings.response_mode.accept_header())
            .multipart(request.to_form()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            warn!("job endpoint answered {}", status);
            return Err(SubmitError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        if is_json {
            debug!("job endpoint returned a direct result");
            let result = response.json::<SchedulingResult>().await?;
            Ok(JobResponse::Direct(result))
        } else {
            debug!("job endpoint returned a progress stream");
            Ok(JobResponse::Streaming(Box::pin(decode_events(
                response.bytes_stream(),
            ))))
        }
    }
}
