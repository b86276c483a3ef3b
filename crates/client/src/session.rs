use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::{self, ConfigCheck, ConfigurationModel, ControlSource};
use crate::export::{ExportFormat, Exporter};
use crate::model::{DatasetKind, SchedulingResult, UploadedDataset};
use crate::renderer::{self, RenderedResult};
use crate::settings::Settings;
use crate::stream::{ProgressStreamReader, ProgressUpdate, StreamError};
use crate::submitter::{missing_required, JobResponse, JobSubmissionRequest, JobSubmitter, SubmitError};
use crate::validator::{self, format_file_size, ValidationOutcome, ValidationStatus};
use crate::ClientError;

pub const READY_MESSAGE: &str = "Ready to start";

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A user-facing message produced by a session operation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

fn outcome_notification(outcome: &ValidationOutcome, dataset: &UploadedDataset) -> Notification {
    let size = format_file_size(dataset.raw.len() as u64);
    match outcome.status {
        ValidationStatus::Accepted => Notification {
            level: NotificationLevel::Success,
            message: format!(
                "{} file uploaded successfully! {} ({}) will be checked by the optimizer",
                outcome.kind, dataset.file_name, size
            ),
        },
        ValidationStatus::Validated => Notification {
            level: NotificationLevel::Success,
            message: format!(
                "{} data structure validated successfully! {} ({}, {} rows)",
                outcome.kind,
                dataset.file_name,
                size,
                dataset.parsed_rows.len()
            ),
        },
        ValidationStatus::MissingColumns => Notification {
            level: NotificationLevel::Warning,
            message: format!(
                "Missing required columns in {}: {}",
                outcome.kind,
                outcome
                    .missing_columns
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        },
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// All mutable state of one scheduling session. Operations that touch the
/// network take `&mut self`, so at most one job is in flight per session.
#[derive(Debug)]
pub struct Session {
    settings: Settings,
    datasets: BTreeMap<DatasetKind, UploadedDataset>,
    config: ConfigurationModel,
    result: Option<SchedulingResult>,
    progress: ProgressUpdate,
    notifications: Vec<Notification>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            datasets: BTreeMap::new(),
            config: ConfigurationModel::default(),
            result: None,
            progress: ready_progress(),
            notifications: Vec::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dataset(&self, kind: DatasetKind) -> Option<&UploadedDataset> {
        self.datasets.get(&kind)
    }

    pub fn config(&self) -> &ConfigurationModel {
        &self.config
    }

    pub fn result(&self) -> Option<&SchedulingResult> {
        self.result.as_ref()
    }

    /// Adopt a result produced by an earlier run, e.g. to export it again.
    pub fn restore_result(&mut self, result: SchedulingResult) {
        self.result = Some(result);
    }

    pub fn rendered(&self) -> Option<RenderedResult> {
        self.result.as_ref().map(renderer::render)
    }

    pub fn progress(&self) -> &ProgressUpdate {
        &self.progress
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NotificationLevel::Error => error!("{}", message),
            NotificationLevel::Warning => warn!("{}", message),
            NotificationLevel::Success | NotificationLevel::Info => info!("{}", message),
        }
        self.notifications.push(Notification { level, message });
    }

    // -----------------------------------------------------------------------
    // Datasets
    // -----------------------------------------------------------------------

    /// Store and validate an uploaded file, replacing any earlier upload of
    /// the same kind. Emits exactly one notification.
    pub fn upload(
        &mut self,
        kind: DatasetKind,
        file_name: &str,
        raw: Vec<u8>,
    ) -> Result<ValidationOutcome, ClientError> {
        match validator::validate_upload(kind, file_name, raw) {
            Ok((dataset, outcome)) => {
                let note = outcome_notification(&outcome, &dataset);
                self.datasets.insert(kind, dataset);
                self.notify(note.level, note.message);
                Ok(outcome)
            }
            Err(e) => {
                self.notify(NotificationLevel::Error, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Read `path` once and upload its contents.
    pub async fn upload_path(
        &mut self,
        kind: DatasetKind,
        path: &Path,
    ) -> Result<ValidationOutcome, ClientError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) => {
                self.notify(
                    NotificationLevel::Error,
                    format!("Error reading {} file: {}", kind, e),
                );
                return Err(ClientError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        self.upload(kind, &file_name, raw)
    }

    pub fn remove(&mut self, kind: DatasetKind) {
        if self.datasets.remove(&kind).is_some() {
            self.notify(NotificationLevel::Info, format!("{} file removed", kind));
        }
    }

    /// True once courses, times and rooms are all present.
    pub fn can_submit(&self) -> bool {
        missing_required(&self.datasets).is_empty()
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn on_control_change(
        &mut self,
        id: &str,
        source: &dyn ControlSource,
    ) -> Result<bool, ClientError> {
        self.config.on_control_change(id, source).map_err(|e| {
            self.notify(NotificationLevel::Error, e.to_string());
            ClientError::from(e)
        })
    }

    /// Pre-submission gate: mandatory files present and configuration within
    /// hard limits. Soft warnings are reported and let through.
    pub fn validate_inputs(&mut self) -> Result<ConfigCheck, ClientError> {
        let missing = missing_required(&self.datasets);
        if !missing.is_empty() {
            let err = SubmitError::MissingDatasets(missing);
            self.notify(NotificationLevel::Error, err.to_string());
            return Err(err.into());
        }

        let check = config::validate(self.config.snapshot());
        if !check.is_ok() {
            let err = SubmitError::InvalidConfiguration(check.errors.clone());
            self.notify(NotificationLevel::Error, err.to_string());
            return Err(err.into());
        }
        for warning in &check.warnings {
            self.notify(NotificationLevel::Warning, warning.clone());
        }
        Ok(check)
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Submit the current datasets and configuration and wait for the job to
    /// finish. `shutdown` resolving cancels the read loop. Progress changes
    /// are forwarded to `updates` while the job runs.
    ///
    /// Every exit path leaves the session ready for another submission.
    pub async fn submit<F>(
        &mut self,
        shutdown: F,
        updates: Option<UnboundedSender<ProgressUpdate>>,
    ) -> Result<SchedulingResult, ClientError>
    where
        F: Future<Output = ()>,
    {
        self.validate_inputs()?;

        let outcome = self.run_job(shutdown, updates).await;
        self.progress = ready_progress();

        match outcome {
            Ok(result) => {
                self.result = Some(result.clone());
                self.notify(
                    NotificationLevel::Success,
                    "Scheduling optimization completed!",
                );
                Ok(result)
            }
            Err(e) => {
                let message = match &e {
                    ClientError::Stream(StreamError::Server(message)) => message.clone(),
                    other => format!("Scheduling failed: {}", other),
                };
                self.notify(NotificationLevel::Error, message);
                Err(e)
            }
        }
    }

    async fn run_job<F>(
        &mut self,
        shutdown: F,
        updates: Option<UnboundedSender<ProgressUpdate>>,
    ) -> Result<SchedulingResult, ClientError>
    where
        F: Future<Output = ()>,
    {
        let request = JobSubmissionRequest::new(&self.datasets, self.config.snapshot().clone())?;
        let submitter = JobSubmitter::new(self.settings.clone())?;
        tokio::pin!(shutdown);

        // In JSON mode the response headers arrive only when the job is done.
        let response = tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("job cancelled before the optimizer answered");
                return Err(StreamError::Cancelled.into());
            }
            response = submitter.submit(&request) => response?,
        };

        match response {
            JobResponse::Direct(result) => Ok(result),
            JobResponse::Streaming(events) => {
                let mut reader = ProgressStreamReader::new(request.config().algorithm.max_generations);
                if let Some(tx) = updates {
                    reader = reader.with_updates(tx);
                }
                let outcome = reader.consume(events, shutdown).await;
                self.progress = reader.progress().clone();
                Ok(outcome?)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    fn require_result(&mut self, what: &str) -> Result<SchedulingResult, ClientError> {
        match &self.result {
            Some(result) => Ok(result.clone()),
            None => {
                self.notify(
                    NotificationLevel::Warning,
                    format!("No schedule data available for {}", what),
                );
                Err(ClientError::NoResult)
            }
        }
    }

    /// Download the current schedule in `format` into `dir`.
    pub async fn export(&mut self, format: ExportFormat, dir: &Path) -> Result<PathBuf, ClientError> {
        let result = self.require_result("export")?;
        let outcome = match Exporter::new(self.settings.clone()) {
            Ok(exporter) => exporter.export(&result, format, dir).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(path) => {
                self.notify(
                    NotificationLevel::Success,
                    format!("Schedule exported to {}", path.display()),
                );
                Ok(path)
            }
            Err(e) => {
                self.notify(NotificationLevel::Error, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Download a text report of the current result and configuration.
    pub async fn report(&mut self, dir: &Path) -> Result<PathBuf, ClientError> {
        let result = self.require_result("report generation")?;
        let config = self.config.snapshot().clone();
        let outcome = match Exporter::new(self.settings.clone()) {
            Ok(exporter) => exporter.report(&result, &config, dir).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(path) => {
                self.notify(
                    NotificationLevel::Success,
                    "Detailed report generated successfully!",
                );
                Ok(path)
            }
            Err(e) => {
                self.notify(NotificationLevel::Error, e.to_string());
                Err(e.into())
            }
        }
    }
}

fn ready_progress() -> ProgressUpdate {
    ProgressUpdate {
        percent: 0.0,
        message: READY_MESSAGE.to_string(),
    }
}
