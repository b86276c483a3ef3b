use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use log::info;
use serde::{Deserialize, Serialize};

use crate::model::{ConfigurationSnapshot, SchedulingResult};
use crate::settings::Settings;
use crate::submitter::{error_detail, http_client, status_detail};

pub const REPORT_PATH: &str = "/api/report";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{what} failed: {status}{}", status_detail(.detail))]
    Status {
        what: &'static str,
        status: u16,
        detail: Option<String>,
    },
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Could not save download: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExportFormat {
    Excel,
    Csv,
}

impl ExportFormat {
    fn path_segment(self) -> &'static str {
        match self {
            ExportFormat::Excel => "excel",
            ExportFormat::Csv => "csv",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Excel => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

/// `{prefix}_YYYYmmdd_HHMMSS.{ext}`
pub fn download_name(prefix: &str, extension: &str, at: NaiveDateTime) -> String {
    format!("{}_{}.{}", prefix, at.format("%Y%m%d_%H%M%S"), extension)
}

#[derive(Serialize)]
struct ReportRequest<'a> {
    results: &'a SchedulingResult,
    config: &'a ConfigurationSnapshot,
}

/// Client for the export and report endpoints. Both answer with a blob that
/// is written to a download directory.
pub struct Exporter {
    client: reqwest::Client,
    settings: Settings,
}

impl Exporter {
    pub fn new(settings: Settings) -> Result<Self, ExportError> {
        Ok(Self {
            client: http_client(&settings)?,
            settings,
        })
    }

    async fn download<T: Serialize + ?Sized>(
        &self,
        what: &'static str,
        path: &str,
        body: &T,
        target: PathBuf,
    ) -> Result<PathBuf, ExportError> {
        let response = self
            .client
            .post(self.settings.endpoint(path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status {
                what,
                status: status.as_u16(),
                detail: error_detail(response).await,
            });
        }

        let blob = response.bytes().await?;
        tokio::fs::write(&target, &blob).await?;
        info!("{} saved to {} ({} bytes)", what, target.display(), blob.len());
        Ok(target)
    }

    pub async fn export(
        &self,
        result: &SchedulingResult,
        format: ExportFormat,
        dir: &Path,
    ) -> Result<PathBuf, ExportError> {
        let name = download_name("schedule", format.extension(), Local::now().naive_local());
        let path = format!("/api/export/{}", format.path_segment());
        self.download("Export", &path, result, dir.join(name)).await
    }

    pub async fn report(
        &self,
        result: &SchedulingResult,
        config: &ConfigurationSnapshot,
        dir: &Path,
    ) -> Result<PathBuf, ExportError> {
        let name = download_name("scheduling_report", "txt", Local::now().naive_local());
        let body = ReportRequest {
            results: result,
            config,
        };
        self.download("Report generation", REPORT_PATH, &body, dir.join(name))
            .await
    }
}
