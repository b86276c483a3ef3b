#![deny(clippy::all)]

use std::collections::HashMap;

use napi::bindgen_prelude::Buffer;
use napi_derive::napi;
use timetabler_client::{config, model, renderer, validator};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[napi(string_enum)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Courses,
    Times,
    Rooms,
    Preferences,
}

#[napi(string_enum)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Accepted,
    Validated,
    MissingColumns,
}

#[napi(string_enum)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTier {
    Ok,
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Enum conversions
// ---------------------------------------------------------------------------

impl From<DatasetKind> for model::DatasetKind {
    fn from(v: DatasetKind) -> Self {
        match v {
            DatasetKind::Courses => model::DatasetKind::Courses,
            DatasetKind::Times => model::DatasetKind::Times,
            DatasetKind::Rooms => model::DatasetKind::Rooms,
            DatasetKind::Preferences => model::DatasetKind::Preferences,
        }
    }
}

impl From<validator::ValidationStatus> for ValidationStatus {
    fn from(v: validator::ValidationStatus) -> Self {
        match v {
            validator::ValidationStatus::Accepted => ValidationStatus::Accepted,
            validator::ValidationStatus::Validated => ValidationStatus::Validated,
            validator::ValidationStatus::MissingColumns => ValidationStatus::MissingColumns,
        }
    }
}

impl From<renderer::StatusTier> for StatusTier {
    fn from(v: renderer::StatusTier) -> Self {
        match v {
            renderer::StatusTier::Ok => StatusTier::Ok,
            renderer::StatusTier::Warning => StatusTier::Warning,
            renderer::StatusTier::Error => StatusTier::Error,
        }
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

#[napi(object)]
#[derive(Debug, Clone)]
pub struct DatasetValidation {
    pub missing_columns: Vec<String>,
    /// False only when required columns are missing.
    pub is_valid: bool,
    pub status: ValidationStatus,
    pub headers: Vec<String>,
    pub row_count: u32,
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct ConfigCheck {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<config::ConfigCheck> for ConfigCheck {
    fn from(v: config::ConfigCheck) -> Self {
        ConfigCheck {
            errors: v.errors,
            warnings: v.warnings,
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct Metric {
    pub label: String,
    pub value: String,
    pub tier: StatusTier,
}

impl From<renderer::Metric> for Metric {
    fn from(v: renderer::Metric) -> Self {
        Metric {
            label: v.label.to_string(),
            value: v.value,
            tier: v.tier.into(),
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct ScheduleRow {
    pub course: String,
    pub lecturer: String,
    pub day: String,
    pub time: String,
    pub room: String,
    pub status: String,
    pub tier: StatusTier,
}

impl From<renderer::ScheduleRow> for ScheduleRow {
    fn from(v: renderer::ScheduleRow) -> Self {
        ScheduleRow {
            course: v.course,
            lecturer: v.lecturer,
            day: v.day,
            time: v.time,
            room: v.room,
            status: v.status,
            tier: v.tier.into(),
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct RenderedResult {
    pub statistics: Vec<Metric>,
    pub schedule: Vec<ScheduleRow>,
}

impl From<renderer::RenderedResult> for RenderedResult {
    fn from(v: renderer::RenderedResult) -> Self {
        RenderedResult {
            statistics: v.statistics.into_iter().map(Into::into).collect(),
            schedule: v.schedule.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Exported functions
// ---------------------------------------------------------------------------

/// Check an uploaded file against the column contract for `kind`.
/// Fails only on an unsupported extension.
#[napi]
pub fn validate_dataset(
    kind: DatasetKind,
    file_name: String,
    content: Buffer,
) -> napi::Result<DatasetValidation> {
    let (dataset, outcome) = validator::validate_upload(kind.into(), &file_name, content.to_vec())
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;

    Ok(DatasetValidation {
        missing_columns: outcome.missing_columns.into_iter().collect(),
        is_valid: outcome.is_valid,
        status: outcome.status.into(),
        row_count: dataset.parsed_rows.len() as u32,
        headers: dataset.parsed_headers,
    })
}

/// Rebuild a configuration from raw control values and check its limits.
#[napi]
pub fn check_config(controls: HashMap<String, String>) -> napi::Result<ConfigCheck> {
    let snapshot =
        config::rebuild(&controls).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(config::validate(&snapshot).into())
}

/// Render an optimizer result given as its JSON text.
#[napi]
pub fn render_result(result_json: String) -> napi::Result<RenderedResult> {
    let result: model::SchedulingResult = serde_json::from_str(&result_json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid result: {}", e)))?;
    Ok(renderer::render(&result).into())
}

#[napi]
pub fn classify_status(status: String) -> StatusTier {
    renderer::classify_status(&status).into()
}
