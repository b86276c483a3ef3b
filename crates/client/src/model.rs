use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Dataset kinds and formats
// ---------------------------------------------------------------------------

/// The four categories of tabular input the optimizer accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DatasetKind {
    Courses,
    Times,
    Rooms,
    /// Optional lecturer preferences. Never blocks submission.
    Preferences,
}

impl DatasetKind {
    /// All kinds in multipart field order.
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::Courses,
        DatasetKind::Times,
        DatasetKind::Rooms,
        DatasetKind::Preferences,
    ];

    /// Kinds that must be present before a job can be submitted.
    pub const MANDATORY: [DatasetKind; 3] =
        [DatasetKind::Courses, DatasetKind::Times, DatasetKind::Rooms];

    /// Multipart field name used by the job endpoint.
    pub fn field_name(self) -> &'static str {
        match self {
            DatasetKind::Courses => "courses",
            DatasetKind::Times => "times",
            DatasetKind::Rooms => "rooms",
            DatasetKind::Preferences => "preferences",
        }
    }

    pub fn from_field_name(name: &str) -> Option<DatasetKind> {
        DatasetKind::ALL.into_iter().find(|k| k.field_name() == name)
    }

    pub fn is_mandatory(self) -> bool {
        !matches!(self, DatasetKind::Preferences)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Upload formats recognised by extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Resolve a format from a file name's extension (case-insensitive).
    pub fn from_file_name(name: &str) -> Option<FileFormat> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            "xls" => Some(FileFormat::Xls),
            _ => None,
        }
    }

    /// Spreadsheet binaries are forwarded untouched; only CSV is parsed locally.
    pub fn is_spreadsheet(self) -> bool {
        !matches!(self, FileFormat::Csv)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            FileFormat::Csv => "text/csv",
            FileFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            FileFormat::Xls => "application/vnd.ms-excel",
        }
    }
}

// ---------------------------------------------------------------------------
// Uploaded data
// ---------------------------------------------------------------------------

/// One parsed row: header name -> cell text.
pub type Row = BTreeMap<String, String>;

/// A file the user uploaded for one dataset kind. Replaced wholesale on
/// re-upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedDataset {
    pub kind: DatasetKind,
    pub file_name: String,
    pub format: FileFormat,
    /// The raw payload, forwarded verbatim to the optimizer.
    pub raw: Vec<u8>,
    /// Header row, in file order. Empty for spreadsheet uploads.
    pub parsed_headers: Vec<String>,
    pub parsed_rows: Vec<Row>,
}

// ---------------------------------------------------------------------------
// Configuration snapshot
// ---------------------------------------------------------------------------

/// What the optimizer should favour when trading off solution quality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OptimizeFor {
    #[default]
    Balanced,
    Quality,
    Speed,
}

impl OptimizeFor {
    pub fn parse(value: &str) -> Option<OptimizeFor> {
        match value.trim().to_ascii_lowercase().as_str() {
            "balanced" => Some(OptimizeFor::Balanced),
            "quality" => Some(OptimizeFor::Quality),
            "speed" => Some(OptimizeFor::Speed),
            _ => None,
        }
    }
}

/// Genetic-algorithm tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmConfig {
    pub population_size: u32,
    pub max_generations: u32,
    /// Percentage, nominally 0-100.
    pub crossover_rate: u32,
    /// Percentage, nominally 0-100.
    pub mutation_rate: u32,
    /// Fitness at which the optimizer may stop early.
    pub early_termination: f64,
    /// Minutes of lecture time per credit unit (SKS).
    pub minutes_per_sks: u32,
}

/// Penalty weights for lecturer time preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceConfig {
    pub reserved_penalty: u32,
    pub preferred_penalty: u32,
    pub blocked_penalty: u32,
    pub enable_enhanced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintConfig {
    pub clash_weight: u32,
    pub allow_partial: bool,
    pub optimize_for: OptimizeFor,
}

/// The complete set of optimizer parameters captured at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigurationSnapshot {
    pub algorithm: AlgorithmConfig,
    pub preferences: PreferenceConfig,
    pub constraints: ConstraintConfig,
}

impl Default for ConfigurationSnapshot {
    /// Mirrors the fallbacks the optimizer applies when a key is absent.
    fn default() -> Self {
        ConfigurationSnapshot {
            algorithm: AlgorithmConfig {
                population_size: 10,
                max_generations: 50,
                crossover_rate: 75,
                mutation_rate: 25,
                early_termination: 0.95,
                minutes_per_sks: 50,
            },
            preferences: PreferenceConfig {
                reserved_penalty: 1000,
                preferred_penalty: 30,
                blocked_penalty: 50,
                enable_enhanced: true,
            },
            constraints: ConstraintConfig {
                clash_weight: 100,
                allow_partial: false,
                optimize_for: OptimizeFor::Balanced,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Progress feed
// ---------------------------------------------------------------------------

/// One discrete message of the streamed job-status protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        progress: f64,
        #[serde(default)]
        message: String,
    },
    /// The server also sends its own `progress`/`message`; the client derives
    /// both from the generation index instead.
    Generation { generation: u32, fitness: f64 },
    Complete { result: SchedulingResult },
    Error { message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Run statistics reported by the optimizer. Every field defaults to zero so
/// a partially formatted result still deserializes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub fitness: f64,
    /// Wall-clock seconds.
    pub execution_time: f64,
    pub generations: u32,
    pub total_violations: u32,
    pub reserved_violations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_violations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clashes: Option<u32>,
    /// Resident memory in megabytes.
    pub ram_usage: u64,
}

/// One scheduled session in the final timetable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub course: String,
    pub lecturer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sks: Option<u32>,
    pub day: String,
    pub time: String,
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// Free-form status text, e.g. "OK", "Clash", "Preference Issue".
    pub status: String,
}

/// The complete optimizer output for one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingResult {
    #[serde(default)]
    pub statistics: Statistics,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
