use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::Serialize;

use crate::model::{
    AlgorithmConfig, ConfigurationSnapshot, ConstraintConfig, OptimizeFor, PreferenceConfig,
};

// ---------------------------------------------------------------------------
// Control ids
// ---------------------------------------------------------------------------

pub const ALGORITHM_CONTROLS: [&str; 6] = [
    "populationSize",
    "maxGenerations",
    "crossoverRate",
    "mutationRate",
    "earlyTermination",
    "minutesPerSks",
];

pub const PREFERENCE_CONTROLS: [&str; 4] = [
    "reservedPenalty",
    "preferredPenalty",
    "blockedPenalty",
    "enableEnhanced",
];

pub const CONSTRAINT_CONTROLS: [&str; 3] = ["clashWeight", "allowPartial", "optimizeFor"];

pub const MIN_POPULATION_SIZE: u32 = 4;
pub const RECOMMENDED_CROSSOVER: std::ops::RangeInclusive<u32> = 50..=95;

pub fn is_recognized_control(id: &str) -> bool {
    ALGORITHM_CONTROLS
        .iter()
        .chain(PREFERENCE_CONTROLS.iter())
        .chain(CONSTRAINT_CONTROLS.iter())
        .any(|c| *c == id)
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Control '{0}' has no value")]
    MissingControl(&'static str),
    #[error("Control '{control}' expects a non-negative number, got '{value}'")]
    InvalidNumber { control: &'static str, value: String },
    #[error("Control '{control}' has unknown option '{value}'")]
    InvalidOption { control: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Control source
// ---------------------------------------------------------------------------

/// Read access to the raw values of the parameter controls, keyed by control
/// id. Checkbox controls report `true`/`false` (or `on`/`off`).
pub trait ControlSource {
    fn value(&self, id: &str) -> Option<&str>;
}

impl ControlSource for BTreeMap<String, String> {
    fn value(&self, id: &str) -> Option<&str> {
        self.get(id).map(String::as_str)
    }
}

impl ControlSource for HashMap<String, String> {
    fn value(&self, id: &str) -> Option<&str> {
        self.get(id).map(String::as_str)
    }
}

fn read_u32(source: &dyn ControlSource, control: &'static str) -> Result<u32, ConfigError> {
    let raw = source
        .value(control)
        .ok_or(ConfigError::MissingControl(control))?;
    raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidNumber {
        control,
        value: raw.to_string(),
    })
}

fn read_f64(source: &dyn ControlSource, control: &'static str) -> Result<f64, ConfigError> {
    let raw = source
        .value(control)
        .ok_or(ConfigError::MissingControl(control))?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(ConfigError::InvalidNumber {
            control,
            value: raw.to_string(),
        }),
    }
}

/// An absent checkbox reads as unchecked.
fn read_checked(source: &dyn ControlSource, control: &'static str) -> Result<bool, ConfigError> {
    match source.value(control).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "true" | "on" | "1" | "checked" => Ok(true),
            "false" | "off" | "0" | "" => Ok(false),
            _ => Err(ConfigError::InvalidOption {
                control,
                value: v,
            }),
        },
    }
}

/// Build a snapshot from every control. Pure: identical control values give
/// structurally equal snapshots.
pub fn rebuild(source: &dyn ControlSource) -> Result<ConfigurationSnapshot, ConfigError> {
    let optimize_raw = source
        .value("optimizeFor")
        .ok_or(ConfigError::MissingControl("optimizeFor"))?;
    let optimize_for = OptimizeFor::parse(optimize_raw).ok_or_else(|| ConfigError::InvalidOption {
        control: "optimizeFor",
        value: optimize_raw.to_string(),
    })?;

    Ok(ConfigurationSnapshot {
        algorithm: AlgorithmConfig {
            population_size: read_u32(source, "populationSize")?,
            max_generations: read_u32(source, "maxGenerations")?,
            crossover_rate: read_u32(source, "crossoverRate")?,
            mutation_rate: read_u32(source, "mutationRate")?,
            early_termination: read_f64(source, "earlyTermination")?,
            minutes_per_sks: read_u32(source, "minutesPerSks")?,
        },
        preferences: PreferenceConfig {
            reserved_penalty: read_u32(source, "reservedPenalty")?,
            preferred_penalty: read_u32(source, "preferredPenalty")?,
            blocked_penalty: read_u32(source, "blockedPenalty")?,
            enable_enhanced: read_checked(source, "enableEnhanced")?,
        },
        constraints: ConstraintConfig {
            clash_weight: read_u32(source, "clashWeight")?,
            allow_partial: read_checked(source, "allowPartial")?,
            optimize_for,
        },
    })
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Holds the active snapshot. Every accepted change replaces it whole.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationModel {
    snapshot: ConfigurationSnapshot,
}

impl ConfigurationModel {
    pub fn new(snapshot: ConfigurationSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &ConfigurationSnapshot {
        &self.snapshot
    }

    /// React to a change event from control `id`. Unknown ids are ignored
    /// (`Ok(false)`). On a parse failure the previous snapshot is kept.
    pub fn on_control_change(
        &mut self,
        id: &str,
        source: &dyn ControlSource,
    ) -> Result<bool, ConfigError> {
        if !is_recognized_control(id) {
            return Ok(false);
        }
        self.snapshot = rebuild(source)?;
        debug!("configuration rebuilt after change to '{}'", id);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Pre-submission check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConfigCheck {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigCheck {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Errors block submission, warnings are advisory. Values are never clamped.
pub fn validate(snapshot: &ConfigurationSnapshot) -> ConfigCheck {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if snapshot.algorithm.population_size < MIN_POPULATION_SIZE {
        errors.push(format!(
            "Population size must be at least {}",
            MIN_POPULATION_SIZE
        ));
    }

    if !RECOMMENDED_CROSSOVER.contains(&snapshot.algorithm.crossover_rate) {
        warnings.push(format!(
            "Crossover rate should be between {}-{}%",
            RECOMMENDED_CROSSOVER.start(),
            RECOMMENDED_CROSSOVER.end()
        ));
    }

    ConfigCheck { errors, warnings }
}
