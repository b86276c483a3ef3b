use serde::Serialize;

use crate::model::{SchedulingResult, Statistics};

// ---------------------------------------------------------------------------
// Status tiers
// ---------------------------------------------------------------------------

/// Visual tier of a schedule row or metric.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StatusTier {
    Ok,
    Warning,
    Error,
}

/// Map a free-form status string onto a tier. Matching ignores case but not
/// surrounding whitespace.
///
/// Unrecognised statuses fall back to [`StatusTier::Ok`]: the optimizer only
/// emits the listed problem statuses, so anything else is informational.
pub fn classify_status(status: &str) -> StatusTier {
    match status.to_lowercase().as_str() {
        "ok" | "optimal" => StatusTier::Ok,
        "warning" | "preference issue" => StatusTier::Warning,
        "conflict" | "clash" | "reserved violation" => StatusTier::Error,
        _ => StatusTier::Ok,
    }
}

// ---------------------------------------------------------------------------
// Display structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub label: &'static str,
    pub value: String,
    pub tier: StatusTier,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    pub course: String,
    pub lecturer: String,
    pub day: String,
    pub time: String,
    pub room: String,
    pub status: String,
    pub tier: StatusTier,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderedResult {
    /// Always six entries, in panel order.
    pub statistics: [Metric; 6],
    pub schedule: Vec<ScheduleRow>,
}

fn tier_if(nonzero: u32, tier: StatusTier) -> StatusTier {
    if nonzero > 0 {
        tier
    } else {
        StatusTier::Ok
    }
}

fn statistics_panel(stats: &Statistics) -> [Metric; 6] {
    [
        Metric {
            label: "Best Fitness",
            value: format!("{:.4}", stats.fitness),
            tier: StatusTier::Ok,
        },
        Metric {
            label: "Execution Time",
            value: format!("{:.2}s", stats.execution_time),
            tier: StatusTier::Ok,
        },
        Metric {
            label: "Generations",
            value: stats.generations.to_string(),
            tier: StatusTier::Ok,
        },
        Metric {
            label: "Total Violations",
            value: stats.total_violations.to_string(),
            tier: tier_if(stats.total_violations, StatusTier::Warning),
        },
        Metric {
            label: "Reserved Violations",
            value: stats.reserved_violations.to_string(),
            tier: tier_if(stats.reserved_violations, StatusTier::Error),
        },
        Metric {
            label: "RAM Usage",
            value: format!("{}MB", stats.ram_usage),
            tier: StatusTier::Ok,
        },
    ]
}

/// Turn a finished result into the statistics panel and schedule table.
pub fn render(result: &SchedulingResult) -> RenderedResult {
    let schedule = result
        .schedule
        .iter()
        .map(|entry| ScheduleRow {
            course: entry.course.clone(),
            lecturer: entry.lecturer.clone(),
            day: entry.day.clone(),
            time: entry.time.clone(),
            room: entry.room.clone(),
            status: entry.status.clone(),
            tier: classify_status(&entry.status),
        })
        .collect();

    RenderedResult {
        statistics: statistics_panel(&result.statistics),
        schedule,
    }
}
