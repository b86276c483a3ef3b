use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use timetabler_client::config;
use timetabler_client::export::ExportFormat;
use timetabler_client::model::{DatasetKind, SchedulingResult};
use timetabler_client::renderer::{self, RenderedResult};
use timetabler_client::settings::{Settings, SettingsOverride};
use timetabler_client::stream::ProgressUpdate;
use timetabler_client::validator::{self, ValidationOutcome};
use timetabler_client::{Notification, Session};

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Request {
    /// Parse and check one tabular file without contacting the optimizer.
    ValidateDataset {
        kind: DatasetKind,
        file_name: String,
        content: String,
    },
    /// Build a configuration snapshot from raw control values and check it.
    CheckConfig {
        controls: BTreeMap<String, String>,
    },
    Render {
        result: SchedulingResult,
    },
    /// Upload files by path, submit the job and follow its progress.
    Submit {
        /// Dataset kind name -> file path.
        files: BTreeMap<String, PathBuf>,
        controls: Option<BTreeMap<String, String>>,
        server: Option<SettingsOverride>,
    },
    Export {
        result: SchedulingResult,
        format: ExportFormat,
        out_dir: Option<PathBuf>,
        server: Option<SettingsOverride>,
    },
    Report {
        result: SchedulingResult,
        controls: Option<BTreeMap<String, String>>,
        out_dir: Option<PathBuf>,
        server: Option<SettingsOverride>,
    },
}

#[derive(Debug, Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReport {
    #[serde(flatten)]
    outcome: ValidationOutcome,
    headers: Vec<String>,
    row_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitReport {
    result: SchedulingResult,
    rendered: RenderedResult,
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadReport {
    path: PathBuf,
    notifications: Vec<Notification>,
}

#[derive(Serialize)]
struct ProgressLine<'a> {
    event: &'static str,
    #[serde(flatten)]
    update: &'a ProgressUpdate,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_line<T: Serialize>(value: &T) {
    let json = serde_json::to_string(value).unwrap_or_else(|e| {
        format!("{{\"ok\":false,\"error\":\"serialization error: {}\"}}", e)
    });
    println!("{}", json);
    let _ = io::stdout().flush();
}

fn write_ok<T: Serialize>(data: T) {
    write_line(&OkResponse { ok: true, data });
}

fn write_err_with(msg: impl std::fmt::Display, notifications: &[Notification]) -> ! {
    write_line(&ErrResponse {
        ok: false,
        error: msg.to_string(),
        notifications: notifications.to_vec(),
    });
    std::process::exit(1);
}

fn write_err(msg: impl std::fmt::Display) -> ! {
    write_err_with(msg, &[])
}

fn settings_for(server: Option<&SettingsOverride>) -> Settings {
    let settings = Settings::from_env();
    match server {
        Some(over) => settings.with_override(over),
        None => settings,
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn apply_controls(session: &mut Session, controls: &BTreeMap<String, String>) {
    // Any recognised id triggers a full rebuild from every control.
    if let Err(e) = session.on_control_change(config::ALGORITHM_CONTROLS[0], controls) {
        write_err_with(e, session.notifications());
    }
}

fn out_dir(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| PathBuf::from("."))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn submit(
    files: BTreeMap<String, PathBuf>,
    controls: Option<BTreeMap<String, String>>,
    server: Option<SettingsOverride>,
) {
    let mut session = Session::new(settings_for(server.as_ref()));

    for (name, path) in &files {
        let Some(kind) = DatasetKind::from_field_name(name) else {
            write_err(format!("Unknown dataset kind '{}'", name));
        };
        if let Err(e) = session.upload_path(kind, path).await {
            write_err_with(e, session.notifications());
        }
    }
    if let Some(controls) = &controls {
        apply_controls(&mut session, controls);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            write_line(&ProgressLine {
                event: "progress",
                update: &update,
            });
        }
    });

    let outcome = session.submit(shutdown_signal(), Some(tx)).await;
    // The sender lives in the reader, so the printer drains and stops here.
    let _ = printer.await;

    match outcome {
        Ok(result) => {
            let rendered = renderer::render(&result);
            write_ok(SubmitReport {
                result,
                rendered,
                notifications: session.take_notifications(),
            });
        }
        Err(e) => write_err_with(e, session.notifications()),
    }
}

async fn download(
    result: SchedulingResult,
    export_format: Option<ExportFormat>,
    controls: Option<BTreeMap<String, String>>,
    dir: PathBuf,
    server: Option<SettingsOverride>,
) {
    let mut session = Session::new(settings_for(server.as_ref()));
    if let Some(controls) = &controls {
        apply_controls(&mut session, controls);
    }
    session.restore_result(result);

    let outcome = match export_format {
        Some(format) => session.export(format, &dir).await,
        None => session.report(&dir).await,
    };
    match outcome {
        Ok(path) => write_ok(DownloadReport {
            path,
            notifications: session.take_notifications(),
        }),
        Err(e) => write_err_with(e, session.notifications()),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // stdout carries the JSON protocol; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Read all of stdin
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        write_err(format!("Failed to read stdin: {}", e));
    }

    // Parse request
    let request: Request = match serde_json::from_str(&input) {
        Ok(r) => r,
        Err(e) => write_err(format!("Invalid JSON input: {}", e)),
    };

    match request {
        Request::ValidateDataset {
            kind,
            file_name,
            content,
        } => match validator::validate_upload(kind, &file_name, content.into_bytes()) {
            Ok((dataset, outcome)) => write_ok(DatasetReport {
                outcome,
                row_count: dataset.parsed_rows.len(),
                headers: dataset.parsed_headers,
            }),
            Err(e) => write_err(e),
        },
        Request::CheckConfig { controls } => match config::rebuild(&controls) {
            Ok(snapshot) => {
                let check = config::validate(&snapshot);
                write_ok(serde_json::json!({
                    "snapshot": snapshot,
                    "errors": check.errors,
                    "warnings": check.warnings,
                }));
            }
            Err(e) => write_err(e),
        },
        Request::Render { result } => write_ok(renderer::render(&result)),
        Request::Submit {
            files,
            controls,
            server,
        } => submit(files, controls, server).await,
        Request::Export {
            result,
            format,
            out_dir: dir,
            server,
        } => download(result, Some(format), None, out_dir(dir), server).await,
        Request::Report {
            result,
            controls,
            out_dir: dir,
            server,
        } => download(result, None, controls, out_dir(dir), server).await,
    }
}
