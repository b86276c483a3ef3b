/// Integration tests for the timetabler-client binary.
///
/// These tests spawn the compiled binary via assert_cmd and verify the JSON
/// stdin/stdout protocol for the commands that need no optimizer server.
///
/// Run with: cargo test --manifest-path crates/client/Cargo.toml
use assert_cmd::Command;
use predicates::str::contains;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("timetabler-client").unwrap();
    // Nothing listens here, so a request that slips through fails fast.
    cmd.env("TIMETABLER_SERVER_URL", "http://127.0.0.1:9");
    cmd
}

const CONTROLS: &str = r#"{
    "populationSize": "20",
    "maxGenerations": "100",
    "crossoverRate": "80",
    "mutationRate": "10",
    "earlyTermination": "0.9",
    "minutesPerSks": "50",
    "reservedPenalty": "1000",
    "preferredPenalty": "30",
    "blockedPenalty": "50",
    "enableEnhanced": "true",
    "clashWeight": "100",
    "allowPartial": "false",
    "optimizeFor": "quality"
}"#;

// ---------------------------------------------------------------------------
// validateDataset
// ---------------------------------------------------------------------------

#[test]
fn validate_complete_courses_file() {
    let input = r#"{
        "command": "validateDataset",
        "kind": "courses",
        "fileName": "courses.csv",
        "content": "nama,dosen,sks\nAlgoritma,Budi,3\nBasis Data,Sari,2\n"
    }"#;

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""ok":true"#))
        .stdout(contains(r#""status":"validated""#))
        .stdout(contains(r#""isValid":true"#))
        .stdout(contains(r#""rowCount":2"#));
}

#[test]
fn validate_reports_missing_columns_without_failing() {
    let input = r#"{
        "command": "validateDataset",
        "kind": "courses",
        "fileName": "courses.csv",
        "content": "nama,dosen,credit,extra\nAlgoritma,Budi,3,x"
    }"#;

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""missingColumns":["sks"]"#))
        .stdout(contains(r#""isValid":false"#))
        .stdout(contains(r#""status":"missingColumns""#));
}

#[test]
fn validate_accepts_spreadsheets_unparsed() {
    let input = r#"{
        "command": "validateDataset",
        "kind": "rooms",
        "fileName": "rooms.XLSX",
        "content": "PK-binary"
    }"#;

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""status":"accepted""#))
        .stdout(contains(r#""headers":[]"#))
        .stdout(contains(r#""rowCount":0"#));
}

#[test]
fn validate_rejects_unsupported_extension() {
    let input = r#"{
        "command": "validateDataset",
        "kind": "times",
        "fileName": "times.pdf",
        "content": "hari,jam_mulai"
    }"#;

    cmd()
        .write_stdin(input)
        .assert()
        .failure()
        .stdout(contains(r#""ok":false"#))
        .stdout(contains("Invalid file type"));
}

// ---------------------------------------------------------------------------
// checkConfig
// ---------------------------------------------------------------------------

#[test]
fn check_config_returns_snapshot() {
    let input = format!(r#"{{"command": "checkConfig", "controls": {}}}"#, CONTROLS);

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""populationSize":20"#))
        .stdout(contains(r#""optimizeFor":"quality""#))
        .stdout(contains(r#""errors":[]"#))
        .stdout(contains(r#""warnings":[]"#));
}

#[test]
fn check_config_flags_population_and_crossover() {
    let controls = CONTROLS
        .replace(r#""populationSize": "20""#, r#""populationSize": "3""#)
        .replace(r#""crossoverRate": "80""#, r#""crossoverRate": "40""#);
    let input = format!(r#"{{"command": "checkConfig", "controls": {}}}"#, controls);

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains("Population size must be at least 4"))
        .stdout(contains("Crossover rate should be between 50-95%"));
}

#[test]
fn check_config_rejects_non_numeric_value() {
    let controls = CONTROLS.replace(r#""mutationRate": "10""#, r#""mutationRate": "lots""#);
    let input = format!(r#"{{"command": "checkConfig", "controls": {}}}"#, controls);

    cmd()
        .write_stdin(input)
        .assert()
        .failure()
        .stdout(contains(r#""ok":false"#))
        .stdout(contains("mutationRate"));
}

// ---------------------------------------------------------------------------
// render
// ---------------------------------------------------------------------------

#[test]
fn render_formats_statistics_and_tiers() {
    let input = r#"{
        "command": "render",
        "result": {
            "statistics": {
                "fitness": 0.87654,
                "executionTime": 12.346,
                "generations": 42,
                "totalViolations": 3,
                "reservedViolations": 0,
                "ramUsage": 128
            },
            "schedule": [
                {"course": "Algoritma", "lecturer": "Budi", "day": "Senin", "time": "07:00",
                 "room": "R101", "status": "Clash"},
                {"course": "Basis Data", "lecturer": "Sari", "day": "Selasa", "time": "09:30",
                 "room": "R102", "status": "Something New"}
            ]
        }
    }"#;

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""value":"0.8765""#))
        .stdout(contains(r#""value":"12.35s""#))
        .stdout(contains(r#""value":"128MB""#))
        .stdout(contains(r#""label":"Total Violations","value":"3","tier":"warning""#))
        .stdout(contains(r#""status":"Clash","tier":"error""#))
        .stdout(contains(r#""status":"Something New","tier":"ok""#));
}

// ---------------------------------------------------------------------------
// submit / export
// ---------------------------------------------------------------------------

#[test]
fn submit_without_mandatory_files_fails_before_network() {
    let dir = std::env::temp_dir().join(format!("timetabler-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let courses = dir.join("courses.csv");
    std::fs::write(&courses, "nama,dosen,sks\nAlgoritma,Budi,3\n").unwrap();

    let input = format!(
        r#"{{"command": "submit", "files": {{"courses": {}}}}}"#,
        serde_json::to_string(&courses).unwrap()
    );

    cmd()
        .write_stdin(input)
        .assert()
        .failure()
        .stdout(contains("Missing required files: times, rooms"))
        .stdout(contains(r#""level":"error""#));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn submit_rejects_unknown_dataset_kind() {
    let input = r#"{"command": "submit", "files": {"lecturers": "/tmp/x.csv"}}"#;

    cmd()
        .write_stdin(input)
        .assert()
        .failure()
        .stdout(contains("Unknown dataset kind 'lecturers'"));
}

#[test]
fn export_reports_transport_failure() {
    let input = r#"{
        "command": "export",
        "result": {"statistics": {}, "schedule": []},
        "format": "csv",
        "outDir": "."
    }"#;

    cmd()
        .write_stdin(input)
        .assert()
        .failure()
        .stdout(contains(r#""ok":false"#))
        .stdout(contains("Request failed"));
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[test]
fn invalid_json_input() {
    cmd()
        .write_stdin("not json")
        .assert()
        .failure()
        .stdout(contains("Invalid JSON input"));
}

#[test]
fn unknown_command() {
    cmd()
        .write_stdin(r#"{"command": "optimize"}"#)
        .assert()
        .failure()
        .stdout(contains(r#""ok":false"#));
}
