/// End-to-end tests for job submission, progress streaming and downloads
/// against a loopback HTTP server that replays canned responses.
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use timetabler_client::export::ExportFormat;
use timetabler_client::model::{DatasetKind, SchedulingResult};
use timetabler_client::session::READY_MESSAGE;
use timetabler_client::settings::{ResponseMode, Settings};
use timetabler_client::stream::StreamError;
use timetabler_client::submitter::SubmitError;
use timetabler_client::{ClientError, NotificationLevel, Session};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const RESULT_JSON: &str = r#"{"statistics":{"fitness":0.92,"executionTime":3.5,"generations":50,"totalViolations":1,"reservedViolations":0,"ramUsage":64},"schedule":[{"course":"Algoritma","lecturer":"Budi","sks":3,"day":"Senin","time":"07:00","room":"R101","capacity":40,"status":"OK"}]}"#;

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one HTTP request, honouring Content-Length or chunked encoding.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(head_end) = find(&buf, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        let body_len = buf.len() - head_end - 4;
        match content_length {
            Some(len) if body_len >= len => break,
            Some(_) => continue,
            None if head.contains("transfer-encoding: chunked") => {
                if buf.ends_with(b"0\r\n\r\n") {
                    break;
                }
            }
            None => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve exactly one request with `response`. With `hold_open` the
/// connection stays up after the response has been written.
async fn serve_once(response: Vec<u8>, hold_open: bool) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(&response).await.unwrap();
        socket.flush().await.unwrap();
        if hold_open {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        request
    });

    (base_url, handle)
}

fn event_stream(events: &[&str]) -> Vec<u8> {
    let mut out =
        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n".to_vec();
    for event in events {
        out.extend_from_slice(format!("data: {}\n\n", event).as_bytes());
    }
    out
}

fn with_body(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

fn loaded_session(base_url: String, response_mode: ResponseMode) -> Session {
    let mut session = Session::new(Settings {
        base_url,
        response_mode,
        ..Settings::default()
    });
    session
        .upload(DatasetKind::Courses, "courses.csv", b"nama,dosen,sks\nAlgoritma,Budi,3\n".to_vec())
        .unwrap();
    session
        .upload(DatasetKind::Times, "times.csv", b"hari,jam_mulai\nSenin,07:00\n".to_vec())
        .unwrap();
    session
        .upload(DatasetKind::Rooms, "rooms.csv", b"nama,kapasitas\nR101,40\n".to_vec())
        .unwrap();
    session.take_notifications();
    session
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streamed_job_reports_progress_and_completes() {
    let complete = format!(r#"{{"type":"complete","result":{}}}"#, RESULT_JSON);
    let (base_url, server) = serve_once(
        event_stream(&[
            r#"{"type":"progress","progress":5,"message":"Loading data"}"#,
            r#"{"type":"generation","generation":25,"fitness":0.5,"progress":80,"message":"Generation 25/31"}"#,
            "not json at all",
            &complete,
        ]),
        false,
    )
    .await;

    let mut session = loaded_session(base_url, ResponseMode::Stream);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = session.submit(std::future::pending(), Some(tx)).await.unwrap();

    assert_eq!(result.schedule.len(), 1);
    assert_eq!(result.statistics.ram_usage, 64);
    assert_eq!(session.result(), Some(&result));
    assert_eq!(session.progress().message, READY_MESSAGE);

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].message, "Loading data");
    // 25 of the snapshot's 50 generations, not the server's own figure.
    assert_eq!(updates[1].percent, 50.0);
    assert_eq!(updates[1].message, "Generation 25: Best fitness 0.5000");

    let notes = session.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Success);
    assert_eq!(notes[0].message, "Scheduling optimization completed!");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/schedule"));
    assert!(request.to_ascii_lowercase().contains("accept: text/event-stream"));
    assert!(request.contains(r#"name="courses"; filename="courses.csv""#));
    assert!(request.contains(r#"name="config""#));
    assert!(request.contains(r#""populationSize":10"#));
    assert!(!request.contains(r#"name="preferences""#));
}

#[tokio::test]
async fn server_error_event_is_shown_verbatim() {
    let (base_url, _server) = serve_once(
        event_stream(&[
            r#"{"type":"progress","progress":10,"message":"Running"}"#,
            r#"{"type":"error","message":"No feasible timetable"}"#,
        ]),
        false,
    )
    .await;

    let mut session = loaded_session(base_url, ResponseMode::Stream);
    let err = session.submit(std::future::pending(), None).await.unwrap_err();

    assert!(matches!(err, ClientError::Stream(StreamError::Server(ref m)) if m == "No feasible timetable"));
    assert!(session.result().is_none());
    assert_eq!(session.progress().message, READY_MESSAGE);
    let notes = session.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Error);
    assert_eq!(notes[0].message, "No feasible timetable");
}

#[tokio::test]
async fn stream_without_terminal_event_fails() {
    let (base_url, _server) = serve_once(
        event_stream(&[r#"{"type":"progress","progress":10,"message":"Running"}"#]),
        false,
    )
    .await;

    let mut session = loaded_session(base_url, ResponseMode::Stream);
    let err = session.submit(std::future::pending(), None).await.unwrap_err();

    assert!(matches!(err, ClientError::Stream(StreamError::ClosedUnexpectedly)));
    assert_eq!(
        session.notifications()[0].message,
        "Scheduling failed: connection closed unexpectedly"
    );
}

#[tokio::test]
async fn shutdown_cancels_a_running_job() {
    let (base_url, _server) = serve_once(
        event_stream(&[r#"{"type":"progress","progress":1,"message":"Starting"}"#]),
        true,
    )
    .await;

    let mut session = loaded_session(base_url, ResponseMode::Stream);
    let shutdown = tokio::time::sleep(Duration::from_millis(200));
    let err = session.submit(shutdown, None).await.unwrap_err();

    assert!(matches!(err, ClientError::Stream(StreamError::Cancelled)));
    assert_eq!(session.progress().message, READY_MESSAGE);
    assert!(session.can_submit());
}

// ---------------------------------------------------------------------------
// Direct responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_cancels_while_waiting_for_a_direct_result() {
    // Accepts the job and never answers.
    let (base_url, _server) = serve_once(Vec::new(), true).await;

    let mut session = loaded_session(base_url, ResponseMode::Json);
    let shutdown = tokio::time::sleep(Duration::from_millis(200));
    let err = tokio::time::timeout(Duration::from_secs(5), session.submit(shutdown, None))
        .await
        .expect("submit ignored the shutdown signal")
        .unwrap_err();

    assert!(matches!(err, ClientError::Stream(StreamError::Cancelled)));
    assert!(session.result().is_none());
    assert_eq!(session.progress().message, READY_MESSAGE);
    let notes = session.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].message, "Scheduling failed: Processing cancelled");
    assert!(session.can_submit());
}

#[tokio::test]
async fn json_mode_accepts_a_direct_result() {
    let (base_url, server) = serve_once(
        with_body("200 OK", "application/json", RESULT_JSON.as_bytes()),
        false,
    )
    .await;

    let mut session = loaded_session(base_url, ResponseMode::Json);
    let result = session.submit(std::future::pending(), None).await.unwrap();
    assert_eq!(result.statistics.generations, 50);

    let rendered = session.rendered().unwrap();
    assert_eq!(rendered.statistics[3].value, "1");

    let request = server.await.unwrap();
    assert!(request.to_ascii_lowercase().contains("accept: application/json"));
}

#[tokio::test]
async fn http_failure_carries_status_and_detail() {
    let (base_url, _server) = serve_once(
        with_body(
            "400 Bad Request",
            "application/json",
            br#"{"error":"rooms: Missing required columns: kapasitas"}"#,
        ),
        false,
    )
    .await;

    let mut session = loaded_session(base_url, ResponseMode::Stream);
    let err = session.submit(std::future::pending(), None).await.unwrap_err();

    match err {
        ClientError::Submit(SubmitError::Status { status, detail }) => {
            assert_eq!(status, 400);
            assert_eq!(detail.as_deref(), Some("rooms: Missing required columns: kapasitas"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(
        session.notifications()[0].message,
        "Scheduling failed: HTTP error! status: 400: rooms: Missing required columns: kapasitas"
    );
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

fn download_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("timetabler-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn export_writes_the_downloaded_file() {
    let csv = b"Course,Lecturer\nAlgoritma,Budi\n";
    let (base_url, server) = serve_once(with_body("200 OK", "text/csv", csv), false).await;

    let mut session = loaded_session(base_url, ResponseMode::Stream);
    session.restore_result(serde_json::from_str::<SchedulingResult>(RESULT_JSON).unwrap());

    let dir = download_dir("export");
    let path = session.export(ExportFormat::Csv, &dir).await.unwrap();

    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("schedule_") && name.ends_with(".csv"), "{}", name);
    assert_eq!(std::fs::read(&path).unwrap(), csv);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/export/csv"));
    assert!(request.contains(r#""course":"Algoritma""#));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn report_sends_result_and_configuration() {
    let (base_url, server) =
        serve_once(with_body("200 OK", "text/plain", b"SCHEDULING REPORT\n"), false).await;

    let mut session = loaded_session(base_url, ResponseMode::Stream);
    session.restore_result(serde_json::from_str::<SchedulingResult>(RESULT_JSON).unwrap());

    let dir = download_dir("report");
    let path = session.report(&dir).await.unwrap();

    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("scheduling_report_") && name.ends_with(".txt"), "{}", name);
    assert_eq!(
        session.take_notifications()[0].message,
        "Detailed report generated successfully!"
    );

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/report"));
    assert!(request.contains(r#""results":"#));
    assert!(request.contains(r#""maxGenerations":50"#));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn failed_export_reports_status() {
    let (base_url, _server) = serve_once(
        with_body("500 Internal Server Error", "application/json", br#"{"error":"disk full"}"#),
        false,
    )
    .await;

    let mut session = loaded_session(base_url, ResponseMode::Stream);
    session.restore_result(SchedulingResult::default());

    let dir = download_dir("export-fail");
    let err = session.export(ExportFormat::Excel, &dir).await.unwrap_err();
    assert!(err.to_string().contains("500"), "{}", err);
    assert_eq!(session.notifications()[0].level, NotificationLevel::Error);

    std::fs::remove_dir_all(&dir).ok();
}
