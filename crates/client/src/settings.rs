use std::env;
use std::time::Duration;

use log::warn;
use serde::Deserialize;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const SERVER_URL_ENV: &str = "TIMETABLER_SERVER_URL";
pub const TIMEOUT_ENV: &str = "TIMETABLER_TIMEOUT_SECS";

/// Which response shape the client asks the job endpoint for.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ResponseMode {
    /// Server-sent progress events, then a terminal event.
    #[default]
    Stream,
    /// One synchronous JSON result.
    Json,
}

impl ResponseMode {
    pub fn accept_header(self) -> &'static str {
        match self {
            ResponseMode::Stream => "text/event-stream",
            ResponseMode::Json => "application/json",
        }
    }
}

/// Connection settings for the optimizer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub response_mode: ResponseMode,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: DEFAULT_SERVER_URL.to_string(),
            response_mode: ResponseMode::Stream,
            timeout: None,
        }
    }
}

/// Per-request overrides, as carried in a CLI request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverride {
    pub base_url: Option<String>,
    pub response_mode: Option<ResponseMode>,
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Defaults overlaid with `TIMETABLER_SERVER_URL` and
    /// `TIMETABLER_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        if let Ok(url) = env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                settings.base_url = url.trim().to_string();
            }
        }
        if let Ok(raw) = env::var(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => settings.timeout = Some(Duration::from_secs(secs)),
                _ => warn!("ignoring {}='{}': expected a positive integer", TIMEOUT_ENV, raw),
            }
        }
        settings
    }

    pub fn with_override(mut self, over: &SettingsOverride) -> Self {
        if let Some(url) = &over.base_url {
            self.base_url = url.clone();
        }
        if let Some(mode) = over.response_mode {
            self.response_mode = mode;
        }
        if let Some(secs) = over.timeout_secs {
            self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        self
    }

    /// Join an API path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
