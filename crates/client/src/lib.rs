//! Client-side orchestration for a remote course-scheduling optimizer:
//! dataset validation, configuration snapshots, job submission, progress
//! streaming and result rendering.

pub mod config;
pub mod export;
pub mod model;
pub mod renderer;
pub mod session;
pub mod settings;
pub mod stream;
pub mod submitter;
pub mod validator;

use std::path::PathBuf;

pub use session::{Notification, NotificationLevel, Session};

/// Any failure a session operation can report.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Upload(#[from] validator::UploadError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Submit(#[from] submitter::SubmitError),
    #[error(transparent)]
    Stream(#[from] stream::StreamError),
    #[error(transparent)]
    Export(#[from] export::ExportError),
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("No schedule data available")]
    NoResult,
}
