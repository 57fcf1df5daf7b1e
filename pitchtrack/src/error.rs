/// Top-level error type. Wraps every lower crate's error the way
/// `flydra2::Error` wraps `mvg::MvgError`; the binary converts this into
/// `anyhow::Error` at `main`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] pitch_config::Error),
    #[error("camera error: {0}")]
    Camera(#[from] pitch_camera::Error),
    #[error("detector error: {0}")]
    Detector(#[from] pitch_detector::Error),
    #[error("recorder error: {0}")]
    Recorder(#[from] pitch_recorder::error::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0} did not join within the shutdown timeout")]
    ShutdownIncomplete(&'static str),
    #[error("start_capture called while capture is already running")]
    AlreadyCapturing,
    #[error("operation requires an active capture session")]
    NotCapturing,
    #[error("operation requires an armed session")]
    NoSession,
}

pub type Result<T> = std::result::Result<T, Error>;
