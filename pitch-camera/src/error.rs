/// Error kinds shaped like `ci2::Error`'s variant set.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("camera not found: {0}")]
    CameraNotFound(String),
    #[error("camera busy: {0}")]
    CameraBusy(String),
    #[error("camera mode not supported: {0}")]
    CameraModeUnsupported(String),
    #[error("transient read error: {0}")]
    CameraReadTransient(String),
    #[error("fatal read error: {0}")]
    CameraReadFatal(String),
    #[error("read timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;
