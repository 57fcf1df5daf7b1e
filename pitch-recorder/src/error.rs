/// Recorder-local error type. Callers treat every variant as non-fatal: log
/// it, set `incomplete: true` on the pitch manifest, and keep going.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("JPEG/PNG encode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON write error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
