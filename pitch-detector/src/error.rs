/// Error kinds for detector construction and inference, shaped like
/// `flydra-feature-detector`'s error enum.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unsupported pixel format for classical detection: {0:?}")]
    UnsupportedPixelFormat(pitch_types::PixelFormat),
    #[error("frame dimensions {width}x{height} do not match background model {bg_width}x{bg_height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        bg_width: u32,
        bg_height: u32,
    },
    #[error("ML backend error: {0}")]
    Ml(String),
}

pub type Result<T> = std::result::Result<T, Error>;
