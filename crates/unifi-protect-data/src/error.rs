use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Frame decode error: {0}")]
    FrameDecode(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("Invalid bootstrap: {0}")]
    InvalidBootstrap(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Compression error: {0}")]
    Deflate(#[from] std::io::Error),
}
