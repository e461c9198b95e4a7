use thiserror::Error;

/// The conversion service could not be acquired. Fatal for the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to load conversion service: {message}")]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Malformed diagram text. The message is shown to the user verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn at_line(line: usize, detail: impl AsRef<str>) -> Self {
        Self::new(format!("Parse error on line {line}: {}", detail.as_ref()))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("nothing to rasterize")]
    EmptyScene,
    #[error("invalid preview size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("bitmap {width}x{height} exceeds canvas limits")]
    CanvasLimit { width: u32, height: u32 },
    #[error("failed to rasterize scene: {0}")]
    Rasterize(String),
    #[error("failed to encode bitmap: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage is unavailable")]
    Unavailable,
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InsertError {
    #[error("no successful conversion to insert")]
    NoConversion,
    #[error("conversion result is stale")]
    Stale,
    #[error("dialog is already closed")]
    Closed,
}
