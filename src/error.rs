use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A download or extraction did not leave the expected artifact on disk.
    #[error("provisioning failed for {path}: {reason}")]
    Provisioning { path: PathBuf, reason: String },

    #[error("failed to load {what}: {reason}")]
    Load { what: &'static str, reason: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("decoding exceeded its deadline after {steps} steps")]
    Timeout { steps: usize },

    #[error("decoding cancelled after {steps} steps")]
    Cancelled { steps: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn provisioning(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Provisioning {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn load(what: &'static str, reason: impl ToString) -> Self {
        Error::Load {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn inference(reason: impl ToString) -> Self {
        Error::Inference(reason.to_string())
    }
}

impl From<candle_core::Error> for Error {
    fn from(e: candle_core::Error) -> Self {
        Error::Inference(e.to_string())
    }
}

impl From<ort::Error> for Error {
    fn from(e: ort::Error) -> Self {
        Error::Inference(e.to_string())
    }
}
