use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    NotSupported(String),

    #[error("{0}")]
    InvalidData(String),

    #[error("{0}")]
    InvalidFile(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Prepends `prefix` to the message, keeping the error kind.
    pub fn prefix(self, prefix: impl Display) -> Self {
        match self {
            Error::NotSupported(msg) => Error::NotSupported(format!("{prefix}{msg}")),
            Error::InvalidData(msg) => Error::InvalidData(format!("{prefix}{msg}")),
            Error::InvalidFile(msg) => Error::InvalidFile(format!("{prefix}{msg}")),
            Error::NotFound(msg) => Error::NotFound(format!("{prefix}{msg}")),
            Error::Internal(msg) => Error::Internal(format!("{prefix}{msg}")),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), format!("{prefix}{e}"))),
        }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Error::NotSupported(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub trait ResultExt<T> {
    fn prefix_err(self, prefix: impl Display) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn prefix_err(self, prefix: impl Display) -> Result<T> {
        self.map_err(|e| e.prefix(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_keeps_kind() {
        let err = Error::NotFound("no payload set".into()).prefix("image 3: ");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "image 3: no payload set");
    }

    #[test]
    fn prefix_err_on_result() {
        let res: Result<()> = Err(Error::Internal("out of range".into()));
        let err = res.prefix_err("failed to apply patch @0x4: ").unwrap_err();
        assert!(matches!(err, Error::Internal(ref m) if m == "failed to apply patch @0x4: out of range"));
    }
}
