use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The {what} file '{}' does not exist.", path.display())]
    FileNotFound { what: &'static str, path: PathBuf },

    #[error("Parse error in {location}: {message}")]
    Parse { location: String, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid input found at {field}. Input must be one of {expected:?}. Found: {found}")]
    InvalidInput {
        field: &'static str,
        expected: &'static [&'static str],
        found: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn parse(location: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Fail early when a file the run depends on is missing.
pub fn ensure_exists(what: &'static str, path: impl Into<PathBuf>) -> Result<()> {
    let path = path.into();
    if path.exists() {
        Ok(())
    } else {
        Err(Error::FileNotFound { what, path })
    }
}
