//! Errors raised while reading catalog naming state.

use std::num::ParseIntError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The `tile-version` file exists but does not hold a version number.
    #[error("{} holds {text:?}, not a layout version: {source}", path.display())]
    InvalidVersion {
        path: PathBuf,
        text: String,
        #[source]
        source: ParseIntError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
