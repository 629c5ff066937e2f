use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Logdex errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// Stored state that cannot be decoded: unknown descriptor kinds, runs
    /// that fail to decompress, misshapen index rows, a temp file whose
    /// length is not page-aligned. The index must be repaired externally
    /// before further use.
    Corruption(String),
    /// An IO error on the page file or the finalized file.
    IO(String),
    /// An error surfaced by the underlying key-value store.
    Kv(String),
    /// Invalid caller input, typically a key of unknown width.
    InvalidInput(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Corruption(msg) => write!(f, "index corruption: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::Kv(msg) => write!(f, "kv store error: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

/// Constructs an Error::Corruption for the given format string.
#[macro_export]
macro_rules! errcorrupt {
    ($($args:tt)*) => { $crate::error::Error::Corruption(format!($($args)*)).into() };
}

/// A logdex Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::IO(err.to_string())
    }
}
