//! Error types shared by the loader, renderer and starter-deck writer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to read one of the deck's source files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}", path = .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Rendering errors.
///
/// The `Display` text is sent to the browser verbatim, so it is phrased for a
/// person looking at the page rather than for a log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The requested index is negative, past the last slide, or not a number.
    /// `index` is the integer the request parsed to, or `NaN`.
    #[error("There is no slide with the index \"{index}\"")]
    NoSuchSlide { index: String },
}

/// Errors raised while writing a starter deck with `mdslides init`.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to create directory {path}: {source}", path = .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}", path = .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
