use std::{
    io,
    path::PathBuf,
};

use thiserror::Error;


pub type Result<T> = std::result::Result<T, QeError>;


/// Which part of an input deck a schema lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaItem {
    Namelist,
    Card,
}


#[derive(Debug, Error)]
pub enum QeError {
    #[error("file {path:?} not found")]
    FileNotFound { path: PathBuf },

    #[error("unknown {kind:?} `{name}`, not present in the reference schema")]
    SchemaViolation { kind: SchemaItem, name: String },

    #[error("parameter `{param}` = `{value}` cannot be converted to {expected}")]
    TypeMismatch { param: String, value: String, expected: String },

    #[error("unrecognized line{}: {line:?}", location(.ikpoint, .iband))]
    UnrecognizedFormat { line: String, ikpoint: Option<usize>, iband: Option<usize> },

    #[error("failed to decode projections of k-point #{ikpoint} (block starts with {first_line:?})")]
    ProjectionDecodeError {
        ikpoint: usize,
        first_line: String,
        #[source]
        source: Box<QeError>,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no data points inside the energy window [{lo}, {hi}]")]
    EmptyWindow { lo: f64, hi: f64 },

    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Config(#[from] Box<figment::Error>),
}


impl QeError {
    pub(crate) fn unrecognized(line: &str) -> Self {
        Self::UnrecognizedFormat { line: line.to_string(), ikpoint: None, iband: None }
    }
}


fn location(ikpoint: &Option<usize>, iband: &Option<usize>) -> String {
    match (*ikpoint, *iband) {
        (Some(k), Some(b)) => format!(" at k-point #{} band #{}", k, b),
        (Some(k), None)    => format!(" at k-point #{}", k),
        (None, Some(b))    => format!(" at band #{}", b),
        (None, None)       => String::new(),
    }
}
