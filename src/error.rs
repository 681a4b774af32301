//! Error types for the realtime decoder, the schedule reducer and retrieval.

use std::path::PathBuf;

use thiserror::Error;

use crate::realtime::wire::WireType;

/// Failure to decode a realtime feed snapshot. Always fatal for the snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer ended while reading {context}")]
    Truncated { context: &'static str },

    #[error("varint is longer than 64 bits")]
    VarintOverflow,

    #[error("invalid wire type {0}")]
    InvalidWireType(u8),

    #[error("invalid field tag {0}")]
    InvalidTag(u64),

    #[error("length-delimited field of {len} bytes exceeds the {remaining} bytes remaining")]
    LengthOutOfBounds { len: u64, remaining: usize },

    #[error("groups nested deeper than {limit} levels")]
    RecursionLimit { limit: usize },

    #[error("end-group for field {0} without a matching start-group")]
    UnexpectedEndGroup(u32),

    #[error("{message}.{field} (tag {tag}) expected wire type {expected:?}, found {found:?}")]
    WireTypeMismatch {
        message: &'static str,
        field: &'static str,
        tag: u32,
        expected: WireType,
        found: WireType,
    },

    #[error("{message} is missing required field {field}")]
    MissingRequiredField {
        message: &'static str,
        field: &'static str,
    },
}

/// Fatal failures of a static schedule reduction run.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("required table {table} could not be read from {}", path.display())]
    MissingInput {
        table: &'static str,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("table {table} has no {column:?} column")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("line {line} of {table} is malformed: {source}")]
    MalformedRow {
        table: &'static str,
        line: usize,
        #[source]
        source: csv::Error,
    },

    #[error("stop_time_overrides stop_id {value:?} is not of the form <numeric-id>_<platform>")]
    MalformedCompositeKey { value: String },

    #[error("failed to write {table} to {}", path.display())]
    Write {
        table: &'static str,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("output directory {} has no final component", path.display())]
    InvalidOutputDir { path: PathBuf },

    #[error("failed to {action} {}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the retrieval plumbing that feeds the pipelines.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url {0:?}")]
    InvalidUrl(String),

    #[error("GET {url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
