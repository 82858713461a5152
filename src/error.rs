use crate::TraceKey;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single report body could not be turned into a record.
///
/// Every variant carries the payload as it looked after edge-case
/// normalization, which is what gets printed in the diagnostic banner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("{lines} lines remain after normalization, expected one")]
    MultipleLines { lines: usize, content: String },
    #[error("no `)` follows the `(TOTAL` marker")]
    UnclosedTotal { content: String },
    #[error("odd number of key/value tokens ({count})")]
    OddTokens { count: usize, content: String },
}

impl ReportError {
    pub fn content(&self) -> &str {
        match self {
            ReportError::MultipleLines { content, .. }
            | ReportError::UnclosedTotal { content }
            | ReportError::OddTokens { content, .. } => content,
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to parse report {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ReportError,
    },
    #[error("invalid name {}: {reason}", path.display())]
    Naming { path: PathBuf, reason: String },
    #[error("column {column} of {key}: cannot convert {value:?} to {kind}")]
    Coerce {
        key: TraceKey,
        column: String,
        value: String,
        kind: &'static str,
    },
    #[error("{key} appears twice, second time in {}", path.display())]
    DuplicateKey { key: TraceKey, path: PathBuf },
    #[error(
        "expected the directory {} to exist, run the trace simulation stage before analyzing processed traces",
        path.display()
    )]
    MissingPrerequisite { path: PathBuf },
    #[error("column {0} already exists")]
    ColumnExists(String),
    #[error("malformed snapshot {}{}: {reason}", path.display(), pc.map(|pc| format!(" at PC 0x{pc:x}")).unwrap_or_default())]
    Snapshot {
        path: PathBuf,
        pc: Option<u64>,
        reason: String,
    },
    #[error("unusable result cache {}: {reason}", path.display())]
    Cache { path: PathBuf, reason: String },
    #[error("trace {trace}: malformed warmup counter {key:?}")]
    WarmupKey { trace: String, key: String },
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Attach a path to an `io::Error`
pub(crate) fn io_err(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> AnalysisError {
    let path = path.into();
    move |source| AnalysisError::Io { path, source }
}
