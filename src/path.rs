// result folder structure:
// {result-dir}/
// \- {submission}_{size}cbp/
//    |- rollup                             (ignored)
//    |- {length}_{system}-{n}.res
//    \- {length}_{system}-{n} (2).res      (ignored)
//
// processed trace folder structure:
// {snapshot-dir}/
// \- {length}_{type}-{n}.json[.zst]

use crate::{AnalysisError, Result};
use std::path::{Path, PathBuf};

/// Default location of the extracted CBP-16 evaluation results
pub fn default_result_dir() -> PathBuf {
    PathBuf::from("cbp2016.eval")
        .join("results")
        .join("cbp2016_evaluation_results")
}

/// Default location of per-PC snapshots written by the simulator
pub fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("processed_traces")
}

/// Trace identity recovered from `<length>_<system>-<n>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceName {
    pub length: String,
    pub system: String,
    pub n: String,
}

impl TraceName {
    /// `<length>_<system>`, i.e. the name without the repetition index
    pub fn full(&self) -> String {
        format!("{}_{}", self.length, self.system)
    }
}

fn strip_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => file_name,
    }
}

/// Parse a report or snapshot file name into its trace identity.
///
/// The extension is whatever follows the last `.`; the repetition index is
/// whatever follows the last `-` of the stem; the rest must contain exactly
/// one `_`. All three parts must be non-empty.
pub fn parse_trace_file_name(file_name: &str) -> Result<TraceName> {
    let reject = |reason: &str| AnalysisError::Naming {
        path: PathBuf::from(file_name),
        reason: reason.to_string(),
    };

    let stem = strip_extension(file_name);
    let (full, n) = stem
        .rsplit_once('-')
        .ok_or_else(|| reject("expected `-<repetition>` before the extension"))?;
    let mut parts = full.split('_');
    let (length, system) = match (parts.next(), parts.next(), parts.next()) {
        (Some(length), Some(system), None) => (length, system),
        _ => return Err(reject("expected exactly one `_` between length and system")),
    };
    if length.is_empty() || system.is_empty() || n.is_empty() {
        return Err(reject("empty length, system or repetition"));
    }

    Ok(TraceName {
        length: length.to_string(),
        system: system.to_string(),
        n: n.to_string(),
    })
}

/// Split `<submission>_<suffix>` at the last `_` and return
/// `(submission, size class)`; `cbp` is removed from the suffix.
pub fn parse_submission_dir_name(dir_name: &str) -> Result<(String, String)> {
    let (name, suffix) = dir_name
        .rsplit_once('_')
        .ok_or_else(|| AnalysisError::Naming {
            path: PathBuf::from(dir_name),
            reason: "expected `<submission>_<size>`".to_string(),
        })?;
    let size = suffix.replace("cbp", "");
    if name.is_empty() || size.is_empty() {
        return Err(AnalysisError::Naming {
            path: PathBuf::from(dir_name),
            reason: "empty submission or size".to_string(),
        });
    }
    Ok((name.to_string(), size))
}

/// Sort key for report files: alphabetic prefix before the last `-`, then the
/// numeric repetition. Suffixes that are not plain numbers sort as 0.
pub fn report_sort_key(file_name: &str) -> (String, u64) {
    let stem = strip_extension(file_name);
    match stem.rsplit_once('-') {
        None => (stem.to_string(), 0),
        Some((prefix, n)) => {
            let n = if n.contains('(') {
                0
            } else {
                n.trim().parse().unwrap_or(0)
            };
            (prefix.to_string(), n)
        }
    }
}

/// Files inside a submission directory that never hold a trace report
pub fn is_ignored_report(file_name: &str) -> bool {
    file_name == "rollup" || file_name.ends_with(" (2).res")
}

pub fn file_name_str(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| AnalysisError::Naming {
            path: path.to_path_buf(),
            reason: "not valid utf-8".to_string(),
        })
}
