//! Corpus-wide table of parsed reports, one row per trace run
use crate::{
    AnalysisError, ReportRecord, Result, file_name_str, get_tqdm_style, io_err,
    is_ignored_report, parse_report, parse_submission_dir_name, parse_trace_file_name,
    recompute_rates, report_sort_key,
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// Names of the five index levels, in order
pub const INDEX_NAMES: [&str; 5] = ["name", "size", "trace_length", "trace_sys", "trace_n"];

/// Identity of one trace run of one submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceKey {
    /// submission
    pub name: String,
    /// predictor storage budget class, e.g. 8KB
    pub size: String,
    pub trace_length: String,
    pub trace_sys: String,
    /// repetition index
    pub trace_n: String,
}

impl std::fmt::Display for TraceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.name, self.size, self.trace_length, self.trace_sys, self.trace_n
        )
    }
}

/// Equality compares floats with `total_cmp`, so a NaN cell equals itself
/// and tables survive a save/load round trip unchanged.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b).is_eq(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Numeric view of the cell; text cells have none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(_) | Value::Text(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// Convert a raw cell by column-name convention: `NUM*` columns are counts,
/// `MPKBr*` and `MISPRED*` columns are rates, anything else stays text.
pub fn coerce(key: &TraceKey, column: &str, raw: &str) -> Result<Value> {
    let fail = |kind| AnalysisError::Coerce {
        key: key.clone(),
        column: column.to_string(),
        value: raw.to_string(),
        kind,
    };
    if column.starts_with("NUM") {
        raw.trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| fail("integer"))
    } else if column.starts_with("MPKBr") || column.starts_with("MISPRED") {
        raw.trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| fail("float"))
    } else {
        Ok(Value::Text(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub key: TraceKey,
    values: BTreeMap<String, Value>,
}

impl ResultRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }
}

/// Rows keyed uniquely by [`TraceKey`], in directory-walk order.
///
/// Columns only grow: a derived column never replaces an existing one, except
/// for the recomputed rate columns written by [`recompute_rates`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<ResultRow>,
    index: HashMap<TraceKey, usize>,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    index: Vec<String>,
    columns: Vec<String>,
    rows: Vec<CacheRow>,
}

#[derive(Serialize, Deserialize)]
struct CacheRow {
    key: TraceKey,
    values: Vec<Option<String>>,
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = vec![];
    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        paths.push(entry.map_err(io_err(dir))?.path());
    }
    Ok(paths)
}

fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(io_err(path))
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn get(&self, key: &TraceKey) -> Option<&ResultRow> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    /// Distinct size classes in first-seen order
    pub fn sizes(&self) -> Vec<String> {
        let mut sizes: Vec<String> = vec![];
        for row in &self.rows {
            if !sizes.contains(&row.key.size) {
                sizes.push(row.key.size.clone());
            }
        }
        sizes
    }

    /// Cells of one column, `None` where the row has no value
    pub fn column(&self, column: &str) -> Vec<Option<Value>> {
        self.rows.iter().map(|row| row.get(column).cloned()).collect()
    }

    pub fn column_f64(&self, column: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| row.f64(column)).collect()
    }

    fn register_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    fn push_row(&mut self, row: ResultRow, path: &Path) -> Result<()> {
        if self.index.contains_key(&row.key) {
            return Err(AnalysisError::DuplicateKey {
                key: row.key,
                path: path.to_path_buf(),
            });
        }
        for column in row.values.keys() {
            self.register_column(column);
        }
        self.index.insert(row.key.clone(), self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    /// Insert the parsed report of `path` under `key`, coercing its cells
    pub fn insert(&mut self, key: TraceKey, record: &ReportRecord, path: &Path) -> Result<()> {
        let mut values = BTreeMap::new();
        // keep report order for new columns
        for (column, raw) in record.iter() {
            values.insert(column.to_string(), coerce(&key, column, raw)?);
            self.register_column(column);
        }
        self.push_row(ResultRow { key, values }, path)
    }

    /// Add a new column; `values` is aligned with [`rows`](Self::rows)
    pub fn add_column(&mut self, column: &str, values: Vec<Option<Value>>) -> Result<()> {
        if self.columns.iter().any(|c| c == column) {
            return Err(AnalysisError::ColumnExists(column.to_string()));
        }
        self.write_column(column, values);
        Ok(())
    }

    /// Replace or add a recomputed rate column
    pub(crate) fn write_column(&mut self, column: &str, values: Vec<Option<Value>>) {
        assert_eq!(values.len(), self.rows.len());
        self.register_column(column);
        for (row, value) in self.rows.iter_mut().zip(values) {
            match value {
                Some(value) => {
                    row.values.insert(column.to_string(), value);
                }
                None => {
                    row.values.remove(column);
                }
            }
        }
    }

    /// Walk `<result_dir>/<submission>_<size>/<length>_<system>-<n>.res` and
    /// parse every report. Any malformed report aborts the whole build.
    pub fn build<P: AsRef<Path>>(result_dir: P) -> Result<ResultTable> {
        let result_dir = result_dir.as_ref();
        if !result_dir.is_dir() {
            return Err(AnalysisError::MissingPrerequisite {
                path: result_dir.to_path_buf(),
            });
        }

        let mut submissions = vec![];
        for path in list_dir(result_dir)? {
            if path.is_dir() {
                submissions.push(path);
            } else {
                warn!("Skipping {}: not a submission directory", path.display());
            }
        }
        submissions.sort();

        let mut table = ResultTable::new();
        let pbar = indicatif::ProgressBar::new(submissions.len() as u64);
        pbar.set_style(get_tqdm_style());
        pbar.set_message("Parsing reports");
        for submission_dir in &submissions {
            let submission = file_name_str(submission_dir)?;
            let (name, size) = parse_submission_dir_name(submission)?;

            let mut reports = vec![];
            for path in list_dir(submission_dir)? {
                let file_name = file_name_str(&path)?.to_string();
                if is_ignored_report(&file_name) {
                    debug!("Ignoring {}", path.display());
                    continue;
                }
                reports.push((report_sort_key(&file_name), file_name, path));
            }
            reports.sort();

            for (_, file_name, path) in reports {
                let trace = parse_trace_file_name(&file_name)?;
                let raw = std::fs::read(&path).map_err(io_err(&path))?;
                let record = match parse_report(&String::from_utf8_lossy(&raw)) {
                    Ok(record) => record,
                    Err(source) => {
                        error!(
                            "{}\n{:>30} - {}\n{}\n{}\n{}",
                            "=".repeat(80),
                            submission,
                            file_name,
                            "-".repeat(80),
                            source.content(),
                            "=".repeat(80)
                        );
                        return Err(AnalysisError::Parse { path, source });
                    }
                };
                let key = TraceKey {
                    name: name.clone(),
                    size: size.clone(),
                    trace_length: trace.length,
                    trace_sys: trace.system,
                    trace_n: trace.n,
                };
                table.insert(key, &record, &path)?;
            }
            pbar.inc(1);
        }
        pbar.finish_and_clear();

        info!(
            "Parsed {} reports from {} submissions in {}",
            table.len(),
            submissions.len(),
            result_dir.display()
        );
        Ok(table)
    }

    /// Persist the table as a flat json table indexed by [`INDEX_NAMES`].
    ///
    /// The file is written next to `path` and renamed into place, so readers
    /// only ever see a complete cache.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let cache = CacheFile {
            index: INDEX_NAMES.iter().map(|name| name.to_string()).collect(),
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|row| CacheRow {
                    key: row.key.clone(),
                    values: self
                        .columns
                        .iter()
                        .map(|column| row.get(column).map(Value::to_string))
                        .collect(),
                })
                .collect(),
        };
        let content = serde_json::to_vec(&cache).map_err(|source| AnalysisError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(parent).map_err(io_err(parent))?;
        file.write_all(&content).map_err(io_err(file.path()))?;
        file.persist(path)
            .map_err(|err| io_err(path)(err.error))?;
        info!("Result table written to {}", path.display());
        Ok(())
    }

    /// Read a table written by [`save`](Self::save), re-applying coercion
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ResultTable> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(io_err(path))?;
        let cache: CacheFile =
            serde_json::from_slice(&content).map_err(|source| AnalysisError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if cache.index != INDEX_NAMES {
            return Err(AnalysisError::Cache {
                path: path.to_path_buf(),
                reason: format!("unexpected index {:?}", cache.index),
            });
        }

        let mut table = ResultTable::new();
        for column in &cache.columns {
            table.register_column(column);
        }
        for row in cache.rows {
            if row.values.len() != cache.columns.len() {
                return Err(AnalysisError::Cache {
                    path: path.to_path_buf(),
                    reason: format!(
                        "row {} has {} cells for {} columns",
                        row.key,
                        row.values.len(),
                        cache.columns.len()
                    ),
                });
            }
            let mut values = BTreeMap::new();
            for (column, raw) in cache.columns.iter().zip(row.values) {
                if let Some(raw) = raw {
                    values.insert(column.clone(), coerce(&row.key, column, &raw)?);
                }
            }
            table.push_row(
                ResultRow {
                    key: row.key,
                    values,
                },
                path,
            )?;
        }
        Ok(table)
    }

    /// Load the cache unless it is missing, outdated or `no_cache` is set;
    /// otherwise rebuild from the reports, derive rates and refresh the cache.
    pub fn load_or_build<P1: AsRef<Path>, P2: AsRef<Path>>(
        result_dir: P1,
        cache_path: P2,
        no_cache: bool,
    ) -> Result<ResultTable> {
        let result_dir = result_dir.as_ref();
        let cache_path = cache_path.as_ref();
        if !no_cache && cache_is_fresh(cache_path, result_dir)? {
            info!("Using cached results from {}", cache_path.display());
            return ResultTable::load(cache_path);
        }

        info!("Parsing results from {}", result_dir.display());
        let mut table = ResultTable::build(result_dir)?;
        recompute_rates(&mut table)?;
        table.save(cache_path)?;
        Ok(table)
    }
}

/// A cache is fresh when it exists and everything under `result_dir` (two
/// levels deep) is strictly older than it. Equal timestamps count as stale
/// since some file systems only keep whole seconds. A missing `result_dir`
/// cannot invalidate it.
pub fn cache_is_fresh(cache_path: &Path, result_dir: &Path) -> Result<bool> {
    if !cache_path.is_file() {
        return Ok(false);
    }
    if !result_dir.is_dir() {
        return Ok(true);
    }
    let cache_time = modified(cache_path)?;
    if modified(result_dir)? >= cache_time {
        return Ok(false);
    }
    for submission_dir in list_dir(result_dir)? {
        if modified(&submission_dir)? >= cache_time {
            debug!("{} is not older than the cache", submission_dir.display());
            return Ok(false);
        }
        if submission_dir.is_dir() {
            for report in list_dir(&submission_dir)? {
                if modified(&report)? >= cache_time {
                    debug!("{} is not older than the cache", report.display());
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str, n: &str) -> TraceKey {
        TraceKey {
            name: name.to_string(),
            size: "8KB".to_string(),
            trace_length: "SHORT".to_string(),
            trace_sys: "MOBILE".to_string(),
            trace_n: n.to_string(),
        }
    }

    fn record(pairs: &[(&str, &str)]) -> ReportRecord {
        let mut record = ReportRecord::default();
        for (k, v) in pairs {
            record.insert(k.to_string(), v.to_string());
        }
        record
    }

    #[test]
    fn coercion_follows_column_prefix() {
        let k = key("A", "1");
        assert_eq!(coerce(&k, "NUM_BR", " 42").unwrap(), Value::Int(42));
        assert_eq!(
            coerce(&k, "MISPRED_PER_1K_INST", "0.5").unwrap(),
            Value::Float(0.5)
        );
        assert_eq!(coerce(&k, "MPKBr_1K", "12").unwrap(), Value::Float(12.0));
        assert_eq!(
            coerce(&k, "PREDICTOR", "tage").unwrap(),
            Value::Text("tage".to_string())
        );
        assert!(matches!(
            coerce(&k, "NUM_BR", "1.5"),
            Err(AnalysisError::Coerce { kind: "integer", .. })
        ));
        assert!(matches!(
            coerce(&k, "MISPRED_PER_1K_INST", "n/a"),
            Err(AnalysisError::Coerce { kind: "float", .. })
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut table = ResultTable::new();
        let path = Path::new("A_8KB/SHORT_MOBILE-1.res");
        table
            .insert(key("A", "1"), &record(&[("NUM_BR", "1")]), path)
            .unwrap();
        let err = table
            .insert(key("A", "1"), &record(&[("NUM_BR", "2")]), path)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateKey { .. }));
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].i64("NUM_BR"), Some(1));
    }

    #[test]
    fn missing_cells_stay_absent() {
        let mut table = ResultTable::new();
        let path = Path::new("x.res");
        table
            .insert(key("A", "1"), &record(&[("NUM_BR", "1")]), path)
            .unwrap();
        table
            .insert(key("A", "2"), &record(&[("NUM_UNCOND_BR", "3")]), path)
            .unwrap();
        assert_eq!(table.columns(), ["NUM_BR", "NUM_UNCOND_BR"]);
        assert_eq!(table.column_f64("NUM_BR"), vec![Some(1.0), None]);
        assert_eq!(table.get(&key("A", "2")).unwrap().get("NUM_BR"), None);
    }

    #[test]
    fn add_column_never_overwrites() {
        let mut table = ResultTable::new();
        table
            .insert(key("A", "1"), &record(&[("NUM_BR", "1")]), Path::new("x"))
            .unwrap();
        assert!(matches!(
            table.add_column("NUM_BR", vec![Some(Value::Int(5))]),
            Err(AnalysisError::ColumnExists(_))
        ));
        table
            .add_column("EXTRA", vec![Some(Value::Float(2.5))])
            .unwrap();
        assert_eq!(table.rows()[0].f64("EXTRA"), Some(2.5));
        assert_eq!(table.rows()[0].i64("NUM_BR"), Some(1));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut table = ResultTable::new();
        table
            .insert(
                key("A", "1"),
                &record(&[
                    ("NUM_INSTRUCTIONS", "1000000"),
                    ("MISPRED_PER_1K_INST", "0.1234567890123"),
                    ("PREDICTOR", "tage"),
                ]),
                Path::new("x"),
            )
            .unwrap();
        table
            .insert(
                key("B", "2"),
                &record(&[("NUM_INSTRUCTIONS", "7"), ("MPKBr_1K", "3.5")]),
                Path::new("y"),
            )
            .unwrap();
        table.save(&path).unwrap();
        let loaded = ResultTable::load(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(
            loaded.get(&key("A", "1")).unwrap().get("MISPRED_PER_1K_INST"),
            Some(&Value::Float(0.1234567890123))
        );
    }

    #[test]
    fn load_rejects_foreign_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"index":["a"],"columns":[],"rows":[]}"#).unwrap();
        assert!(matches!(
            ResultTable::load(&path),
            Err(AnalysisError::Cache { .. })
        ));
    }

    #[test]
    fn undefined_rates_survive_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut table = ResultTable::new();
        table
            .insert(
                key("A", "1"),
                &record(&[
                    ("NUM_INSTRUCTIONS", "1000"),
                    ("NUM_BR", "0"),
                    ("NUM_CONDITIONAL_BR", "0"),
                    ("NUM_MISPREDICTIONS", "0"),
                ]),
                Path::new("x"),
            )
            .unwrap();
        recompute_rates(&mut table).unwrap();
        let rate = table.rows()[0].f64(crate::MPRED1KB).unwrap();
        assert!(rate.is_nan());

        table.save(&path).unwrap();
        let loaded = ResultTable::load(&path).unwrap();
        assert!(loaded.rows()[0].f64(crate::MPRED1KB).unwrap().is_nan());
        assert_eq!(loaded, table);
        assert_ne!(Value::Float(f64::NAN), Value::Float(0.0));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    fn set_modified(path: &Path, time: SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn report_as_old_as_the_cache_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let result_dir = dir.path().join("results");
        let report = result_dir.join("A_8KBcbp").join("SHORT_MOBILE-1.res");
        std::fs::create_dir_all(report.parent().unwrap()).unwrap();
        std::fs::write(&report, "NUM_BR: 1").unwrap();
        let cache = dir.path().join("cache.json");
        std::fs::write(&cache, "{}").unwrap();

        let cache_time = SystemTime::now() + std::time::Duration::from_secs(100);
        set_modified(&cache, cache_time);
        set_modified(&report, cache_time);
        assert!(!cache_is_fresh(&cache, &result_dir).unwrap());

        set_modified(&report, cache_time - std::time::Duration::from_secs(10));
        assert!(cache_is_fresh(&cache, &result_dir).unwrap());
    }
}
