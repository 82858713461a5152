use crate::{AnalysisError, OpType, Result, file_name_str, io_err, parse_trace_file_name};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    io::Cursor,
    path::{Path, PathBuf},
};

/// Confusion counts of one static branch over one trace run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcRecord {
    #[serde(rename = "PC")]
    pub pc: u64,
    #[serde(rename = "opType")]
    pub op_type: OpType,
    /// predicted taken, was taken
    #[serde(rename = "TP")]
    pub tp: u64,
    /// predicted taken, was not taken
    #[serde(rename = "FP")]
    pub fp: u64,
    /// predicted not taken, was not taken
    #[serde(rename = "TN")]
    pub tn: u64,
    /// predicted not taken, was taken
    #[serde(rename = "FN")]
    pub fn_: u64,
    /// number of executions whose direction differs from the previous one
    pub trans_count: u64,
}

impl PcRecord {
    pub fn dynamic_executions(&self) -> u64 {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn taken(&self) -> u64 {
        self.tp + self.fn_
    }

    pub fn not_taken(&self) -> u64 {
        self.tn + self.fp
    }

    pub fn mispredictions(&self) -> u64 {
        self.fp + self.fn_
    }
}

/// Mispredictions counted within the first `<pct>%` of a trace, keyed
/// `warm_<pct>pct`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarmupSnapshot {
    pub counters: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceId {
    /// file stem, e.g. SHORT_MOBILE-1
    pub trace_full: String,
    pub trace_length: String,
    pub trace_type: String,
    pub trace_n: u32,
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.trace_full)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceSnapshot {
    pub id: TraceId,
    pub pcs: Vec<PcRecord>,
    pub warmup: WarmupSnapshot,
}

// opType is kept as the raw code so an unknown class can be reported with its PC
#[derive(Deserialize)]
struct RawPcRecord {
    #[serde(rename = "PC")]
    pc: u64,
    #[serde(rename = "opType")]
    op_type: u32,
    #[serde(rename = "TP")]
    tp: u64,
    #[serde(rename = "FP")]
    fp: u64,
    #[serde(rename = "TN")]
    tn: u64,
    #[serde(rename = "FN")]
    fn_: u64,
    trans_count: u64,
}

#[derive(Deserialize)]
struct RawSnapshotFile {
    pcs: Vec<RawPcRecord>,
    #[serde(default)]
    warmup: WarmupSnapshot,
}

#[derive(Serialize)]
struct SnapshotFile<'a> {
    pcs: &'a [PcRecord],
    warmup: &'a WarmupSnapshot,
}

const JSON_EXT: &str = ".json";
const ZSTD_EXT: &str = ".json.zst";

fn trace_id_from_path(path: &Path) -> Result<TraceId> {
    let file_name = file_name_str(path)?;
    let stem = file_name
        .strip_suffix(ZSTD_EXT)
        .or_else(|| file_name.strip_suffix(JSON_EXT))
        .ok_or_else(|| AnalysisError::Naming {
            path: path.to_path_buf(),
            reason: format!("expected {JSON_EXT} or {ZSTD_EXT}"),
        })?;
    // the parser expects an extension
    let name = parse_trace_file_name(&format!("{stem}{JSON_EXT}"))?;
    let trace_n = name.n.parse().map_err(|_| AnalysisError::Naming {
        path: path.to_path_buf(),
        reason: format!("repetition {:?} is not a number", name.n),
    })?;
    Ok(TraceId {
        trace_full: stem.to_string(),
        trace_length: name.length,
        trace_type: name.system,
        trace_n,
    })
}

fn is_snapshot_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(JSON_EXT) || name.ends_with(ZSTD_EXT))
}

/// Read one per-trace snapshot, transparently decompressing `.json.zst`
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<TraceSnapshot> {
    let path = path.as_ref();
    let id = trace_id_from_path(path)?;
    let mut content = std::fs::read(path).map_err(io_err(path))?;
    if path.to_string_lossy().ends_with(ZSTD_EXT) {
        content = zstd::stream::decode_all(Cursor::new(content)).map_err(io_err(path))?;
    }
    let raw: RawSnapshotFile =
        serde_json::from_slice(&content).map_err(|source| AnalysisError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let mut seen = HashSet::new();
    let mut pcs = Vec::with_capacity(raw.pcs.len());
    for record in raw.pcs {
        let snapshot_err = |reason: String| AnalysisError::Snapshot {
            path: path.to_path_buf(),
            pc: Some(record.pc),
            reason,
        };
        if !seen.insert(record.pc) {
            return Err(snapshot_err("PC appears twice".to_string()));
        }
        let op_type = OpType::try_from(record.op_type).map_err(snapshot_err)?;
        pcs.push(PcRecord {
            pc: record.pc,
            op_type,
            tp: record.tp,
            fp: record.fp,
            tn: record.tn,
            fn_: record.fn_,
            trans_count: record.trans_count,
        });
    }

    Ok(TraceSnapshot {
        id,
        pcs,
        warmup: raw.warmup,
    })
}

/// Write a snapshot in the layout [`load_snapshot`] reads; `.json.zst`
/// paths are zstd-compressed
pub fn save_snapshot<P: AsRef<Path>>(path: P, snapshot: &TraceSnapshot) -> Result<()> {
    let path = path.as_ref();
    let file = SnapshotFile {
        pcs: &snapshot.pcs,
        warmup: &snapshot.warmup,
    };
    let mut content = serde_json::to_vec(&file).map_err(|source| AnalysisError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if path.to_string_lossy().ends_with(ZSTD_EXT) {
        content = zstd::stream::encode_all(Cursor::new(content), 0).map_err(io_err(path))?;
    }
    std::fs::write(path, content).map_err(io_err(path))
}

/// Load every snapshot under `dir`, sorted by trace name.
///
/// The directory is produced by the simulation stage; its absence is a
/// [`AnalysisError::MissingPrerequisite`].
pub fn load_snapshots<P: AsRef<Path>>(dir: P) -> Result<Vec<TraceSnapshot>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(AnalysisError::MissingPrerequisite {
            path: dir.to_path_buf(),
        });
    }

    let mut paths: Vec<PathBuf> = vec![];
    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let path = entry.map_err(io_err(dir))?.path();
        if is_snapshot_file(&path) {
            paths.push(path);
        } else {
            debug!("Skipping {}", path.display());
        }
    }

    let mut snapshots = paths
        .iter()
        .map(load_snapshot)
        .collect::<Result<Vec<_>>>()?;
    snapshots.sort_by(|a, b| a.id.cmp(&b.id));
    for pair in snapshots.windows(2) {
        if pair[0].id.trace_full == pair[1].id.trace_full {
            return Err(AnalysisError::Snapshot {
                path: dir.join(&pair[1].id.trace_full),
                pc: None,
                reason: "trace stored both compressed and uncompressed".to_string(),
            });
        }
    }
    info!("Loaded {} trace snapshots from {}", snapshots.len(), dir.display());
    Ok(snapshots)
}
