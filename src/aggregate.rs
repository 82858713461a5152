//! Instruction-count-weighted aggregation of per-PC metrics
use crate::{
    H2pThresholds, Metric, OpType, PcMetrics, PcRecord, RateMetrics, TraceId, TraceSnapshot,
    compute_pc_metrics, ratio, weighted_mean,
};
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;

/// Trace-level metrics: every rate is the mean of the per-PC rates weighted
/// by dynamic executions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceMetrics {
    pub id: TraceId,
    /// sum of per-PC dynamic executions
    pub n_instr: u64,
    pub rates: RateMetrics,
}

/// Share of one PC in its trace's metrics: summing a rate over all PCs of a
/// trace gives the trace-level value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PcContribution {
    pub pc: u64,
    pub op_type: OpType,
    /// fraction of the trace's executions
    pub dynamic_executions: f64,
    pub rates: RateMetrics,
}

/// Everything derived from one trace snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TraceAnalysis {
    pub pcs: Vec<PcRecord>,
    /// aligned with `pcs`
    pub pc_metrics: Vec<PcMetrics>,
    pub trace: TraceMetrics,
    /// aligned with `pcs`
    pub contributions: Vec<PcContribution>,
}

pub fn aggregate_trace(
    id: &TraceId,
    pcs: &[PcRecord],
    metrics: &[PcMetrics],
) -> (TraceMetrics, Vec<PcContribution>) {
    assert_eq!(pcs.len(), metrics.len());
    let n_instr: u64 = metrics.iter().map(|m| m.dynamic_executions).sum();
    if n_instr == 0 {
        warn!("Trace {} has no executed PCs, its metrics are all 0", id);
    }

    let rates = RateMetrics::from_fn(|metric| {
        weighted_mean(
            metrics
                .iter()
                .map(|m| (m.rates.get(metric), m.dynamic_executions)),
        )
    });

    let contributions = pcs
        .iter()
        .zip(metrics)
        .map(|(pc, m)| PcContribution {
            pc: pc.pc,
            op_type: pc.op_type,
            dynamic_executions: ratio(m.dynamic_executions, n_instr),
            rates: RateMetrics::from_fn(|metric| {
                m.rates.get(metric) * ratio(m.dynamic_executions, n_instr)
            }),
        })
        .collect();

    (
        TraceMetrics {
            id: id.clone(),
            n_instr,
            rates,
        },
        contributions,
    )
}

/// Per-PC metrics, trace metrics and PC contributions of one snapshot
pub fn analyze_trace(snapshot: &TraceSnapshot) -> TraceAnalysis {
    let pc_metrics: Vec<PcMetrics> = snapshot.pcs.iter().map(compute_pc_metrics).collect();
    let (trace, contributions) = aggregate_trace(&snapshot.id, &snapshot.pcs, &pc_metrics);
    TraceAnalysis {
        pcs: snapshot.pcs.clone(),
        pc_metrics,
        trace,
        contributions,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TopKShare {
    pub k: usize,
    /// fraction of trace MPKI due to the K worst PCs, averaged over traces
    pub mean_share: f64,
}

/// For K = 1..=`k_max`, the average over traces of the fraction of the
/// trace's MPKI contributed by its K largest contributors.
///
/// Traces without any misprediction carry no MPKI to split and are left out
/// of the average.
pub fn top_k_contribution<'a, I>(traces: I, k_max: usize) -> Vec<TopKShare>
where
    I: IntoIterator<Item = &'a [PcContribution]>,
{
    let mut share_sums = vec![0.0; k_max];
    let mut count = 0usize;
    for contributions in traces {
        let mut mpki: Vec<f64> = contributions.iter().map(|c| c.rates.mpki).collect();
        let total: f64 = mpki.iter().sum();
        if total <= 0.0 {
            continue;
        }
        mpki.sort_by(|a, b| b.total_cmp(a));
        let mut cumulative = 0.0;
        for (k, sum) in share_sums.iter_mut().enumerate() {
            if let Some(value) = mpki.get(k) {
                cumulative += value;
            }
            *sum += cumulative / total;
        }
        count += 1;
    }

    share_sums
        .iter()
        .enumerate()
        .map(|(k, sum)| TopKShare {
            k: k + 1,
            mean_share: if count == 0 { 0.0 } else { sum / count as f64 },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpTypeSummary {
    pub op_type: OpType,
    /// static PCs of this class over all traces
    pub pc_count: usize,
    pub dynamic_executions: u64,
    pub rates: RateMetrics,
}

/// Execution-weighted metrics per instruction class across all traces
pub fn optype_breakdown(analyses: &[TraceAnalysis]) -> Vec<OpTypeSummary> {
    let mut groups: BTreeMap<OpType, Vec<&PcMetrics>> = BTreeMap::new();
    for analysis in analyses {
        for (pc, m) in analysis.pcs.iter().zip(&analysis.pc_metrics) {
            groups.entry(pc.op_type).or_default().push(m);
        }
    }

    groups
        .into_iter()
        .map(|(op_type, metrics)| OpTypeSummary {
            op_type,
            pc_count: metrics.len(),
            dynamic_executions: metrics.iter().map(|m| m.dynamic_executions).sum(),
            rates: RateMetrics::from_fn(|metric: Metric| {
                weighted_mean(
                    metrics
                        .iter()
                        .map(|m| (m.rates.get(metric), m.dynamic_executions)),
                )
            }),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct H2pSummary {
    pub id: TraceId,
    /// static H2P branches
    pub count: usize,
    /// dynamic executions of H2P branches
    pub executions: u64,
    pub mispredictions: u64,
    /// accuracy over H2P executions only
    pub accuracy: f64,
    /// fraction of the trace's mispredictions due to H2P branches
    pub misprediction_share: f64,
}

/// Whether a PC is hard to predict: inaccurate, frequently executed and
/// frequently mispredicted.
///
/// Counts are scaled to a window of 30M branch executions: `n_instr` is the
/// sum of per-PC executions of the snapshot, not the trace's total
/// instruction count, so configured thresholds are per 30M branches.
pub fn is_hard_to_predict(
    pc: &PcRecord,
    metrics: &PcMetrics,
    n_instr: u64,
    thresholds: &H2pThresholds,
) -> bool {
    if n_instr == 0 {
        return false;
    }
    let scale = 30_000_000.0 / n_instr as f64;
    metrics.rates.accuracy < thresholds.max_accuracy
        && metrics.dynamic_executions as f64 * scale >= thresholds.min_executions_per_30m
        && pc.mispredictions() as f64 * scale >= thresholds.min_mispredictions_per_30m
}

pub fn hard_to_predict(analysis: &TraceAnalysis, thresholds: &H2pThresholds) -> H2pSummary {
    let n_instr = analysis.trace.n_instr;
    let mut count = 0;
    let mut executions = 0;
    let mut mispredictions = 0;
    let mut total_mispredictions = 0;
    for (pc, m) in analysis.pcs.iter().zip(&analysis.pc_metrics) {
        total_mispredictions += pc.mispredictions();
        if is_hard_to_predict(pc, m, n_instr, thresholds) {
            count += 1;
            executions += m.dynamic_executions;
            mispredictions += pc.mispredictions();
        }
    }

    H2pSummary {
        id: analysis.trace.id.clone(),
        count,
        executions,
        mispredictions,
        accuracy: ratio(executions - mispredictions, executions),
        misprediction_share: ratio(mispredictions, total_mispredictions),
    }
}
