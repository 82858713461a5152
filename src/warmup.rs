//! Attribution of mispredictions to the warmup window at the start of a trace
use crate::{AnalysisError, Result, TraceMetrics, WarmupSnapshot, pearson};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmupShare {
    /// counter name, `warm_<pct>pct` or `warmup_<pct>pct`
    pub key: String,
    pub pct: f64,
    /// all mispredictions of the trace
    pub missed_total: f64,
    /// raw counter value
    pub missed_warmup: u64,
    /// warmup mispredictions capped at the trace total
    pub capped: f64,
    /// in [0, 1]
    pub warmup_share: f64,
    /// capped warmup mispredictions per instruction
    pub normalized: f64,
}

/// Window percentage of a `warm_<pct>pct` or `warmup_<pct>pct` key, `None`
/// for other counters
pub fn parse_warmup_pct(trace: &str, key: &str) -> Result<Option<f64>> {
    if !key.starts_with("warm") {
        return Ok(None);
    }
    let malformed = || AnalysisError::WarmupKey {
        trace: trace.to_string(),
        key: key.to_string(),
    };
    let (prefix, window) = key.rsplit_once('_').ok_or_else(malformed)?;
    if prefix != "warm" && prefix != "warmup" {
        return Err(malformed());
    }
    let pct: f64 = window
        .strip_suffix("pct")
        .ok_or_else(malformed)?
        .parse()
        .map_err(|_| malformed())?;
    if !pct.is_finite() || pct < 0.0 {
        return Err(malformed());
    }
    Ok(Some(pct))
}

pub fn missed_total(n_instr: u64, accuracy: f64) -> f64 {
    n_instr as f64 * (1.0 - accuracy)
}

/// Fraction of all mispredictions that happened in the warmup window, capped
/// at 1. A trace without mispredictions has share 0.
pub fn warmup_share(missed_warmup: u64, missed_total: f64) -> f64 {
    if missed_total <= 0.0 {
        0.0
    } else {
        (missed_warmup as f64 / missed_total).min(1.0)
    }
}

/// One [`WarmupShare`] per warmup counter of the trace, by increasing window
pub fn attribute_warmup(trace: &TraceMetrics, warmup: &WarmupSnapshot) -> Result<Vec<WarmupShare>> {
    let name = trace.id.trace_full.as_str();
    let total = missed_total(trace.n_instr, trace.rates.accuracy);
    let mut shares = vec![];
    for (key, &count) in &warmup.counters {
        let Some(pct) = parse_warmup_pct(name, key)? else {
            debug!("Trace {}: skipping counter {}", name, key);
            continue;
        };
        let capped = (count as f64).min(total).max(0.0);
        shares.push(WarmupShare {
            key: key.clone(),
            pct,
            missed_total: total,
            missed_warmup: count,
            capped,
            warmup_share: warmup_share(count, total),
            normalized: if trace.n_instr == 0 {
                0.0
            } else {
                capped / trace.n_instr as f64
            },
        });
    }
    shares.sort_by(|a, b| a.pct.total_cmp(&b.pct));
    Ok(shares)
}

/// Correlation across traces between one warmup counter and trace MPKI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmupCorrelation {
    pub key: String,
    pub pct: f64,
    pub traces: usize,
    /// capped counter against MPKI, `None` when undefined
    pub counter_vs_mpki: Option<f64>,
    /// normalized counter against MPKI
    pub normalized_vs_mpki: Option<f64>,
}

pub fn warmup_mpki_correlation<'a, I>(traces: I) -> Vec<WarmupCorrelation>
where
    I: IntoIterator<Item = (&'a TraceMetrics, &'a [WarmupShare])>,
{
    #[derive(Default)]
    struct Series {
        pct: f64,
        capped: Vec<f64>,
        normalized: Vec<f64>,
        mpki: Vec<f64>,
    }

    let mut by_key: BTreeMap<&str, Series> = BTreeMap::new();
    for (trace, shares) in traces {
        for share in shares {
            let series = by_key.entry(share.key.as_str()).or_default();
            series.pct = share.pct;
            series.capped.push(share.capped);
            series.normalized.push(share.normalized);
            series.mpki.push(trace.rates.mpki);
        }
    }

    let mut correlations: Vec<WarmupCorrelation> = by_key
        .into_iter()
        .map(|(key, series)| WarmupCorrelation {
            key: key.to_string(),
            pct: series.pct,
            traces: series.mpki.len(),
            counter_vs_mpki: pearson(&series.capped, &series.mpki),
            normalized_vs_mpki: pearson(&series.normalized, &series.mpki),
        })
        .collect();
    correlations.sort_by(|a, b| a.pct.total_cmp(&b.pct));
    correlations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RateMetrics, TraceId};

    fn trace(n: u32, n_instr: u64, accuracy: f64, mpki: f64) -> TraceMetrics {
        TraceMetrics {
            id: TraceId {
                trace_full: format!("SHORT_MOBILE-{}", n),
                trace_length: "SHORT".to_string(),
                trace_type: "MOBILE".to_string(),
                trace_n: n,
            },
            n_instr,
            rates: RateMetrics {
                accuracy,
                mpki,
                ..Default::default()
            },
        }
    }

    fn warmup(counters: &[(&str, u64)]) -> WarmupSnapshot {
        WarmupSnapshot {
            counters: counters
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn share_of_a_typical_trace() {
        let shares = attribute_warmup(
            &trace(1, 1000, 0.98, 20.0),
            &warmup(&[("warm_50pct", 15)]),
        )
        .unwrap();
        assert_eq!(shares.len(), 1);
        let share = &shares[0];
        assert_eq!(share.pct, 50.0);
        assert!((share.missed_total - 20.0).abs() < 1e-9);
        assert_eq!(share.missed_warmup, 15);
        assert!((share.warmup_share - 0.75).abs() < 1e-9);
        assert!((share.normalized - 0.015).abs() < 1e-12);
    }

    #[test]
    fn share_is_capped_and_never_divides_by_zero() {
        let shares = attribute_warmup(
            &trace(1, 1000, 0.98, 20.0),
            &warmup(&[("warm_10pct", 0), ("warm_90pct", 500)]),
        )
        .unwrap();
        assert_eq!(shares[0].warmup_share, 0.0);
        assert_eq!(shares[1].warmup_share, 1.0);
        assert!((shares[1].normalized - 0.02).abs() < 1e-12);

        // perfect predictor
        let shares = attribute_warmup(&trace(1, 1000, 1.0, 0.0), &warmup(&[("warm_5pct", 3)])).unwrap();
        assert_eq!(shares[0].warmup_share, 0.0);
        assert_eq!(shares[0].normalized, 0.0);

        for count in [0u64, 1, 19, 20, 21, 1_000_000] {
            for total in [0.0, 0.5, 20.0, 1e9] {
                let share = warmup_share(count, total);
                assert!((0.0..=1.0).contains(&share), "{} {}", count, total);
            }
        }
    }

    #[test]
    fn windows_are_ordered_by_percentage() {
        let shares = attribute_warmup(
            &trace(1, 1000, 0.9, 100.0),
            &warmup(&[("warm_50pct", 3), ("warm_5pct", 1), ("warm_0.5pct", 0), ("other", 7)]),
        )
        .unwrap();
        let pcts: Vec<f64> = shares.iter().map(|s| s.pct).collect();
        assert_eq!(pcts, vec![0.5, 5.0, 50.0]);
    }

    #[test]
    fn malformed_warmup_key() {
        for key in [
            "warm_pct",
            "warm_50",
            "warmup",
            "warm_-5pct",
            "warm_xpct",
            "warmup_pct",
            "warmish_10pct",
            "warm_up_10pct",
        ] {
            let result = attribute_warmup(&trace(1, 1000, 0.9, 100.0), &warmup(&[(key, 1)]));
            assert!(
                matches!(&result, Err(AnalysisError::WarmupKey { trace, .. }) if trace == "SHORT_MOBILE-1"),
                "{}: {:?}",
                key,
                result
            );
        }
    }

    #[test]
    fn both_counter_prefixes_are_accepted() {
        assert_eq!(parse_warmup_pct("SHORT_MOBILE-1", "warmup_10pct").unwrap(), Some(10.0));
        assert_eq!(parse_warmup_pct("SHORT_MOBILE-1", "warm_10pct").unwrap(), Some(10.0));
        assert_eq!(parse_warmup_pct("SHORT_MOBILE-1", "warmup_0.5pct").unwrap(), Some(0.5));
        assert_eq!(parse_warmup_pct("SHORT_MOBILE-1", "other_10pct").unwrap(), None);

        let shares = attribute_warmup(
            &trace(1, 1000, 0.98, 20.0),
            &warmup(&[("warmup_50pct", 15), ("warmup_10pct", 5)]),
        )
        .unwrap();
        let pcts: Vec<f64> = shares.iter().map(|s| s.pct).collect();
        assert_eq!(pcts, vec![10.0, 50.0]);
        assert!((shares[1].warmup_share - 0.75).abs() < 1e-9);
    }

    #[test]
    fn correlation_with_mpki() {
        let traces = [
            trace(1, 1000, 0.99, 10.0),
            trace(2, 1000, 0.98, 20.0),
            trace(3, 1000, 0.97, 30.0),
        ];
        let shares: Vec<Vec<WarmupShare>> = traces
            .iter()
            .zip([1u64, 2, 3])
            .map(|(t, count)| attribute_warmup(t, &warmup(&[("warm_5pct", count), ("warm_1pct", 1)])).unwrap())
            .collect();
        let correlations =
            warmup_mpki_correlation(traces.iter().zip(&shares).map(|(t, s)| (t, s.as_slice())));
        assert_eq!(correlations.len(), 2);
        assert_eq!(correlations[0].key, "warm_1pct");
        assert_eq!(correlations[0].traces, 3);
        // constant counter
        assert_eq!(correlations[0].counter_vs_mpki, None);
        assert_eq!(correlations[1].key, "warm_5pct");
        assert!((correlations[1].counter_vs_mpki.unwrap() - 1.0).abs() < 1e-9);
        assert!((correlations[1].normalized_vs_mpki.unwrap() - 1.0).abs() < 1e-9);
    }
}
