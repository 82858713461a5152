//! Per-PC metrics derived from confusion counts.
//!
//! Every function here looks at a single [`PcRecord`]; nothing depends on
//! other PCs or other traces. Ratios whose denominator is zero are 0.
use crate::{PcRecord, ratio};
use serde::{Deserialize, Serialize};

/// Rate metrics shared by the PC, trace and op-type levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Accuracy,
    Mpki,
    Directionality,
    TransRate,
    PrecisionTaken,
    PrecisionNotTaken,
    RecallTaken,
    RecallNotTaken,
    PctBetterThanStatic,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Accuracy,
        Metric::Mpki,
        Metric::Directionality,
        Metric::TransRate,
        Metric::PrecisionTaken,
        Metric::PrecisionNotTaken,
        Metric::RecallTaken,
        Metric::RecallNotTaken,
        Metric::PctBetterThanStatic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::Mpki => "mpki",
            Metric::Directionality => "directionality",
            Metric::TransRate => "trans_rate",
            Metric::PrecisionTaken => "precision_taken",
            Metric::PrecisionNotTaken => "precision_not_taken",
            Metric::RecallTaken => "recall_taken",
            Metric::RecallNotTaken => "recall_not_taken",
            Metric::PctBetterThanStatic => "pct_better_than_static",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateMetrics {
    pub accuracy: f64,
    pub mpki: f64,
    pub directionality: f64,
    pub trans_rate: f64,
    pub precision_taken: f64,
    pub precision_not_taken: f64,
    pub recall_taken: f64,
    pub recall_not_taken: f64,
    pub pct_better_than_static: f64,
}

impl RateMetrics {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Accuracy => self.accuracy,
            Metric::Mpki => self.mpki,
            Metric::Directionality => self.directionality,
            Metric::TransRate => self.trans_rate,
            Metric::PrecisionTaken => self.precision_taken,
            Metric::PrecisionNotTaken => self.precision_not_taken,
            Metric::RecallTaken => self.recall_taken,
            Metric::RecallNotTaken => self.recall_not_taken,
            Metric::PctBetterThanStatic => self.pct_better_than_static,
        }
    }

    /// Build a set by evaluating `f` once per metric
    pub fn from_fn<F: FnMut(Metric) -> f64>(mut f: F) -> Self {
        Self {
            accuracy: f(Metric::Accuracy),
            mpki: f(Metric::Mpki),
            directionality: f(Metric::Directionality),
            trans_rate: f(Metric::TransRate),
            precision_taken: f(Metric::PrecisionTaken),
            precision_not_taken: f(Metric::PrecisionNotTaken),
            recall_taken: f(Metric::RecallTaken),
            recall_not_taken: f(Metric::RecallNotTaken),
            pct_better_than_static: f(Metric::PctBetterThanStatic),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PcMetrics {
    pub rates: RateMetrics,
    pub dynamic_executions: u64,
}

pub fn dynamic_executions(pc: &PcRecord) -> u64 {
    pc.dynamic_executions()
}

pub fn accuracy(pc: &PcRecord) -> f64 {
    ratio(pc.tp + pc.tn, pc.dynamic_executions())
}

/// Mispredictions per 1000 executions of this PC
pub fn mpki(pc: &PcRecord) -> f64 {
    1000.0 * ratio(pc.mispredictions(), pc.dynamic_executions())
}

/// (taken precision, not taken precision)
pub fn precision(pc: &PcRecord) -> (f64, f64) {
    (ratio(pc.tp, pc.tp + pc.fp), ratio(pc.tn, pc.tn + pc.fn_))
}

/// (taken recall, not taken recall)
pub fn recall(pc: &PcRecord) -> (f64, f64) {
    (ratio(pc.tp, pc.tp + pc.fn_), ratio(pc.tn, pc.tn + pc.fp))
}

/// In [-1, 1], positive when the branch is mostly taken
pub fn directionality(pc: &PcRecord) -> f64 {
    let taken = pc.taken() as f64;
    let not_taken = pc.not_taken() as f64;
    if pc.dynamic_executions() == 0 {
        0.0
    } else {
        (taken - not_taken) / (taken + not_taken)
    }
}

pub fn trans_rate(pc: &PcRecord) -> f64 {
    ratio(pc.trans_count, pc.dynamic_executions())
}

/// Accuracy of always predicting the majority direction, taken on a tie
pub fn static_accuracy(pc: &PcRecord) -> f64 {
    if directionality(pc) >= 0.0 {
        ratio(pc.taken(), pc.dynamic_executions())
    } else {
        ratio(pc.not_taken(), pc.dynamic_executions())
    }
}

pub fn pct_better_than_static(pc: &PcRecord) -> f64 {
    accuracy(pc) - static_accuracy(pc)
}

pub fn compute_pc_metrics(pc: &PcRecord) -> PcMetrics {
    let (precision_taken, precision_not_taken) = precision(pc);
    let (recall_taken, recall_not_taken) = recall(pc);
    PcMetrics {
        rates: RateMetrics {
            accuracy: accuracy(pc),
            mpki: mpki(pc),
            directionality: directionality(pc),
            trans_rate: trans_rate(pc),
            precision_taken,
            precision_not_taken,
            recall_taken,
            recall_not_taken,
            pct_better_than_static: pct_better_than_static(pc),
        },
        dynamic_executions: dynamic_executions(pc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpType;

    fn pc(tp: u64, fp: u64, tn: u64, fn_: u64) -> PcRecord {
        PcRecord {
            pc: 0x1000,
            op_type: OpType::JmpDirectCond,
            tp,
            fp,
            tn,
            fn_,
            trans_count: 0,
        }
    }

    #[test]
    fn basic_metrics() {
        let record = PcRecord {
            trans_count: 30,
            ..pc(60, 10, 20, 10)
        };
        let m = compute_pc_metrics(&record);
        assert_eq!(m.dynamic_executions, 100);
        assert!((m.rates.accuracy - 0.8).abs() < 1e-12);
        assert!((m.rates.mpki - 200.0).abs() < 1e-9);
        assert!((m.rates.precision_taken - 60.0 / 70.0).abs() < 1e-12);
        assert!((m.rates.precision_not_taken - 20.0 / 30.0).abs() < 1e-12);
        assert!((m.rates.recall_taken - 60.0 / 70.0).abs() < 1e-12);
        assert!((m.rates.recall_not_taken - 20.0 / 30.0).abs() < 1e-12);
        // 70 taken, 30 not taken
        assert!((m.rates.directionality - 0.4).abs() < 1e-12);
        assert!((m.rates.trans_rate - 0.3).abs() < 1e-12);
        // static taken gets 70%
        assert!((m.rates.pct_better_than_static - 0.1).abs() < 1e-12);
    }

    #[test]
    fn zero_denominators_default_to_zero() {
        let m = compute_pc_metrics(&pc(0, 0, 7, 3));
        assert_eq!(m.rates.precision_taken, 0.0);
        assert_eq!(m.rates.recall_taken, 0.0);
        let m = compute_pc_metrics(&pc(4, 0, 0, 2));
        assert_eq!(m.rates.recall_not_taken, 0.0);
        assert_eq!(m.rates.precision_not_taken, 0.0);
    }

    #[test]
    fn never_executed_pc_is_all_zero() {
        let m = compute_pc_metrics(&pc(0, 0, 0, 0));
        assert_eq!(m.dynamic_executions, 0);
        assert_eq!(m.rates, RateMetrics::default());
    }

    #[test]
    fn static_direction_follows_majority() {
        // mostly not taken: 2 taken (fn), 8 not taken (tn)
        let record = pc(0, 0, 8, 2);
        assert!(directionality(&record) < 0.0);
        assert!((static_accuracy(&record) - 0.8).abs() < 1e-12);
        assert!((pct_better_than_static(&record) - 0.0).abs() < 1e-12);
        // tie goes to taken
        let record = pc(5, 0, 0, 0);
        let tie = PcRecord { tn: 5, ..record };
        assert_eq!(directionality(&tie), 0.0);
        assert!((static_accuracy(&tie) - 0.5).abs() < 1e-12);
        assert!((pct_better_than_static(&tie) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn invariants_hold_over_a_grid() {
        for tp in [0u64, 1, 17] {
            for fp in [0u64, 2, 9] {
                for tn in [0u64, 3, 40] {
                    for fn_ in [0u64, 1, 5] {
                        let record = pc(tp, fp, tn, fn_);
                        let m = compute_pc_metrics(&record);
                        assert_eq!(m.dynamic_executions, tp + fp + tn + fn_);
                        assert!((0.0..=1.0).contains(&m.rates.accuracy));
                        assert!((-1.0..=1.0).contains(&m.rates.directionality));
                        assert!((0.0..=1000.0).contains(&m.rates.mpki));
                        assert!((-1.0..=1.0).contains(&m.rates.pct_better_than_static));
                    }
                }
            }
        }
    }

    #[test]
    fn rate_metrics_accessors_agree() {
        let m = compute_pc_metrics(&pc(3, 1, 4, 1)).rates;
        let rebuilt = RateMetrics::from_fn(|metric| m.get(metric));
        assert_eq!(rebuilt, m);
        assert_eq!(Metric::ALL.len(), 9);
        assert_eq!(Metric::PctBetterThanStatic.name(), "pct_better_than_static");
    }
}
