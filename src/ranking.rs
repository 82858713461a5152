//! Rank submissions of one size class by their misprediction rates
use crate::{MPRED1K, MPRED1KB, MPRED1KCB, N_INSTR, N_MPRED, ResultRow, ResultTable, per_thousand};
use serde::Serialize;
use std::collections::BTreeMap;

/// Submission scores, best (lowest) first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ranking {
    pub entries: Vec<(String, f64)>,
}

impl Ranking {
    fn from_scores(mut entries: Vec<(String, f64)>) -> Self {
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    pub fn best(&self) -> Option<&(String, f64)> {
        self.entries.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeRanking {
    pub size: String,
    /// mean over traces of mispredictions per 1K instructions
    pub per_instruction: Ranking,
    /// mean over traces of mispredictions per 1K branches
    pub per_branch: Ranking,
    /// mean over traces of mispredictions per 1K conditional branches
    pub per_conditional: Ranking,
    /// total mispredictions per 1K total instructions across all traces
    pub weighted_per_instruction: Ranking,
}

/// Column order for size classes: unlimited last, then shorter names first
pub fn size_order_key(size: &str) -> (bool, usize, String) {
    (size == "Unl", size.len(), size.to_string())
}

fn mean_of(rows: &[&ResultRow], column: &str) -> Option<f64> {
    let values: Vec<f64> = rows.iter().filter_map(|row| row.f64(column)).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn weighted_rate(rows: &[&ResultRow]) -> Option<f64> {
    let mut mispredictions = 0.0;
    let mut instructions = 0.0;
    let mut seen = false;
    for row in rows {
        if let (Some(m), Some(i)) = (row.f64(N_MPRED), row.f64(N_INSTR)) {
            mispredictions += m;
            instructions += i;
            seen = true;
        }
    }
    seen.then(|| per_thousand(mispredictions, instructions))
}

/// Rank every submission that has rows of class `size`.
///
/// The three per-1K rankings are plain means of per-trace rates; the weighted
/// one divides summed mispredictions by summed instructions. Rows without a
/// value do not take part in the affected mean.
pub fn rank_size(table: &ResultTable, size: &str) -> SizeRanking {
    let mut by_name: BTreeMap<&str, Vec<&ResultRow>> = BTreeMap::new();
    for row in table.rows().iter().filter(|row| row.key.size == size) {
        by_name.entry(row.key.name.as_str()).or_default().push(row);
    }

    let mut all = vec![];
    let mut br = vec![];
    let mut cb = vec![];
    let mut allw = vec![];
    for (name, rows) in &by_name {
        for (scores, score) in [
            (&mut all, mean_of(rows, MPRED1K)),
            (&mut br, mean_of(rows, MPRED1KB)),
            (&mut cb, mean_of(rows, MPRED1KCB)),
            (&mut allw, weighted_rate(rows)),
        ] {
            if let Some(score) = score {
                scores.push((name.to_string(), score));
            }
        }
    }

    SizeRanking {
        size: size.to_string(),
        per_instruction: Ranking::from_scores(all),
        per_branch: Ranking::from_scores(br),
        per_conditional: Ranking::from_scores(cb),
        weighted_per_instruction: Ranking::from_scores(allw),
    }
}

/// [`rank_size`] for every size class, ordered by [`size_order_key`]
pub fn rank_all_sizes(table: &ResultTable) -> Vec<SizeRanking> {
    let mut sizes = table.sizes();
    sizes.sort_by_key(|size| size_order_key(size));
    sizes.iter().map(|size| rank_size(table, size)).collect()
}
