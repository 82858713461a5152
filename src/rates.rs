use crate::{ResultTable, Result, Value};
use log::{info, warn};

// data headers
pub const N_INSTR: &str = "NUM_INSTRUCTIONS";
pub const N_MPRED: &str = "NUM_MISPREDICTIONS";
pub const N_BRNCH: &str = "NUM_BR";
pub const N_CONDB: &str = "NUM_CONDITIONAL_BR";
// metric headers
pub const MPRED1K: &str = "MISPRED_PER_1K_INST";
pub const MPRED1KB: &str = "MISPRED_PER_1K_BRAN";
pub const MPRED1KCB: &str = "MISPRED_PER_1K_COND";
/// The value reported by the simulator, kept before recomputation
pub const MPRED1K_IMPRECISE: &str = "MISPRED_PER_1K_INST_IMPRECISE";

/// Mispredictions per thousand of `denominator`
pub fn per_thousand(mispredictions: f64, denominator: f64) -> f64 {
    mispredictions / (denominator / 1000.0)
}

/// Recompute the per-1K rates from raw counts.
///
/// The reported per-instruction rate was computed by the simulator against a
/// slightly different instruction count; it is kept as
/// [`MPRED1K_IMPRECISE`] and the recomputed value replaces it. Rows missing
/// one of the counts get no value in the affected rate column.
pub fn recompute_rates(table: &mut ResultTable) -> Result<()> {
    table.add_column(MPRED1K_IMPRECISE, table.column(MPRED1K))?;

    for (column, denominator) in [(MPRED1K, N_INSTR), (MPRED1KB, N_BRNCH), (MPRED1KCB, N_CONDB)] {
        let mut missing = 0;
        let values: Vec<Option<Value>> = table
            .rows()
            .iter()
            .map(
                |row| match (row.f64(N_MPRED), row.f64(denominator)) {
                    (Some(mispredictions), Some(denominator)) => {
                        Some(Value::Float(per_thousand(mispredictions, denominator)))
                    }
                    _ => {
                        missing += 1;
                        None
                    }
                },
            )
            .collect();
        if missing > 0 {
            warn!(
                "{} of {} rows lack {} or {}, leaving {} empty there",
                missing,
                table.len(),
                N_MPRED,
                denominator,
                column
            );
        }
        table.write_column(column, values);
    }

    info!("Recomputed {}, {} and {}", MPRED1K, MPRED1KB, MPRED1KCB);
    Ok(())
}
