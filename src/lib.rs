mod aggregate;
mod config;
mod error;
mod metrics;
mod optype;
mod path;
mod ranking;
mod rates;
mod report;
mod snapshot;
mod table;
mod utils;
mod warmup;

pub use aggregate::*;
pub use config::*;
pub use error::*;
pub use metrics::*;
pub use optype::*;
pub use path::*;
pub use ranking::*;
pub use rates::*;
pub use report::*;
pub use snapshot::*;
pub use table::*;
pub use utils::*;
pub use warmup::*;

/// Contract of a conditional branch predictor driven by a trace simulator
pub trait ConditionalBranchPredictor {
    /// Predicted direction of the conditional branch at `pc`
    fn predict(&self, pc: u64) -> bool;
    /// Called once per resolved conditional branch, in program order
    fn update(
        &mut self,
        pc: u64,
        op_type: OpType,
        resolve_direction: bool,
        predict_direction: bool,
        branch_target: u64,
    );
    /// Called for unconditional control flow, which is never predicted
    fn track_other(&mut self, pc: u64, op_type: OpType, branch_taken: bool, branch_target: u64);
}

/// Hand one resolved instruction to `predictor` the way the simulator does:
/// conditional branches are predicted then updated, unconditional control
/// flow is tracked. Returns the prediction for conditional branches.
pub fn dispatch_branch<P: ConditionalBranchPredictor + ?Sized>(
    predictor: &mut P,
    pc: u64,
    op_type: OpType,
    taken: bool,
    branch_target: u64,
) -> Option<bool> {
    match op_type {
        OpType::RetCond
        | OpType::JmpDirectCond
        | OpType::JmpIndirectCond
        | OpType::CallDirectCond
        | OpType::CallIndirectCond => {
            let prediction = predictor.predict(pc);
            predictor.update(pc, op_type, taken, prediction, branch_target);
            Some(prediction)
        }
        OpType::RetUncond
        | OpType::JmpDirectUncond
        | OpType::JmpIndirectUncond
        | OpType::CallDirectUncond
        | OpType::CallIndirectUncond => {
            predictor.track_other(pc, op_type, taken, branch_target);
            None
        }
        OpType::Op | OpType::Error => None,
    }
}
