use serde::{Deserialize, Serialize};

/// Upper bound of the simulator's integer instruction-class codes.
///
/// Consumers size per-class arrays with it; it is not a class itself and
/// `OpType::try_from(OPTYPE_MAX)` fails.
pub const OPTYPE_MAX: u32 = 14;

/// Instruction classification handed to predictors and stored per PC in
/// snapshots. Discriminants follow the simulator's numbering.
#[repr(u32)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u32", into = "u32")]
pub enum OpType {
    /// not a control-flow instruction
    Op = 2,
    /// ret
    RetUncond,
    /// jmp imm
    JmpDirectUncond,
    /// jmp reg/jmp mem
    JmpIndirectUncond,
    /// call imm
    CallDirectUncond,
    /// call reg/call mem
    CallIndirectUncond,
    RetCond,
    /// jnz imm
    JmpDirectCond,
    JmpIndirectCond,
    CallDirectCond,
    CallIndirectCond,
    /// decoder could not classify the branch
    Error,
}

impl OpType {
    pub const ALL: [OpType; 12] = [
        OpType::Op,
        OpType::RetUncond,
        OpType::JmpDirectUncond,
        OpType::JmpIndirectUncond,
        OpType::CallDirectUncond,
        OpType::CallIndirectUncond,
        OpType::RetCond,
        OpType::JmpDirectCond,
        OpType::JmpIndirectCond,
        OpType::CallDirectCond,
        OpType::CallIndirectCond,
        OpType::Error,
    ];

    pub fn is_conditional(self) -> bool {
        match self {
            OpType::RetCond
            | OpType::JmpDirectCond
            | OpType::JmpIndirectCond
            | OpType::CallDirectCond
            | OpType::CallIndirectCond => true,
            OpType::Op
            | OpType::RetUncond
            | OpType::JmpDirectUncond
            | OpType::JmpIndirectUncond
            | OpType::CallDirectUncond
            | OpType::CallIndirectUncond
            | OpType::Error => false,
        }
    }

    pub fn is_indirect(self) -> bool {
        matches!(
            self,
            OpType::JmpIndirectUncond
                | OpType::CallIndirectUncond
                | OpType::JmpIndirectCond
                | OpType::CallIndirectCond
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            OpType::Op => "op",
            OpType::RetUncond => "ret",
            OpType::JmpDirectUncond => "jmp direct",
            OpType::JmpIndirectUncond => "jmp indirect",
            OpType::CallDirectUncond => "call direct",
            OpType::CallIndirectUncond => "call indirect",
            OpType::RetCond => "ret cond",
            OpType::JmpDirectCond => "jmp direct cond",
            OpType::JmpIndirectCond => "jmp indirect cond",
            OpType::CallDirectCond => "call direct cond",
            OpType::CallIndirectCond => "call indirect cond",
            OpType::Error => "error",
        }
    }
}

impl TryFrom<u32> for OpType {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, String> {
        OpType::ALL
            .iter()
            .copied()
            .find(|op| *op as u32 == value)
            .ok_or_else(|| format!("unknown opType code {value}"))
    }
}

impl From<OpType> for u32 {
    fn from(op: OpType) -> u32 {
        op as u32
    }
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_simulator_numbering() {
        assert_eq!(OpType::Op as u32, 2);
        assert_eq!(OpType::RetCond as u32, 8);
        assert_eq!(OpType::Error as u32, 13);
        assert_eq!(OpType::ALL.len() as u32, OPTYPE_MAX - 2);
        for op in OpType::ALL {
            assert_eq!(OpType::try_from(u32::from(op)), Ok(op));
        }
    }

    #[test]
    fn sentinel_and_unknown_codes_are_rejected() {
        assert!(OpType::try_from(OPTYPE_MAX).is_err());
        assert!(OpType::try_from(0).is_err());
        assert!(OpType::try_from(1).is_err());
        assert!(OpType::try_from(99).is_err());
    }

    #[test]
    fn conditional_classes() {
        let conditional: Vec<OpType> = OpType::ALL
            .iter()
            .copied()
            .filter(|op| op.is_conditional())
            .collect();
        assert_eq!(
            conditional,
            vec![
                OpType::RetCond,
                OpType::JmpDirectCond,
                OpType::JmpIndirectCond,
                OpType::CallDirectCond,
                OpType::CallIndirectCond
            ]
        );
        assert!(OpType::CallIndirectCond.is_indirect());
        assert!(!OpType::RetCond.is_indirect());
    }

    #[test]
    fn serde_uses_integer_codes() {
        assert_eq!(serde_json::to_string(&OpType::JmpDirectCond).unwrap(), "9");
        let op: OpType = serde_json::from_str("5").unwrap();
        assert_eq!(op, OpType::JmpIndirectUncond);
        assert!(serde_json::from_str::<OpType>("14").is_err());
    }
}
