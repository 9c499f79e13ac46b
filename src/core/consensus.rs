// Fork choice: should I drop my chain for a peer's?
// The rule is longest valid chain. A foreign chain that fails validation is
// rejected outright, whatever its length. So is one carrying a block below
// the minimum difficulty this node mines at. On equal length I keep my own.

use crate::core::{Block, Chain};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidChain(String),
    NotLonger { local: usize, foreign: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidChain(reason) => write!(f, "invalid chain: {reason}"),
            RejectReason::NotLonger { local, foreign } => write!(
                f,
                "foreign chain of length {foreign} is not longer than local length {local}"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    // The foreign blocks, already validated and indexed
    Adopted(Chain),
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusResolver {
    min_difficulty: u32,
}

impl ConsensusResolver {
    /// Accepts any difficulty a block declares.
    pub fn new() -> ConsensusResolver {
        ConsensusResolver::default()
    }

    /// Rejects chains with a non-genesis block declaring less than
    /// `min_difficulty`.
    pub fn with_min_difficulty(min_difficulty: u32) -> ConsensusResolver {
        ConsensusResolver { min_difficulty }
    }

    pub fn resolve(&self, local: &Chain, foreign: Vec<Block>) -> Resolution {
        if let Some(weak) = foreign
            .iter()
            .find(|b| !b.is_genesis() && b.get_difficulty() < self.min_difficulty)
        {
            return Resolution::Rejected(RejectReason::InvalidChain(format!(
                "block {} declares difficulty {}, below the minimum of {}",
                weak.get_index(),
                weak.get_difficulty(),
                self.min_difficulty
            )));
        }
        let foreign = match Chain::from_blocks(foreign) {
            Ok(chain) => chain,
            Err(e) => return Resolution::Rejected(RejectReason::InvalidChain(e.to_string())),
        };
        if self.prefers(local, &foreign) {
            Resolution::Adopted(foreign)
        } else {
            Resolution::Rejected(RejectReason::NotLonger {
                local: local.len(),
                foreign: foreign.len(),
            })
        }
    }

    /// Fork-choice between two chains that are both known to be valid.
    pub fn prefers(&self, local: &Chain, foreign: &Chain) -> bool {
        foreign.len() > local.len()
    }
}
