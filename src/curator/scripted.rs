//! Scripted curator for deterministic tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::curator::{fallback_decision, CurationDecision, CurationTurn, Curator};
use crate::error::EngramResult;

/// Returns queued decisions in order; falls back to the conservative decision
/// when the queue runs dry.
pub struct ScriptedCurator {
    decisions: Mutex<VecDeque<CurationDecision>>,
}

impl ScriptedCurator {
    pub fn new(decisions: Vec<CurationDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
        }
    }

    /// A curator that replays the same decision for every turn.
    pub fn repeating(decision: CurationDecision) -> RepeatingCurator {
        RepeatingCurator { decision }
    }
}

#[async_trait]
impl Curator for ScriptedCurator {
    async fn analyze(&self, turn: &CurationTurn) -> EngramResult<CurationDecision> {
        let mut queue = self
            .decisions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(queue.pop_front().unwrap_or_else(|| fallback_decision(turn)))
    }
}

pub struct RepeatingCurator {
    decision: CurationDecision,
}

#[async_trait]
impl Curator for RepeatingCurator {
    async fn analyze(&self, _turn: &CurationTurn) -> EngramResult<CurationDecision> {
        Ok(self.decision.clone())
    }
}
