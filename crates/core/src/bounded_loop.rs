//! Bounded-loop executor.
//!
//! Runs a round function until it reports completion, the step cap is hit,
//! or the wall-clock budget is spent. The deadline is checked before a round
//! starts; a round already in flight always finishes.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedLoopOptions {
    pub max_steps: u32,
    pub timeout_ms: u64,
}

impl BoundedLoopOptions {
    pub fn new(max_steps: u32, timeout_ms: u64) -> Self {
        Self {
            max_steps,
            timeout_ms,
        }
    }
}

/// What a single round reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome<T> {
    Done(T),
    Continue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopStopReason {
    Timeout,
    MaxSteps,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundedLoopOutcome<T> {
    Completed { rounds: u32, value: T },
    Exhausted { rounds: u32, reason: LoopStopReason },
}

impl<T> BoundedLoopOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, BoundedLoopOutcome::Completed { .. })
    }

    pub fn rounds(&self) -> u32 {
        match self {
            BoundedLoopOutcome::Completed { rounds, .. }
            | BoundedLoopOutcome::Exhausted { rounds, .. } => *rounds,
        }
    }
}

/// Drive `on_round` under the given bounds.
///
/// Errors from the round function abort the loop immediately and are
/// returned as-is; this is how cancellation unwinds through it.
pub async fn run_bounded_loop<T, E, F, Fut>(
    options: BoundedLoopOptions,
    mut on_round: F,
) -> Result<BoundedLoopOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<RoundOutcome<T>, E>>,
{
    let started = Instant::now();
    let budget = Duration::from_millis(options.timeout_ms);
    let mut rounds = 0u32;

    while rounds < options.max_steps {
        if started.elapsed() > budget {
            tracing::debug!(rounds, "Bounded loop timed out");
            return Ok(BoundedLoopOutcome::Exhausted {
                rounds,
                reason: LoopStopReason::Timeout,
            });
        }

        let round_index = rounds;
        rounds += 1;
        if let RoundOutcome::Done(value) = on_round(round_index).await? {
            return Ok(BoundedLoopOutcome::Completed { rounds, value });
        }
    }

    tracing::debug!(rounds, "Bounded loop hit step cap");
    Ok(BoundedLoopOutcome::Exhausted {
        rounds,
        reason: LoopStopReason::MaxSteps,
    })
}
