//! Cancellation and wall-clock limits
//!
//! A run accepts a [`CancellationToken`] checked at pass boundaries and
//! before each solver invocation. Wall-time is policed by [`RunClock`]: the
//! global ceiling aborts with `Timeout`, per-stage soft limits only flag.

use crate::proposal::{Severity, Warning, WarningCode};
use crate::{TamError, TamResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloneable cancellation handle. `cancel()` from any thread; the engine
/// observes it at its next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint helper: `Err(Cancelled)` once tripped.
    pub fn check(&self) -> TamResult<()> {
        if self.is_cancelled() {
            Err(TamError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The pipeline stages with individual soft limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Loading,
    Scoring,
    Solving,
    Saving,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Loading => "loading",
            Stage::Scoring => "scoring",
            Stage::Solving => "solving",
            Stage::Saving => "saving",
        }
    }
}

/// Wall-clock budgets for a run, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Global ceiling; exceeding it is fatal.
    pub overall_secs: u64,
    /// Soft limits; exceeding one emits a warning only.
    pub loading_secs: u64,
    pub scoring_secs: u64,
    pub solving_secs: u64,
    pub saving_secs: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        RunLimits {
            overall_secs: 30 * 60,
            loading_secs: 2 * 60,
            scoring_secs: 5 * 60,
            solving_secs: 20 * 60,
            saving_secs: 3 * 60,
        }
    }
}

impl RunLimits {
    fn stage_limit(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Loading => self.loading_secs,
            Stage::Scoring => self.scoring_secs,
            Stage::Solving => self.solving_secs,
            Stage::Saving => self.saving_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Tracks elapsed wall time against [`RunLimits`]. One per run.
#[derive(Debug)]
pub struct RunClock {
    started: Instant,
    stage_started: Instant,
    stage: Option<Stage>,
    limits: RunLimits,
    overrun_flagged: bool,
}

impl RunClock {
    pub fn new(limits: RunLimits) -> Self {
        let now = Instant::now();
        RunClock {
            started: now,
            stage_started: now,
            stage: None,
            limits,
            overrun_flagged: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Enter a stage, resetting the stage timer.
    pub fn enter(&mut self, stage: Stage) {
        self.stage = Some(stage);
        self.stage_started = Instant::now();
        self.overrun_flagged = false;
    }

    /// Check the global ceiling (fatal) and the current stage's soft limit
    /// (warning, at most once per stage).
    pub fn checkpoint(&mut self, warnings: &mut Vec<Warning>) -> TamResult<()> {
        let elapsed = self.started.elapsed();
        if elapsed.as_secs() > self.limits.overall_secs {
            return Err(TamError::Timeout {
                elapsed_secs: elapsed.as_secs_f64(),
            });
        }
        if let Some(stage) = self.stage {
            if !self.overrun_flagged && self.stage_started.elapsed() > self.limits.stage_limit(stage)
            {
                self.overrun_flagged = true;
                warnings.push(Warning::new(
                    WarningCode::StageOverrun,
                    Severity::Low,
                    format!(
                        "stage '{}' exceeded its soft time limit",
                        stage.as_str()
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl Default for RunClock {
    fn default() -> Self {
        RunClock::new(RunLimits::default())
    }
}
