//! Batch assignment model
//!
//! Implements the per-pass assignment optimization used by the P2/P3/P4
//! passes. Within a pass, many accounts compete for the same scarce reps;
//! greedy-by-ARR order exhausts early reps and starves later accounts, so
//! the pass solves a small MIP instead:
//!
//! - Decision variables `x[a][r] ∈ {0,1}`, one per (account, eligible rep).
//! - Maximize `Σ (balance_bonus(r) + continuity_bonus(a,r) + 10) · x[a][r]`.
//! - Each account takes at most one rep; accounts that fit nowhere stay
//!   unassigned and fall to the next pass.
//! - Each rep's added ARR stays within its remaining hard-cap headroom.
//!
//! This is a **simplified LP relaxation**: binaries are treated as
//! continuous [0,1] and repaired by the pass driver's deterministic,
//! capacity-checked commit sweep. For exact MILP use the `solver-highs`
//! feature.
//!
//! The solver is a process-wide exclusive resource (concurrent solves would
//! thrash memory); callers serialize through a single-slot lock.

use good_lp::solvers::clarabel::clarabel;
use good_lp::{constraint, variable, variables, Expression, Solution, SolverModel, Variable};
use once_cell::sync::Lazy;
use std::sync::Mutex;
use std::time::Instant;
use tam_core::{AccountId, RepId, SolverConfig};
use thiserror::Error;
use tracing::debug;

/// Flat bonus for keeping an account with its current owner.
pub const CONTINUITY_BONUS: f64 = 30.0;
/// Constant added to every pair so any feasible assignment scores positive.
pub const FEASIBILITY_BONUS: f64 = 10.0;
/// Relaxed values at or above this commit; below, the account falls through.
pub const COMMIT_THRESHOLD: f64 = 0.5;

/// Single-slot lock: one solve at a time, process-wide.
static SOLVER_SLOT: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Model solve errors. Any of these makes the pass fall back to greedy.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("solver backend failed: {0}")]
    Backend(String),
}

/// One rep available to the pass, with its load at solve time.
#[derive(Debug, Clone)]
pub struct RepSlot {
    pub rep_id: RepId,
    pub current_arr: f64,
    /// ARR headroom against the hard cap.
    pub remaining_cap: f64,
    pub target_arr: f64,
}

impl RepSlot {
    /// `max(0, 100 − 50 · current/target)`: under-loaded reps score high,
    /// reps at double target score zero.
    pub fn balance_bonus(&self) -> f64 {
        if self.target_arr <= f64::EPSILON {
            return 0.0;
        }
        (100.0 - 50.0 * self.current_arr / self.target_arr).max(0.0)
    }
}

/// One account in the pass, with the rep slots it may legally take.
#[derive(Debug, Clone)]
pub struct CandidateAccount {
    pub account_id: AccountId,
    pub arr: f64,
    /// Indices into the problem's rep slots.
    pub eligible: Vec<usize>,
    /// Slot of the current owner, when eligible here.
    pub continuity_slot: Option<usize>,
}

/// The full pass-level problem.
#[derive(Debug, Clone, Default)]
pub struct AssignmentProblem {
    pub candidates: Vec<CandidateAccount>,
    pub reps: Vec<RepSlot>,
}

impl AssignmentProblem {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() || self.reps.is_empty()
    }
}

/// Relaxed variable values, parallel to each candidate's `eligible` list.
#[derive(Debug, Clone, Default)]
pub struct RelaxedSolution {
    pub values: Vec<Vec<f64>>,
    pub objective: f64,
    pub solve_time_ms: u128,
}

impl RelaxedSolution {
    /// Best slot for a candidate: highest relaxed value at or above
    /// `floor`, ties broken by lower current ARR then rep id. The commit
    /// sweep uses [`COMMIT_THRESHOLD`] first, then a near-zero floor to
    /// repair degenerate relaxations that split mass across equal slots.
    pub fn best_slot(
        &self,
        problem: &AssignmentProblem,
        candidate: usize,
        floor: f64,
    ) -> Option<usize> {
        let cand = &problem.candidates[candidate];
        let values = &self.values[candidate];
        let mut best: Option<(usize, f64)> = None;
        for (k, &slot) in cand.eligible.iter().enumerate() {
            let v = values[k];
            if v < floor {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_slot, best_v)) => {
                    if (v - best_v).abs() > 1e-9 {
                        v > best_v
                    } else {
                        let (a, b) = (&problem.reps[slot], &problem.reps[best_slot]);
                        (a.current_arr, &a.rep_id) < (b.current_arr, &b.rep_id)
                    }
                }
            };
            if better {
                best = Some((slot, v));
            }
        }
        best.map(|(slot, _)| slot)
    }
}

/// Solve the relaxed batch assignment problem.
///
/// `config.max_time_seconds` and `config.mip_gap` express the solve budget;
/// the clarabel backend solves the relaxation well inside it for pass-sized
/// problems, and any backend failure surfaces as [`ModelError`] for the
/// caller's greedy fallback.
pub fn solve_relaxation(
    problem: &AssignmentProblem,
    config: &SolverConfig,
) -> Result<RelaxedSolution, ModelError> {
    if problem.is_empty() {
        return Ok(RelaxedSolution::default());
    }
    // Exclusive process-wide solver slot. A poisoned lock only means a
    // previous solve panicked; the slot itself is still usable.
    let _slot = SOLVER_SLOT.lock().unwrap_or_else(|e| e.into_inner());
    let start = Instant::now();

    let mut vars = variables!();
    let mut x: Vec<Vec<Variable>> = Vec::with_capacity(problem.candidates.len());
    let mut objective = Expression::from(0.0);

    for cand in &problem.candidates {
        let mut row = Vec::with_capacity(cand.eligible.len());
        for (k, &slot) in cand.eligible.iter().enumerate() {
            // Binary decision relaxed to [0, 1]
            let var = vars.add(variable().min(0.0).max(1.0));
            let mut score = problem.reps[slot].balance_bonus() + FEASIBILITY_BONUS;
            if cand.continuity_slot == Some(k) {
                score += CONTINUITY_BONUS;
            }
            objective += score * var;
            row.push(var);
        }
        x.push(row);
    }

    let mut model = vars.maximise(objective).using(clarabel);

    // Each account takes at most one rep; staying unassigned is feasible.
    for row in &x {
        if row.is_empty() {
            continue;
        }
        let mut taken = Expression::from(0.0);
        for var in row {
            taken += *var;
        }
        model = model.with(constraint!(taken <= 1.0));
    }

    // Each rep's added ARR stays within its hard-cap headroom.
    let mut added: Vec<Expression> = problem
        .reps
        .iter()
        .map(|_| Expression::from(0.0))
        .collect();
    let mut touched = vec![false; problem.reps.len()];
    for (i, cand) in problem.candidates.iter().enumerate() {
        for (k, &slot) in cand.eligible.iter().enumerate() {
            added[slot] += cand.arr * x[i][k];
            touched[slot] = true;
        }
    }
    for (slot, expr) in added.into_iter().enumerate() {
        // Prospect slots have unbounded headroom; no constraint to emit.
        if touched[slot] && problem.reps[slot].remaining_cap.is_finite() {
            model = model.with(constraint!(expr <= problem.reps[slot].remaining_cap));
        }
    }

    let solution = model
        .solve()
        .map_err(|e| ModelError::Backend(format!("{e:?}")))?;

    let values: Vec<Vec<f64>> = x
        .iter()
        .map(|row| row.iter().map(|v| solution.value(*v)).collect())
        .collect();
    let objective = values
        .iter()
        .zip(&problem.candidates)
        .map(|(row, cand)| {
            row.iter()
                .zip(&cand.eligible)
                .enumerate()
                .map(|(k, (v, &slot))| {
                    let mut score = problem.reps[slot].balance_bonus() + FEASIBILITY_BONUS;
                    if cand.continuity_slot == Some(k) {
                        score += CONTINUITY_BONUS;
                    }
                    score * v
                })
                .sum::<f64>()
        })
        .sum();

    let solved = RelaxedSolution {
        values,
        objective,
        solve_time_ms: start.elapsed().as_millis(),
    };
    debug!(
        candidates = problem.candidates.len(),
        reps = problem.reps.len(),
        objective = solved.objective,
        elapsed_ms = solved.solve_time_ms as u64,
        budget_s = config.max_time_seconds,
        "batch model solved"
    );
    Ok(solved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: &str, current: f64, cap: f64) -> RepSlot {
        RepSlot {
            rep_id: RepId::new(id),
            current_arr: current,
            remaining_cap: cap,
            target_arr: 1_000_000.0,
        }
    }

    #[test]
    fn test_balance_bonus_shape() {
        assert_eq!(slot("r", 0.0, 1.0).balance_bonus(), 100.0);
        assert_eq!(slot("r", 1_000_000.0, 1.0).balance_bonus(), 50.0);
        assert_eq!(slot("r", 2_000_000.0, 1.0).balance_bonus(), 0.0);
        assert_eq!(slot("r", 5_000_000.0, 1.0).balance_bonus(), 0.0);
    }

    #[test]
    fn test_continuity_breaks_balance_tie() {
        // Two identical reps; the account's current owner should win.
        let problem = AssignmentProblem {
            candidates: vec![CandidateAccount {
                account_id: AccountId::new("a1"),
                arr: 100_000.0,
                eligible: vec![0, 1],
                continuity_slot: Some(1),
            }],
            reps: vec![
                slot("r1", 0.0, 1_000_000.0),
                slot("r2", 0.0, 1_000_000.0),
            ],
        };
        let solved = solve_relaxation(&problem, &SolverConfig::default()).unwrap();
        assert_eq!(solved.best_slot(&problem, 0, COMMIT_THRESHOLD), Some(1));
    }

    #[test]
    fn test_capacity_constraint_limits_rep() {
        // Two accounts, one rep with headroom for only one of them.
        let problem = AssignmentProblem {
            candidates: vec![
                CandidateAccount {
                    account_id: AccountId::new("a1"),
                    arr: 600_000.0,
                    eligible: vec![0],
                    continuity_slot: None,
                },
                CandidateAccount {
                    account_id: AccountId::new("a2"),
                    arr: 600_000.0,
                    eligible: vec![0],
                    continuity_slot: None,
                },
            ],
            reps: vec![slot("r1", 0.0, 700_000.0)],
        };
        let solved = solve_relaxation(&problem, &SolverConfig::default()).unwrap();
        let total: f64 = solved.values.iter().flatten().sum();
        // The relaxation cannot place more than 700k/600k worth of x mass.
        assert!(total <= 700_000.0 / 600_000.0 + 1e-6);
    }

    #[test]
    fn test_empty_problem_short_circuits() {
        let solved =
            solve_relaxation(&AssignmentProblem::default(), &SolverConfig::default()).unwrap();
        assert!(solved.values.is_empty());
    }

    #[test]
    fn test_best_slot_respects_threshold() {
        let problem = AssignmentProblem {
            candidates: vec![CandidateAccount {
                account_id: AccountId::new("a1"),
                arr: 1.0,
                eligible: vec![0],
                continuity_slot: None,
            }],
            reps: vec![slot("r1", 0.0, 10.0)],
        };
        let solved = RelaxedSolution {
            values: vec![vec![0.2]],
            objective: 0.0,
            solve_time_ms: 0,
        };
        assert_eq!(solved.best_slot(&problem, 0, COMMIT_THRESHOLD), None);
        // the repair floor still sees the fractional pick
        assert_eq!(solved.best_slot(&problem, 0, 1e-6), Some(0));
    }
}
