//! # tam-engine: Waterfall Territory Assignment
//!
//! The batch assignment pipeline: given a snapshot of parent accounts and a
//! rep roster, propose an owner for every assignable account such that every
//! hard constraint holds, soft objectives (geographic alignment, ownership
//! continuity, balanced workload) are maximized, and every decision carries
//! an auditable rule tag and rationale.
//!
//! ## Pipeline
//!
//! | Stage | Module | Responsibility |
//! |-------|--------|----------------|
//! | C1 | [`thresholds`] | Calibrate per-rep target/min/max bands from the pool |
//! | C2 | [`ledger`] | Track per-rep load; O(1) capacity queries |
//! | C3 | [`geography`] | Territory→region resolution and rep eligibility |
//! | C4 | [`passes`] + [`model`] | The P1..P5 waterfall with per-pass batch optimization |
//! | C5 | [`hierarchy`] + [`postcheck`] | Cascade to children/opportunities, invariant-strain warnings |
//!
//! [`generate_assignments`] wires the stages together and owns the ordering
//! contract: proposals materialize holdover → alignment → P1 → P2 → P3 →
//! P4 → forced → strategic, deterministically within each block, so two runs
//! on identical inputs are byte-identical.
//!
//! ## Optimization
//!
//! The P2/P3/P4 passes solve a small assignment MIP per pass (relaxed to an
//! LP and repaired deterministically; see [`model`]). Greedy-by-ARR is kept
//! as the in-pass fallback whenever the solver fails, so a run always
//! completes.
//!
//! ## Concurrency
//!
//! The engine is single-threaded and compute-bound by design: one ledger per
//! run, owned by the pass driver, no shared state. The only process-wide
//! resource is the solver slot ([`model`] serializes solves through a
//! single-slot lock).

pub mod engine;
pub mod geography;
pub mod hierarchy;
pub mod ledger;
pub mod model;
pub mod passes;
pub mod postcheck;
pub mod thresholds;

pub use engine::{calibration_pool, generate_assignments, AssignmentInput, AssignmentOutput};
pub use hierarchy::{CascadePlan, ChildCascade, HierarchyIndex, OpportunityCascade};
pub use ledger::{CapacityBands, Workload, WorkloadLedger};
pub use model::{AssignmentProblem, CandidateAccount, ModelError, RepSlot};
pub use passes::{AccountState, Waterfall, WaterfallOutcome};
pub use postcheck::{GeoStat, RepStat, Statistics};
pub use thresholds::{calibrate, Band, CalibratedThresholds, PoolTotals};
