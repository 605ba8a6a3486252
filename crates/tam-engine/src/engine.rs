//! The assignment engine entry point
//!
//! [`generate_assignments`] is a pure batch function over an immutable input
//! snapshot: calibrate thresholds, seed the ledger, run the waterfall,
//! cascade the hierarchy, post-check, and emit proposals plus warnings in
//! the contractual order. All state lives for exactly one invocation.

use crate::hierarchy::{self, CascadePlan, HierarchyIndex};
use crate::ledger::WorkloadLedger;
use crate::passes::Waterfall;
use crate::postcheck::{self, Statistics};
use crate::thresholds::{self, CalibratedThresholds};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tam_core::{
    Account, AccountId, BuildId, CancellationToken, Cohort, Configuration, Opportunity, Proposal,
    RepId, RunClock, SalesRep, Stage, TamError, TamResult, Warning,
};
use tracing::info;

/// One run's immutable input snapshot.
#[derive(Debug, Clone)]
pub struct AssignmentInput {
    pub build_id: BuildId,
    pub cohort: Cohort,
    pub accounts: Vec<Account>,
    pub reps: Vec<SalesRep>,
    pub opportunities: Vec<Opportunity>,
    pub configuration: Configuration,
    pub cancellation: CancellationToken,
}

/// One run's complete output batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOutput {
    pub build_id: BuildId,
    pub cohort: Cohort,
    /// One proposal per assignable account, in pass order.
    pub proposals: Vec<Proposal>,
    pub warnings: Vec<Warning>,
    pub thresholds: CalibratedThresholds,
    pub statistics: Statistics,
    /// Child and opportunity inheritance, applied by the persistence layer.
    pub cascade: CascadePlan,
}

/// Generate assignment proposals for one cohort.
///
/// Deterministic and idempotent: two runs on identical inputs produce
/// byte-identical outputs, and re-running on a run's own output converges to
/// pure continuity.
pub fn generate_assignments(input: &AssignmentInput) -> TamResult<AssignmentOutput> {
    let config = &input.configuration;
    config.validate()?;
    let mut clock = RunClock::new(config.limits);
    let mut warnings: Vec<Warning> = Vec::new();

    clock.enter(Stage::Loading);
    input.cancellation.check()?;
    validate_snapshot(&input.accounts, &input.reps)?;

    if input.accounts.is_empty() {
        info!(build = %input.build_id, "empty snapshot; nothing to assign");
        return Ok(AssignmentOutput {
            build_id: input.build_id.clone(),
            cohort: input.cohort,
            proposals: Vec::new(),
            warnings,
            thresholds: CalibratedThresholds::empty(input.cohort),
            statistics: Statistics::default(),
            cascade: CascadePlan::default(),
        });
    }

    let rep_by_id: BTreeMap<RepId, &SalesRep> = input
        .reps
        .iter()
        .map(|r| (r.rep_id.clone(), r))
        .collect();

    let pool = calibration_pool(&input.accounts, &input.reps, input.cohort);

    let calibrated =
        thresholds::calibrate(&pool, &input.reps, config, input.cohort, &mut warnings)?;
    info!(
        build = %input.build_id,
        cohort = input.cohort.as_str(),
        pool = pool.len(),
        normal_reps = calibrated.normal_rep_count,
        arr_target = calibrated.arr.target,
        "thresholds calibrated"
    );

    // Prospect revenue signal: opportunity net ARR summed per account.
    let mut net_arr_by_account: HashMap<&AccountId, f64> = HashMap::new();
    for opp in &input.opportunities {
        *net_arr_by_account.entry(&opp.account_id).or_default() += opp.net_arr;
    }
    let net_arr_of: HashMap<usize, f64> = input
        .accounts
        .iter()
        .enumerate()
        .filter_map(|(i, a)| {
            net_arr_by_account
                .get(&a.account_id)
                .map(|&net| (i, net))
        })
        .collect();

    // Ledger baseline: holdover-locked accounts stay with their owner and
    // count against it from the start.
    let holdovers: Vec<(&Account, f64)> = input
        .accounts
        .iter()
        .filter(|a| a.is_parent && a.cohort() == input.cohort && a.exclude_from_reassignment)
        .filter(|a| {
            a.current_owner_id
                .as_ref()
                .and_then(|id| rep_by_id.get(id))
                .map(|r| r.is_active)
                .unwrap_or(false)
        })
        .map(|a| {
            let net = net_arr_by_account
                .get(&a.account_id)
                .copied()
                .unwrap_or(0.0);
            (a, net)
        })
        .collect();
    let ledger = WorkloadLedger::init(&input.reps, &holdovers, config, &calibrated, input.cohort);

    let index = HierarchyIndex::build(&input.accounts);
    let aligned = hierarchy::align_parents(&input.accounts, &index, &rep_by_id, &mut warnings);

    let waterfall = Waterfall::new(
        &input.accounts,
        &input.reps,
        config,
        ledger,
        aligned,
        net_arr_of,
    );
    let mut outcome = waterfall.run(&input.cancellation, &mut clock)?;
    warnings.append(&mut outcome.warnings);

    let accounts_by_id: HashMap<&AccountId, &Account> = input
        .accounts
        .iter()
        .map(|a| (&a.account_id, a))
        .collect();
    postcheck::grade_confidence(&mut outcome.proposals, &accounts_by_id);
    verify_proposals(&outcome.proposals, &accounts_by_id)?;

    input.cancellation.check()?;
    clock.checkpoint(&mut warnings)?;

    let proposed: BTreeMap<AccountId, (RepId, String)> = outcome
        .proposals
        .iter()
        .map(|p| {
            (
                p.account_id.clone(),
                (p.proposed_owner_id.clone(), p.proposed_owner_name.clone()),
            )
        })
        .collect();
    let cascade = hierarchy::cascade(&input.accounts, &index, &proposed, &input.opportunities);

    postcheck::post_check(
        &outcome.ledger,
        &input.reps,
        config,
        &outcome.unassigned,
        &mut warnings,
    );
    let statistics = postcheck::compute_statistics(
        &outcome.proposals,
        &accounts_by_id,
        &input.reps,
        input.cohort,
    );

    info!(
        build = %input.build_id,
        proposals = outcome.proposals.len(),
        cascaded_children = cascade.children.len(),
        warnings = warnings.len(),
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "assignment run complete"
    );

    Ok(AssignmentOutput {
        build_id: input.build_id.clone(),
        cohort: input.cohort,
        proposals: outcome.proposals,
        warnings,
        thresholds: calibrated,
        statistics,
        cascade,
    })
}

/// The calibration pool: cohort parents outside the strategic partition.
/// Strategic accounts never consume normal-rep capacity, so they do not
/// feed the thresholds either.
pub fn calibration_pool<'a>(
    accounts: &'a [Account],
    reps: &[SalesRep],
    cohort: Cohort,
) -> Vec<&'a Account> {
    let strategic_reps: HashSet<&RepId> = reps
        .iter()
        .filter(|r| r.is_strategic_rep)
        .map(|r| &r.rep_id)
        .collect();
    accounts
        .iter()
        .filter(|a| a.is_parent && a.cohort() == cohort)
        .filter(|a| {
            a.current_owner_id
                .as_ref()
                .map(|id| !strategic_reps.contains(id))
                .unwrap_or(true)
        })
        .collect()
}

/// Boundary validation: rep flag invariants and unique account ids.
fn validate_snapshot(accounts: &[Account], reps: &[SalesRep]) -> TamResult<()> {
    for rep in reps {
        rep.validate()?;
    }
    let mut seen = HashSet::with_capacity(accounts.len());
    for account in accounts {
        if !seen.insert(&account.account_id) {
            return Err(TamError::InvariantViolation(format!(
                "duplicate account id {} in snapshot",
                account.account_id
            )));
        }
    }
    Ok(())
}

/// Output invariants: one proposal per account, locks preserved.
fn verify_proposals(
    proposals: &[Proposal],
    accounts: &HashMap<&AccountId, &Account>,
) -> TamResult<()> {
    let mut seen = HashSet::with_capacity(proposals.len());
    for proposal in proposals {
        if !seen.insert(&proposal.account_id) {
            return Err(TamError::InvariantViolation(format!(
                "duplicate proposal for account {}",
                proposal.account_id
            )));
        }
        if let Some(account) = accounts.get(&proposal.account_id) {
            if account.exclude_from_reassignment
                && account.current_owner_id.as_ref() != Some(&proposal.proposed_owner_id)
            {
                return Err(TamError::InvariantViolation(format!(
                    "locked account {} proposed to a different owner",
                    proposal.account_id
                )));
            }
        }
    }
    Ok(())
}
