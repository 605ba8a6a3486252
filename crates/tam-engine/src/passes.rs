//! Priority-level batch assigner
//!
//! The waterfall: four ordered priority passes plus holdover, parent
//! alignment, forced fallback and the strategic flow. Each pass collects the
//! accounts still pending, determines per-account eligible reps, optionally
//! solves the batch model, and commits assignments against the live ledger.
//!
//! Pass semantics:
//!
//! | Pass | Candidates | Selection |
//! |------|-----------|-----------|
//! | P1   | active non-strategic owner, same region, owner has capacity | greedy by ARR desc, keep owner |
//! | P2   | territory maps to a region with capacity | batch model |
//! | P3   | active non-strategic owner with capacity, any geo | batch model, owner only |
//! | P4   | any normal-pool rep with capacity | batch model |
//! | P5   | none fit | forced: least-loaded rep, capacity exceeded |
//!
//! Strategic accounts bypass the waterfall entirely: keep the current
//! strategic rep if active, else the strategic rep with the fewest accounts.
//!
//! Once an account reaches a terminal state it is immutable for the rest of
//! the run; the transition is recorded in the proposal rationale.

use crate::geography;
use crate::ledger::WorkloadLedger;
use crate::model::{self, AssignmentProblem, CandidateAccount, RepSlot};
use std::collections::{BTreeMap, HashMap};
use tam_core::{
    Account, AccountId, CancellationToken, Configuration, PriorityRule, Proposal, Region, RepId,
    RunClock, SalesRep, Severity, Stage, TamResult, Warning, WarningCode,
};
use tracing::{info, warn};

/// Per-account lifecycle. Transitions are unidirectional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Pending,
    HoldoverLocked,
    AlignedToChild,
    P1Assigned,
    P2Assigned,
    P3Assigned,
    P4Assigned,
    ForceAssigned,
    StrategicAssigned,
    /// Not part of this cohort's assignable pool (children, other cohort).
    OutOfScope,
}

impl AccountState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AccountState::Pending)
    }
}

/// Which model pass is running; controls eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelPass {
    GeoMatch,
    ContinuityAnyGeo,
    Fallback,
}

impl ModelPass {
    fn rule(&self) -> PriorityRule {
        match self {
            ModelPass::GeoMatch => PriorityRule::GeoMatch,
            ModelPass::ContinuityAnyGeo => PriorityRule::ContinuityAnyGeo,
            ModelPass::Fallback => PriorityRule::Fallback,
        }
    }

    fn state(&self) -> AccountState {
        match self {
            ModelPass::GeoMatch => AccountState::P2Assigned,
            ModelPass::ContinuityAnyGeo => AccountState::P3Assigned,
            ModelPass::Fallback => AccountState::P4Assigned,
        }
    }
}

/// The pass driver. Owns the ledger and all mutable run state; the input
/// snapshot stays immutable throughout.
pub struct Waterfall<'a> {
    accounts: &'a [Account],
    reps: &'a [SalesRep],
    config: &'a Configuration,
    ledger: WorkloadLedger,
    rep_by_id: BTreeMap<RepId, usize>,
    /// Resolved geography per pool account index.
    region_of: HashMap<usize, Option<Region>>,
    /// Prospect revenue signal per account index.
    net_arr_of: HashMap<usize, f64>,
    /// Parent pre-assignments from child-ownership alignment.
    aligned: BTreeMap<AccountId, RepId>,
    states: Vec<AccountState>,
    /// Regular assignable pool, sorted by effective ARR desc, id asc.
    pool: Vec<usize>,
    /// Strategic pool, same ordering.
    strategic_pool: Vec<usize>,
    proposals: Vec<Proposal>,
    warnings: Vec<Warning>,
}

impl<'a> Waterfall<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accounts: &'a [Account],
        reps: &'a [SalesRep],
        config: &'a Configuration,
        ledger: WorkloadLedger,
        aligned: BTreeMap<AccountId, RepId>,
        net_arr_of: HashMap<usize, f64>,
    ) -> Waterfall<'a> {
        let cohort = ledger.cohort();
        let rep_by_id: BTreeMap<RepId, usize> = reps
            .iter()
            .enumerate()
            .map(|(i, r)| (r.rep_id.clone(), i))
            .collect();
        let roster_regions = geography::roster_regions(reps);

        let mut states = vec![AccountState::OutOfScope; accounts.len()];
        let mut pool = Vec::new();
        let mut strategic_pool = Vec::new();
        let mut region_of = HashMap::new();
        let mut warnings = Vec::new();

        for (i, account) in accounts.iter().enumerate() {
            if !account.is_parent || account.cohort() != cohort {
                continue;
            }
            states[i] = AccountState::Pending;
            let strategic_owner = account
                .current_owner_id
                .as_ref()
                .and_then(|id| rep_by_id.get(id))
                .map(|&ri| reps[ri].is_strategic_rep)
                .unwrap_or(false);
            if strategic_owner {
                strategic_pool.push(i);
            } else {
                pool.push(i);
                let region =
                    geography::resolve_region(account.territory.as_deref(), config, &roster_regions);
                if region.is_none() && account.territory.is_some() {
                    warnings.push(
                        Warning::new(
                            WarningCode::UnmappedTerritory,
                            Severity::Low,
                            format!(
                                "territory '{}' did not resolve to a region; \
                                 account skips the geography passes",
                                account.territory.as_deref().unwrap_or_default()
                            ),
                        )
                        .for_account(account.account_id.clone()),
                    );
                }
                region_of.insert(i, region);
            }
        }

        let by_arr_then_id = |a: &usize, b: &usize| {
            let (aa, ab) = (&accounts[*a], &accounts[*b]);
            ab.effective_arr()
                .partial_cmp(&aa.effective_arr())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| aa.account_id.cmp(&ab.account_id))
        };
        pool.sort_by(by_arr_then_id);
        strategic_pool.sort_by(by_arr_then_id);

        Waterfall {
            accounts,
            reps,
            config,
            ledger,
            rep_by_id,
            region_of,
            net_arr_of,
            aligned,
            states,
            pool,
            strategic_pool,
            proposals: Vec::new(),
            warnings,
        }
    }

    /// Run the full waterfall. Proposals materialize in pass order:
    /// holdover, alignment, P1..P4, forced, strategic.
    pub fn run(
        mut self,
        cancel: &CancellationToken,
        clock: &mut RunClock,
    ) -> TamResult<WaterfallOutcome> {
        clock.enter(Stage::Scoring);
        self.checkpoint(cancel, clock)?;

        self.run_holdover();
        self.run_alignment();
        self.checkpoint(cancel, clock)?;
        self.run_p1();

        clock.enter(Stage::Solving);
        for pass in [
            ModelPass::GeoMatch,
            ModelPass::ContinuityAnyGeo,
            ModelPass::Fallback,
        ] {
            self.checkpoint(cancel, clock)?;
            self.run_model_pass(pass);
        }

        clock.enter(Stage::Scoring);
        self.checkpoint(cancel, clock)?;
        self.run_forced();
        self.run_strategic();

        Ok(WaterfallOutcome {
            proposals: self.proposals,
            warnings: self.warnings,
            ledger: self.ledger,
            unassigned: self
                .pool
                .iter()
                .chain(self.strategic_pool.iter())
                .filter(|&&i| self.states[i] == AccountState::Pending)
                .map(|&i| self.accounts[i].account_id.clone())
                .collect(),
        })
    }

    fn checkpoint(&mut self, cancel: &CancellationToken, clock: &mut RunClock) -> TamResult<()> {
        cancel.check()?;
        clock.checkpoint(&mut self.warnings)
    }

    fn rep(&self, id: &RepId) -> Option<&'a SalesRep> {
        self.rep_by_id.get(id).map(|&i| &self.reps[i])
    }

    /// Current owner, if active, included and non-strategic with a region.
    fn continuity_owner(&self, account: &Account) -> Option<&'a SalesRep> {
        let owner = self.rep(account.current_owner_id.as_ref()?)?;
        if owner.is_normal_pool() {
            Some(owner)
        } else {
            None
        }
    }

    fn net_arr(&self, idx: usize) -> f64 {
        self.net_arr_of.get(&idx).copied().unwrap_or(0.0)
    }

    fn pending(&self, idx: usize) -> bool {
        self.states[idx] == AccountState::Pending
    }

    /// Commit one assignment: proposal, ledger, state. Attaches a
    /// continuity-broken warning when the account moves off an active owner.
    fn commit(
        &mut self,
        idx: usize,
        rep: &SalesRep,
        rule: PriorityRule,
        state: AccountState,
        rationale: String,
        record_load: bool,
    ) {
        let account = &self.accounts[idx];
        let mut proposal = Proposal::new(
            account.account_id.clone(),
            rep.rep_id.clone(),
            rep.name.clone(),
            rule,
            rationale,
        );

        let moved = match &account.current_owner_id {
            Some(owner) => {
                owner != &rep.rep_id && self.rep(owner).map(|r| r.is_active).unwrap_or(false)
            }
            None => false,
        };
        if moved && rule != PriorityRule::Holdover {
            proposal.warnings.push(WarningCode::ContinuityBroken);
            self.warnings.push(
                Warning::new(
                    WarningCode::ContinuityBroken,
                    Severity::Medium,
                    format!(
                        "account {} moves from {} to {}",
                        account.account_id,
                        account.current_owner_id.as_ref().map(|o| o.as_str()).unwrap_or("-"),
                        rep.rep_id
                    ),
                )
                .for_account(account.account_id.clone())
                .for_rep(rep.rep_id.clone()),
            );
        }

        if record_load {
            let net_arr = self.net_arr(idx);
            self.ledger.record(&rep.rep_id, account, net_arr);
        }
        self.proposals.push(proposal);
        self.states[idx] = state;
    }

    fn push_proposal_warning(&mut self, code: WarningCode, severity: Severity, message: String) {
        // attach to the proposal committed last
        if let Some(p) = self.proposals.last_mut() {
            p.warnings.push(code);
            let account_id = p.account_id.clone();
            let rep_id = p.proposed_owner_id.clone();
            self.warnings.push(
                Warning::new(code, severity, message)
                    .for_account(account_id)
                    .for_rep(rep_id),
            );
        }
    }

    /// P0: locked accounts with an active owner keep that owner. Their
    /// load was seeded at ledger init, so no second record here.
    fn run_holdover(&mut self) {
        let locked: Vec<usize> = self
            .pool
            .iter()
            .chain(self.strategic_pool.iter())
            .copied()
            .filter(|&i| self.accounts[i].exclude_from_reassignment)
            .collect();
        let mut held = 0usize;
        for idx in locked {
            let account = &self.accounts[idx];
            let owner = account
                .current_owner_id
                .as_ref()
                .and_then(|id| self.rep(id))
                .filter(|r| r.is_active);
            match owner {
                Some(owner) => {
                    self.commit(
                        idx,
                        owner,
                        PriorityRule::Holdover,
                        AccountState::HoldoverLocked,
                        format!("excluded from reassignment; retained by {}", owner.name),
                        false,
                    );
                    held += 1;
                }
                None => {
                    // Locked with no active owner: nothing may touch it.
                    self.states[idx] = AccountState::HoldoverLocked;
                }
            }
        }
        info!(held, "holdover pass complete");
    }

    /// Parent–child alignment pre-assignments.
    fn run_alignment(&mut self) {
        let targets: Vec<(usize, RepId)> = self
            .pool
            .iter()
            .chain(self.strategic_pool.iter())
            .copied()
            .filter(|&i| self.pending(i))
            .filter_map(|i| {
                self.aligned
                    .get(&self.accounts[i].account_id)
                    .map(|owner| (i, owner.clone()))
            })
            .collect();
        let mut aligned = 0usize;
        for (idx, owner_id) in targets {
            let Some(owner) = self.rep(&owner_id) else {
                continue;
            };
            self.commit(
                idx,
                owner,
                PriorityRule::ParentAlignment,
                AccountState::AlignedToChild,
                format!(
                    "children's ownership concentrates under {}; parent aligned",
                    owner.name
                ),
                true,
            );
            aligned += 1;
        }
        info!(aligned, "parent-child alignment complete");
    }

    /// P1: continuity + geography, greedy by ARR descending.
    fn run_p1(&mut self) {
        let candidates: Vec<usize> = self
            .pool
            .clone()
            .into_iter()
            .filter(|&i| self.pending(i))
            .collect();
        let mut assigned = 0usize;
        for idx in candidates {
            let account = &self.accounts[idx];
            let Some(owner) = self.continuity_owner(account) else {
                continue;
            };
            let Some(region) = self.region_of.get(&idx).cloned().flatten() else {
                continue;
            };
            if owner.region.as_ref() != Some(&region) {
                continue;
            }
            if !self.ledger.has_capacity(&owner.rep_id, account, false) {
                continue;
            }
            self.commit(
                idx,
                owner,
                PriorityRule::ContinuityGeo,
                AccountState::P1Assigned,
                format!("kept with {} in {}", owner.name, region),
                true,
            );
            assigned += 1;
        }
        info!(pass = "P1", assigned, "continuity+geography pass complete");
    }

    /// Eligible rep indices for one account under one model pass.
    fn eligibility(&self, pass: ModelPass, idx: usize) -> Vec<usize> {
        let account = &self.accounts[idx];
        match pass {
            ModelPass::GeoMatch => {
                let Some(region) = self.region_of.get(&idx).cloned().flatten() else {
                    return Vec::new();
                };
                self.reps
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.is_normal_pool() && r.region.as_ref() == Some(&region))
                    .filter(|(_, r)| self.ledger.has_capacity(&r.rep_id, account, false))
                    .map(|(ri, _)| ri)
                    .collect()
            }
            ModelPass::ContinuityAnyGeo => match self.continuity_owner(account) {
                Some(owner) if self.ledger.has_capacity(&owner.rep_id, account, false) => {
                    vec![self.rep_by_id[&owner.rep_id]]
                }
                _ => Vec::new(),
            },
            ModelPass::Fallback => self
                .reps
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_normal_pool())
                .filter(|(_, r)| self.ledger.has_capacity(&r.rep_id, account, false))
                .map(|(ri, _)| ri)
                .collect(),
        }
    }

    /// One batch model pass: collect candidates, solve, commit, or fall
    /// back to greedy when the solver fails.
    fn run_model_pass(&mut self, pass: ModelPass) {
        let candidates: Vec<(usize, Vec<usize>)> = self
            .pool
            .clone()
            .into_iter()
            .filter(|&i| self.pending(i))
            .map(|i| (i, self.eligibility(pass, i)))
            .filter(|(_, eligible)| !eligible.is_empty())
            .collect();
        if candidates.is_empty() {
            info!(pass = ?pass.rule(), "no candidates; pass skipped");
            return;
        }

        // Rep slots for every rep referenced by any candidate.
        let mut slot_of: BTreeMap<usize, usize> = BTreeMap::new();
        let mut slots: Vec<RepSlot> = Vec::new();
        for (_, eligible) in &candidates {
            for &ri in eligible {
                slot_of.entry(ri).or_insert_with(|| {
                    let rep = &self.reps[ri];
                    slots.push(RepSlot {
                        rep_id: rep.rep_id.clone(),
                        current_arr: self.ledger.load(&rep.rep_id).arr,
                        remaining_cap: self.ledger.remaining_hard_cap(&rep.rep_id),
                        target_arr: self.ledger.bands().arr.target,
                    });
                    slots.len() - 1
                });
            }
        }

        let problem = AssignmentProblem {
            candidates: candidates
                .iter()
                .map(|(idx, eligible)| {
                    let account = &self.accounts[*idx];
                    let continuity_slot = self.continuity_owner(account).and_then(|owner| {
                        let owner_ri = self.rep_by_id[&owner.rep_id];
                        eligible.iter().position(|&ri| ri == owner_ri)
                    });
                    CandidateAccount {
                        account_id: account.account_id.clone(),
                        arr: account.effective_arr(),
                        eligible: eligible.iter().map(|ri| slot_of[ri]).collect(),
                        continuity_slot,
                    }
                })
                .collect(),
            reps: slots,
        };

        match model::solve_relaxation(&problem, &self.config.solver) {
            Ok(relaxed) => {
                // Commit sweep: solver preference first, then ARR, then id.
                let mut order: Vec<usize> = (0..problem.candidates.len()).collect();
                let best_value = |c: usize| -> f64 {
                    relaxed.values[c]
                        .iter()
                        .cloned()
                        .fold(0.0_f64, f64::max)
                };
                order.sort_by(|&a, &b| {
                    best_value(b)
                        .partial_cmp(&best_value(a))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| {
                            problem.candidates[b]
                                .arr
                                .partial_cmp(&problem.candidates[a].arr)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .then_with(|| {
                            problem.candidates[a]
                                .account_id
                                .cmp(&problem.candidates[b].account_id)
                        })
                });

                // Two sweeps: solver-confident picks first, then a repair
                // sweep that places leftover fractional mass while live
                // capacity allows (degenerate relaxations split equal slots).
                let mut assigned = 0usize;
                for floor in [model::COMMIT_THRESHOLD, 1e-6] {
                    for &c in &order {
                        let idx = candidates[c].0;
                        if !self.pending(idx) {
                            continue;
                        }
                        let Some(slot) = relaxed.best_slot(&problem, c, floor) else {
                            continue;
                        };
                        let rep_id = problem.reps[slot].rep_id.clone();
                        let account = &self.accounts[idx];
                        if !self.ledger.has_capacity(&rep_id, account, false) {
                            continue;
                        }
                        let rep = self.rep(&rep_id).expect("slot reps come from the roster");
                        self.commit_model_pick(pass, idx, rep);
                        assigned += 1;
                    }
                }
                info!(pass = ?pass.rule(), assigned, "model pass complete");
            }
            Err(err) => {
                warn!(pass = ?pass.rule(), error = %err, "solver failed; greedy fallback");
                self.warnings.push(Warning::new(
                    WarningCode::SolverFallback,
                    Severity::Low,
                    format!("{} pass fell back to greedy selection: {err}", pass.rule()),
                ));
                let mut assigned = 0usize;
                for (idx, eligible) in candidates {
                    if !self.pending(idx) {
                        continue;
                    }
                    let account = &self.accounts[idx];
                    let mut reps: Vec<&RepId> = eligible
                        .iter()
                        .map(|&ri| &self.reps[ri].rep_id)
                        .collect();
                    reps.sort_by(|a, b| self.ledger.cmp_for_selection(a, b));
                    let pick = reps
                        .into_iter()
                        .find(|r| self.ledger.has_capacity(r, account, false))
                        .cloned();
                    if let Some(rep_id) = pick {
                        let rep = self.rep(&rep_id).expect("eligible reps come from the roster");
                        self.commit_model_pick(pass, idx, rep);
                        assigned += 1;
                    }
                }
                info!(pass = ?pass.rule(), assigned, "greedy fallback complete");
            }
        }
    }

    fn commit_model_pick(&mut self, pass: ModelPass, idx: usize, rep: &SalesRep) {
        let account = &self.accounts[idx];
        let region = self.region_of.get(&idx).cloned().flatten();
        let rationale = match pass {
            ModelPass::GeoMatch => format!(
                "territory '{}' maps to {}; balanced to {}",
                account.territory.as_deref().unwrap_or("-"),
                region.as_ref().map(|r| r.canonical()).unwrap_or("-"),
                rep.name
            ),
            ModelPass::ContinuityAnyGeo => {
                format!("continuity with {} outside home geography", rep.name)
            }
            ModelPass::Fallback => format!("no regional fit; {} has capacity", rep.name),
        };
        let cross_region = pass == ModelPass::ContinuityAnyGeo
            && match (&region, &rep.region) {
                (Some(account_region), Some(rep_region)) => account_region != rep_region,
                _ => false,
            };
        self.commit(idx, rep, pass.rule(), pass.state(), rationale, true);
        if cross_region {
            let region_name = region.map(|r| r.canonical().to_string()).unwrap_or_default();
            let rep_region = rep
                .region
                .as_ref()
                .map(|r| r.canonical().to_string())
                .unwrap_or_default();
            self.push_proposal_warning(
                WarningCode::CrossRegion,
                Severity::Low,
                format!(
                    "account region {region_name} differs from rep region {rep_region}"
                ),
            );
        }
    }

    /// P5: forced assignment. Least-loaded normal-pool rep regardless of
    /// capacity; guarantees 100% coverage of the regular pool.
    fn run_forced(&mut self) {
        let remaining: Vec<usize> = self
            .pool
            .clone()
            .into_iter()
            .filter(|&i| self.pending(i))
            .collect();
        let mut forced = 0usize;
        for idx in remaining {
            let account = &self.accounts[idx];
            let mut reps: Vec<&RepId> = self
                .reps
                .iter()
                .filter(|r| r.is_normal_pool())
                .map(|r| &r.rep_id)
                .collect();
            reps.sort_by(|a, b| self.ledger.cmp_for_selection(a, b));
            let Some(rep_id) = reps.first().cloned().cloned() else {
                continue;
            };
            let rep = self.rep(&rep_id).expect("normal pool is part of the roster");
            let arr = account.effective_arr();
            self.commit(
                idx,
                rep,
                PriorityRule::ForcedFallback,
                AccountState::ForceAssigned,
                format!(
                    "every rep at capacity; forced onto least-loaded {}",
                    rep.name
                ),
                true,
            );
            self.push_proposal_warning(
                WarningCode::CapacityExceeded,
                Severity::Medium,
                format!(
                    "forced assignment of {arr:.0} ARR onto {} past its capacity band",
                    rep_id
                ),
            );
            forced += 1;
        }
        if forced > 0 {
            warn!(forced, "forced assignments issued");
        }
    }

    /// Strategic flow: keep the current strategic rep, else distribute to
    /// the strategic rep with the fewest accounts.
    fn run_strategic(&mut self) {
        let candidates: Vec<usize> = self
            .strategic_pool
            .clone()
            .into_iter()
            .filter(|&i| self.pending(i))
            .collect();
        let mut assigned = 0usize;
        for idx in candidates {
            let account = &self.accounts[idx];
            let keep = account
                .current_owner_id
                .as_ref()
                .and_then(|id| self.rep(id))
                .filter(|r| r.is_strategic_rep && r.is_active);
            let pick = match keep {
                Some(owner) => Some((owner, format!("strategic account retained by {}", owner.name))),
                None => {
                    let mut strategic: Vec<&SalesRep> = self
                        .reps
                        .iter()
                        .filter(|r| r.is_strategic_rep && r.is_assignable())
                        .collect();
                    strategic.sort_by(|a, b| {
                        let (ca, cb) = (
                            self.ledger.load(&a.rep_id).account_count,
                            self.ledger.load(&b.rep_id).account_count,
                        );
                        ca.cmp(&cb).then_with(|| a.rep_id.cmp(&b.rep_id))
                    });
                    strategic.first().map(|r| {
                        (
                            *r,
                            format!("distributed to strategic rep {} with fewest accounts", r.name),
                        )
                    })
                }
            };
            match pick {
                Some((rep, rationale)) => {
                    self.commit(
                        idx,
                        rep,
                        PriorityRule::Strategic,
                        AccountState::StrategicAssigned,
                        rationale,
                        true,
                    );
                    assigned += 1;
                }
                None => {
                    // No strategic rep left in the roster; surfaced by the
                    // post-check as unassigned.
                    warn!(
                        account = %account.account_id,
                        "strategic account has no strategic rep available"
                    );
                }
            }
        }
        info!(assigned, "strategic flow complete");
    }
}

/// Everything the waterfall produced, handed back to the engine.
pub struct WaterfallOutcome {
    pub proposals: Vec<Proposal>,
    pub warnings: Vec<Warning>,
    pub ledger: WorkloadLedger,
    pub unassigned: Vec<AccountId>,
}
