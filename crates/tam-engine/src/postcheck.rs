//! Post-run validation, confidence grading and statistics
//!
//! Runs after cascade. Nothing here fails the run: invariant strain is
//! reported as warnings for the reviewer (a rep over the CRE cap, tier
//! concentration, an account that somehow emerged unassigned).

use crate::ledger::WorkloadLedger;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tam_core::{
    Account, AccountId, Cohort, Configuration, Confidence, PriorityRule, Proposal, SalesRep,
    Severity, Warning, WarningCode,
};

/// Per-region rollup of proposed ownership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoStat {
    pub accounts: usize,
    pub arr: f64,
}

/// Per-rep rollup of the final proposed workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RepStat {
    pub account_count: u32,
    pub arr: f64,
    pub cre: u32,
    pub tier1_count: u32,
    pub tier2_count: u32,
}

/// Run-level statistics emitted with the output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub per_geo: BTreeMap<String, GeoStat>,
    pub per_rep: BTreeMap<String, RepStat>,
    pub per_tier: BTreeMap<String, usize>,
    /// Proposals that change the owner.
    pub moved: usize,
    /// Proposals that keep the current owner.
    pub retained: usize,
}

/// Grade every proposal's confidence: owner unchanged or P1/Holdover is
/// high; a moved customer relationship is low; any other move is medium.
pub fn grade_confidence(proposals: &mut [Proposal], accounts: &HashMap<&AccountId, &Account>) {
    for proposal in proposals.iter_mut() {
        let account = accounts.get(&proposal.account_id);
        let unchanged = account
            .and_then(|a| a.current_owner_id.as_ref())
            .map(|owner| owner == &proposal.proposed_owner_id)
            .unwrap_or(false);
        proposal.confidence = if unchanged
            || matches!(
                proposal.rule_applied,
                PriorityRule::ContinuityGeo | PriorityRule::Holdover
            ) {
            Confidence::High
        } else if account.map(|a| a.is_customer).unwrap_or(false) {
            Confidence::Low
        } else {
            Confidence::Medium
        };
    }
}

/// Post-check: emit warnings for capacity strain left after all passes.
pub fn post_check(
    ledger: &WorkloadLedger,
    reps: &[SalesRep],
    config: &Configuration,
    unassigned: &[AccountId],
    warnings: &mut Vec<Warning>,
) {
    for rep in reps {
        let load = ledger.load(&rep.rep_id);
        if load.cre >= config.max_cre_per_rep {
            warnings.push(
                Warning::new(
                    WarningCode::CreRisk,
                    Severity::Medium,
                    format!(
                        "{} carries {} CRE-flagged accounts (cap {})",
                        rep.name, load.cre, config.max_cre_per_rep
                    ),
                )
                .for_rep(rep.rep_id.clone()),
            );
        }
        if load.tier1_count > config.max_tier1_per_rep {
            warnings.push(
                Warning::new(
                    WarningCode::TierConcentration,
                    Severity::High,
                    format!(
                        "{} holds {} Tier 1 accounts (cap {})",
                        rep.name, load.tier1_count, config.max_tier1_per_rep
                    ),
                )
                .for_rep(rep.rep_id.clone()),
            );
        }
        if load.tier2_count > config.max_tier2_per_rep {
            warnings.push(
                Warning::new(
                    WarningCode::TierConcentration,
                    Severity::Low,
                    format!(
                        "{} holds {} Tier 2 accounts (cap {})",
                        rep.name, load.tier2_count, config.max_tier2_per_rep
                    ),
                )
                .for_rep(rep.rep_id.clone()),
            );
        }
    }
    for account_id in unassigned {
        warnings.push(
            Warning::new(
                WarningCode::Unassigned,
                Severity::High,
                format!("account {account_id} emerged from the run unassigned"),
            )
            .for_account(account_id.clone()),
        );
    }
}

/// Roll up statistics from the final proposal set.
pub fn compute_statistics(
    proposals: &[Proposal],
    accounts: &HashMap<&AccountId, &Account>,
    reps: &[SalesRep],
    cohort: Cohort,
) -> Statistics {
    let rep_by_id: HashMap<&tam_core::RepId, &SalesRep> =
        reps.iter().map(|r| (&r.rep_id, r)).collect();
    let mut stats = Statistics::default();

    for proposal in proposals {
        let account = accounts.get(&proposal.account_id);
        let arr = account.map(|a| a.effective_arr()).unwrap_or(0.0);

        let region = rep_by_id
            .get(&proposal.proposed_owner_id)
            .and_then(|r| r.region.as_ref())
            .map(|r| r.canonical().to_string())
            .unwrap_or_else(|| "unmapped".to_string());
        let geo = stats.per_geo.entry(region).or_default();
        geo.accounts += 1;
        geo.arr += arr;

        let rep_stat = stats
            .per_rep
            .entry(proposal.proposed_owner_id.as_str().to_string())
            .or_default();
        rep_stat.account_count += 1;
        rep_stat.arr += arr;
        if let Some(account) = account {
            rep_stat.cre += account.cre_count;
            match account.tier(cohort) {
                Some(tam_core::Tier::Tier1) => rep_stat.tier1_count += 1,
                Some(tam_core::Tier::Tier2) => rep_stat.tier2_count += 1,
                _ => {}
            }
            let tier_key = account
                .tier(cohort)
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| "untiered".to_string());
            *stats.per_tier.entry(tier_key).or_default() += 1;
        }

        let unchanged = account
            .and_then(|a| a.current_owner_id.as_ref())
            .map(|owner| owner == &proposal.proposed_owner_id)
            .unwrap_or(false);
        if unchanged {
            stats.retained += 1;
        } else {
            stats.moved += 1;
        }
    }

    stats
}
