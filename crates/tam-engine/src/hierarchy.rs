//! Parent–child hierarchy: alignment and cascade
//!
//! Accounts form a DAG rooted at ultimate parents ([`ParentLink`] makes the
//! root sentinel total). Two hierarchy concerns live here:
//!
//! - **Alignment** (before the priority passes): a parent whose children sit
//!   with more than one distinct active owner gets pre-assigned to the owner
//!   of its weightiest child, locked children taking precedence.
//! - **Cascade** (after the passes): children and opportunities inherit the
//!   subtree's proposed owner, locks always preserved.

use std::collections::{BTreeMap, HashMap, HashSet};
use tam_core::{
    Account, AccountId, Opportunity, ParentLink, PriorityRule, RepId, SalesRep, Severity, Warning,
    WarningCode,
};

/// Index over the account hierarchy, built in O(N) at load time.
#[derive(Debug, Default)]
pub struct HierarchyIndex {
    by_id: HashMap<AccountId, usize>,
    children: HashMap<AccountId, Vec<usize>>,
}

impl HierarchyIndex {
    pub fn build(accounts: &[Account]) -> HierarchyIndex {
        let mut index = HierarchyIndex::default();
        for (i, account) in accounts.iter().enumerate() {
            index.by_id.insert(account.account_id.clone(), i);
        }
        for (i, account) in accounts.iter().enumerate() {
            if let ParentLink::Parent(parent) = account.parent_link() {
                index.children.entry(parent).or_default().push(i);
            }
        }
        index
    }

    pub fn get(&self, id: &AccountId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn children_of(&self, id: &AccountId) -> &[usize] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Pre-assign parents from their children's ownership.
///
/// For each unlocked parent whose children have more than one distinct
/// active current owner: candidates are the children with active owners,
/// restricted to locked children when any exist; the owner of the highest
/// effective-ARR candidate wins (account id ascending breaks ties). Multiple
/// locked children with different owners flag `will_create_split`.
pub fn align_parents(
    accounts: &[Account],
    index: &HierarchyIndex,
    reps: &BTreeMap<RepId, &SalesRep>,
    warnings: &mut Vec<Warning>,
) -> BTreeMap<AccountId, RepId> {
    let mut aligned = BTreeMap::new();

    for parent in accounts.iter().filter(|a| a.is_parent) {
        if parent.exclude_from_reassignment {
            continue;
        }
        let children = index.children_of(&parent.account_id);
        if children.is_empty() {
            continue;
        }

        let active_owner = |a: &Account| -> Option<RepId> {
            let owner = a.current_owner_id.clone()?;
            match reps.get(&owner) {
                Some(rep) if rep.is_active => Some(owner),
                _ => None,
            }
        };

        let owned: Vec<&Account> = children
            .iter()
            .map(|&i| &accounts[i])
            .filter(|c| active_owner(c).is_some())
            .collect();
        let distinct: HashSet<RepId> = owned.iter().filter_map(|c| active_owner(c)).collect();
        if distinct.len() <= 1 {
            continue;
        }

        let locked: Vec<&Account> = owned
            .iter()
            .copied()
            .filter(|c| c.exclude_from_reassignment)
            .collect();
        let mut candidates = if locked.is_empty() { owned } else { locked };

        candidates.sort_by(|a, b| {
            b.effective_arr()
                .partial_cmp(&a.effective_arr())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });

        let locked_owners: HashSet<RepId> = candidates
            .iter()
            .filter(|c| c.exclude_from_reassignment)
            .filter_map(|c| active_owner(c))
            .collect();
        if locked_owners.len() > 1 {
            warnings.push(
                Warning::new(
                    WarningCode::WillCreateSplit,
                    Severity::Medium,
                    format!(
                        "parent {} has locked children with {} different owners; \
                         alignment will split the hierarchy",
                        parent.account_id,
                        locked_owners.len()
                    ),
                )
                .for_account(parent.account_id.clone()),
            );
        }

        if let Some(winner) = candidates.first() {
            if let Some(owner) = active_owner(winner) {
                aligned.insert(parent.account_id.clone(), owner);
            }
        }
    }

    aligned
}

/// A child account inheriting its parent's proposed owner.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChildCascade {
    pub account_id: AccountId,
    pub new_owner_id: RepId,
    pub new_owner_name: String,
    /// Always [`PriorityRule::ContinuityCascade`]; kept on the record so the
    /// persisted rows carry the same rule vocabulary as proposals.
    pub rule_applied: PriorityRule,
}

/// An opportunity inheriting its subtree's proposed owner.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpportunityCascade {
    pub opportunity_id: String,
    pub account_id: AccountId,
    pub new_owner_id: RepId,
}

/// The full cascade output, applied by the persistence layer.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CascadePlan {
    pub children: Vec<ChildCascade>,
    pub opportunities: Vec<OpportunityCascade>,
}

/// Resolve the proposed owner an account inherits: its own proposal, or the
/// nearest ancestor's. Locked accounts inherit nothing.
fn inherited_owner<'a>(
    account: &Account,
    accounts: &[Account],
    index: &HierarchyIndex,
    proposed: &'a BTreeMap<AccountId, (RepId, String)>,
) -> Option<&'a (RepId, String)> {
    if account.exclude_from_reassignment {
        return None;
    }
    let mut current = account;
    let mut visited = HashSet::new();
    loop {
        if let Some(owner) = proposed.get(&current.account_id) {
            return Some(owner);
        }
        if !visited.insert(current.account_id.clone()) {
            return None; // malformed cycle; treat as unresolved
        }
        match current.parent_link() {
            ParentLink::Root => return None,
            ParentLink::Parent(parent_id) => match index.get(&parent_id) {
                Some(i) => current = &accounts[i],
                None => return None,
            },
        }
    }
}

/// Propagate parent proposals to children and opportunities.
///
/// Children with `exclude_from_reassignment` keep their owner; opportunities
/// attached to a locked account stay put. Entries only appear where the
/// inherited owner differs from the current one.
pub fn cascade(
    accounts: &[Account],
    index: &HierarchyIndex,
    proposed: &BTreeMap<AccountId, (RepId, String)>,
    opportunities: &[Opportunity],
) -> CascadePlan {
    let mut plan = CascadePlan::default();

    for account in accounts.iter().filter(|a| !a.is_parent) {
        if account.exclude_from_reassignment {
            continue;
        }
        if let Some((owner, name)) = inherited_owner(account, accounts, index, proposed) {
            if account.current_owner_id.as_ref() != Some(owner) {
                plan.children.push(ChildCascade {
                    account_id: account.account_id.clone(),
                    new_owner_id: owner.clone(),
                    new_owner_name: name.clone(),
                    rule_applied: PriorityRule::ContinuityCascade,
                });
            }
        }
    }

    for opp in opportunities {
        let Some(i) = index.get(&opp.account_id) else {
            continue;
        };
        let account = &accounts[i];
        if account.exclude_from_reassignment {
            continue;
        }
        if let Some((owner, _)) = inherited_owner(account, accounts, index, proposed) {
            plan.opportunities.push(OpportunityCascade {
                opportunity_id: opp.opportunity_id.clone(),
                account_id: opp.account_id.clone(),
                new_owner_id: owner.clone(),
            });
        }
    }

    plan
}
