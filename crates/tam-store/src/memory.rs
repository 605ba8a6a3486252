//! In-memory store
//!
//! Backs tests and `--dry-run`: the full sink/source contract with no I/O.

use crate::error::{StoreError, StoreResult};
use crate::{AuditEntry, ProposalSink, SnapshotSource, TierFilter};
use std::collections::HashMap;
use tam_core::{Account, BuildId, Cohort, Opportunity, Proposal, SalesRep};
use tam_engine::{ChildCascade, OpportunityCascade};

/// One build's seeded input data.
#[derive(Debug, Clone, Default)]
pub struct BuildData {
    pub accounts: Vec<Account>,
    pub reps: Vec<SalesRep>,
    pub opportunities: Vec<Opportunity>,
}

/// In-memory implementation of both store contracts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    builds: HashMap<BuildId, BuildData>,
    pub proposals: HashMap<BuildId, Vec<Proposal>>,
    pub child_cascades: HashMap<BuildId, Vec<ChildCascade>>,
    pub opportunity_cascades: HashMap<BuildId, Vec<OpportunityCascade>>,
    pub audit: HashMap<BuildId, Vec<AuditEntry>>,
    /// Fail the next N proposal inserts with a transient error (for retry
    /// tests).
    pub transient_failures: u32,
    /// Fail the next N proposal inserts with a non-transient error.
    pub hard_failures: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&mut self, build: BuildId, data: BuildData) {
        self.builds.insert(build, data);
    }

    fn build(&self, build: &BuildId) -> StoreResult<&BuildData> {
        self.builds
            .get(build)
            .ok_or_else(|| StoreError::NotFound(format!("build {build}")))
    }

    fn maybe_fail(&mut self) -> StoreResult<()> {
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(StoreError::Timeout("injected".into()));
        }
        if self.hard_failures > 0 {
            self.hard_failures -= 1;
            return Err(StoreError::Other("injected".into()));
        }
        Ok(())
    }
}

impl SnapshotSource for MemoryStore {
    fn read_accounts(
        &self,
        build: &BuildId,
        cohort: Cohort,
        tier_filter: TierFilter,
    ) -> StoreResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .build(build)?
            .accounts
            .iter()
            .filter(|a| !a.is_parent || a.cohort() == cohort)
            .filter(|a| !a.is_parent || tier_filter.matches(a.tier(cohort)))
            .cloned()
            .collect();
        // contract: stable sort by account name
        accounts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.account_id.cmp(&b.account_id)));
        Ok(accounts)
    }

    fn read_reps(&self, build: &BuildId) -> StoreResult<Vec<SalesRep>> {
        Ok(self.build(build)?.reps.clone())
    }

    fn read_opportunities(&self, build: &BuildId) -> StoreResult<Vec<Opportunity>> {
        Ok(self.build(build)?.opportunities.clone())
    }
}

impl ProposalSink for MemoryStore {
    fn clear_proposals(&mut self, build: &BuildId) -> StoreResult<()> {
        self.proposals.remove(build);
        Ok(())
    }

    fn insert_proposals(&mut self, build: &BuildId, batch: &[Proposal]) -> StoreResult<usize> {
        self.maybe_fail()?;
        self.proposals
            .entry(build.clone())
            .or_default()
            .extend_from_slice(batch);
        Ok(batch.len())
    }

    fn cascade_children(
        &mut self,
        build: &BuildId,
        assignments: &[ChildCascade],
    ) -> StoreResult<()> {
        self.child_cascades
            .entry(build.clone())
            .or_default()
            .extend_from_slice(assignments);
        Ok(())
    }

    fn cascade_opportunities(
        &mut self,
        build: &BuildId,
        assignments: &[OpportunityCascade],
    ) -> StoreResult<()> {
        self.opportunity_cascades
            .entry(build.clone())
            .or_default()
            .extend_from_slice(assignments);
        Ok(())
    }

    fn append_audit(&mut self, build: &BuildId, entries: &[AuditEntry]) -> StoreResult<()> {
        self.audit
            .entry(build.clone())
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tam_core::{AccountId, RepId, Tier};

    fn account(id: &str, name: &str, customer: bool, tier: Option<Tier>) -> Account {
        Account {
            account_id: AccountId::new(id),
            name: name.to_string(),
            is_parent: true,
            parent_id: None,
            ultimate_parent_id: None,
            is_customer: customer,
            arr: 0.0,
            calculated_arr: 0.0,
            hierarchy_bookings_arr_converted: 0.0,
            atr: 0.0,
            calculated_atr: 0.0,
            expansion_tier: tier,
            initial_sale_tier: None,
            cre_count: 0,
            renewal_date: None,
            territory: None,
            current_owner_id: Some(RepId::new("r1")),
            exclude_from_reassignment: false,
        }
    }

    #[test]
    fn test_read_accounts_filters_and_sorts() {
        let mut store = MemoryStore::new();
        let build = BuildId::new("b1");
        store.seed(
            build.clone(),
            BuildData {
                accounts: vec![
                    account("a2", "Zeta", true, Some(Tier::Tier1)),
                    account("a1", "Acme", true, Some(Tier::Tier3)),
                    account("a3", "Mid", false, None),
                ],
                ..BuildData::default()
            },
        );

        let all = store
            .read_accounts(&build, Cohort::Customer, TierFilter::All)
            .unwrap();
        // prospects filtered out of the customer read, names sorted
        let names: Vec<&str> = all.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Zeta"]);

        let enterprise = store
            .read_accounts(&build, Cohort::Customer, TierFilter::Enterprise)
            .unwrap();
        assert_eq!(enterprise.len(), 1);
        assert_eq!(enterprise[0].account_id, AccountId::new("a2"));
    }

    #[test]
    fn test_unknown_build_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read_reps(&BuildId::new("missing")),
            Err(StoreError::NotFound(_))
        ));
    }
}
