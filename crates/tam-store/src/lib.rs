//! # tam-store: Persistence Boundary Contracts
//!
//! The engine is pure; this crate owns the boundary where snapshots are read
//! and proposals are written back. It ships the **contracts** (traits), the
//! transactional write driver (batching, retry with exponential backoff, the
//! 10% failure rule), the JSON snapshot codec, and an in-memory store for
//! tests and dry runs. A backing database service lives elsewhere.
//!
//! ## Write contract
//!
//! [`persist_output`] clears prior proposals for the build, then bulk-inserts
//! in batches of at most 500 rows, retrying transient failures
//! (`timeout`, `connection`, `statement_canceled`, `too_many_requests`) with
//! exponential backoff. If more than 10% of rows ultimately fail, the write
//! fails as a whole with [`tam_core::TamError::WriteFailed`].

pub mod error;
pub mod memory;
pub mod retry;
pub mod snapshot;

pub use error::{StoreError, StoreResult};
pub use memory::{BuildData, MemoryStore};
pub use retry::{run_with_retry, RetryPolicy};
pub use snapshot::{AssignmentSnapshot, ParsedSnapshot, RawAccount, RawRep};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tam_core::config::MAX_WRITE_BATCH;
use tam_core::{
    Account, AccountId, BuildId, Cohort, Opportunity, PriorityRule, Proposal, SalesRep, TamError,
    TamResult, Tier,
};
use tam_engine::{AssignmentOutput, ChildCascade, OpportunityCascade};
use tracing::{error, info};

/// Tier filter applied when reading the account pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TierFilter {
    #[default]
    All,
    /// Tier 3 and Tier 4 (and untiered) accounts.
    Commercial,
    /// Tier 1 and Tier 2 accounts.
    Enterprise,
}

impl TierFilter {
    pub fn matches(&self, tier: Option<Tier>) -> bool {
        match self {
            TierFilter::All => true,
            TierFilter::Enterprise => matches!(tier, Some(Tier::Tier1) | Some(Tier::Tier2)),
            TierFilter::Commercial => {
                matches!(tier, Some(Tier::Tier3) | Some(Tier::Tier4) | None)
            }
        }
    }
}

impl std::str::FromStr for TierFilter {
    type Err = TamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TierFilter::All),
            "commercial" => Ok(TierFilter::Commercial),
            "enterprise" => Ok(TierFilter::Enterprise),
            other => Err(TamError::Parse(format!("unknown tier filter '{other}'"))),
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub account_id: AccountId,
    pub rule: PriorityRule,
    pub detail: String,
}

impl AuditEntry {
    /// Audit trail for a batch of proposals, stamped now.
    pub fn from_proposals(proposals: &[Proposal]) -> Vec<AuditEntry> {
        let at = Utc::now();
        proposals
            .iter()
            .map(|p| AuditEntry {
                at,
                account_id: p.account_id.clone(),
                rule: p.rule_applied,
                detail: format!(
                    "{} -> {} ({})",
                    p.account_id, p.proposed_owner_id, p.rationale
                ),
            })
            .collect()
    }
}

/// Read side of the persistence boundary.
pub trait SnapshotSource {
    /// Read the cohort's account pool, stable-sorted by account name.
    fn read_accounts(
        &self,
        build: &BuildId,
        cohort: Cohort,
        tier_filter: TierFilter,
    ) -> StoreResult<Vec<Account>>;

    fn read_reps(&self, build: &BuildId) -> StoreResult<Vec<SalesRep>>;

    fn read_opportunities(&self, build: &BuildId) -> StoreResult<Vec<Opportunity>>;
}

/// Write side of the persistence boundary. All operations are transactional
/// per call at the backing service.
pub trait ProposalSink {
    /// Clear prior proposals for the build (runs before any insert).
    fn clear_proposals(&mut self, build: &BuildId) -> StoreResult<()>;

    /// Bulk-insert one batch (at most [`MAX_WRITE_BATCH`] rows); returns the
    /// number of rows written.
    fn insert_proposals(&mut self, build: &BuildId, batch: &[Proposal]) -> StoreResult<usize>;

    fn cascade_children(&mut self, build: &BuildId, assignments: &[ChildCascade])
        -> StoreResult<()>;

    fn cascade_opportunities(
        &mut self,
        build: &BuildId,
        assignments: &[OpportunityCascade],
    ) -> StoreResult<()>;

    fn append_audit(&mut self, build: &BuildId, entries: &[AuditEntry]) -> StoreResult<()>;
}

/// Write one run's proposals: clear, then batched inserts with retry.
///
/// Fails with `WriteFailed` when more than 10% of rows could not be
/// persisted after retries.
pub fn write_proposals(
    sink: &mut dyn ProposalSink,
    policy: &RetryPolicy,
    build: &BuildId,
    proposals: &[Proposal],
    batch_size: usize,
) -> TamResult<()> {
    let batch_size = batch_size.clamp(1, MAX_WRITE_BATCH);
    run_with_retry(policy, "clear_proposals", || sink.clear_proposals(build))
        .map_err(|e| TamError::Other(format!("clearing prior proposals: {e}")))?;

    let total = proposals.len();
    let mut failed = 0usize;
    for chunk in proposals.chunks(batch_size) {
        match run_with_retry(policy, "insert_proposals", || {
            sink.insert_proposals(build, chunk)
        }) {
            Ok(written) => {
                failed += chunk.len().saturating_sub(written);
            }
            Err(err) => {
                error!(build = %build, rows = chunk.len(), error = %err, "proposal batch failed");
                failed += chunk.len();
            }
        }
    }

    if total > 0 && failed * 10 > total {
        return Err(TamError::WriteFailed { failed, total });
    }
    info!(build = %build, rows = total, failed, "proposals persisted");
    Ok(())
}

/// Persist one run's full output: proposals, hierarchy cascades, audit
/// trail. The engine's output is already ordered; this only moves it across
/// the boundary.
pub fn persist_output(
    sink: &mut dyn ProposalSink,
    policy: &RetryPolicy,
    output: &AssignmentOutput,
    batch_size: usize,
) -> TamResult<()> {
    let build = &output.build_id;
    write_proposals(sink, policy, build, &output.proposals, batch_size)?;

    run_with_retry(policy, "cascade_children", || {
        sink.cascade_children(build, &output.cascade.children)
    })
    .map_err(|e| TamError::Other(format!("cascading children: {e}")))?;
    run_with_retry(policy, "cascade_opportunities", || {
        sink.cascade_opportunities(build, &output.cascade.opportunities)
    })
    .map_err(|e| TamError::Other(format!("cascading opportunities: {e}")))?;

    let audit = AuditEntry::from_proposals(&output.proposals);
    run_with_retry(policy, "append_audit", || sink.append_audit(build, &audit))
        .map_err(|e| TamError::Other(format!("appending audit: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tam_core::{Confidence, RepId};

    fn proposal(id: &str) -> Proposal {
        Proposal {
            account_id: AccountId::new(id),
            proposed_owner_id: RepId::new("r1"),
            proposed_owner_name: "Rep r1".into(),
            rule_applied: PriorityRule::ContinuityGeo,
            priority_level: 1,
            rationale: "kept".into(),
            warnings: Vec::new(),
            confidence: Confidence::High,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_write_clears_then_batches() {
        let mut store = MemoryStore::new();
        let build = BuildId::new("b1");
        store
            .proposals
            .insert(build.clone(), vec![proposal("stale")]);

        let proposals: Vec<Proposal> = (0..1200).map(|i| proposal(&format!("a{i}"))).collect();
        write_proposals(&mut store, &fast_policy(), &build, &proposals, 500).unwrap();

        let written = &store.proposals[&build];
        assert_eq!(written.len(), 1200);
        assert!(written.iter().all(|p| p.account_id.as_str() != "stale"));
    }

    #[test]
    fn test_transient_failures_are_absorbed() {
        let mut store = MemoryStore::new();
        store.transient_failures = 2;
        let build = BuildId::new("b1");
        let proposals: Vec<Proposal> = (0..10).map(|i| proposal(&format!("a{i}"))).collect();
        write_proposals(&mut store, &fast_policy(), &build, &proposals, 500).unwrap();
        assert_eq!(store.proposals[&build].len(), 10);
    }

    #[test]
    fn test_write_failed_past_ten_percent() {
        let mut store = MemoryStore::new();
        // clear succeeds, the first insert batch fails hard: 500 of 1200
        // rows lost, past the 10% tolerance
        store.hard_failures = 1;
        let build = BuildId::new("b1");
        let proposals: Vec<Proposal> = (0..1200).map(|i| proposal(&format!("a{i}"))).collect();
        let result = write_proposals(&mut store, &fast_policy(), &build, &proposals, 500);
        assert!(matches!(
            result,
            Err(TamError::WriteFailed {
                failed: 500,
                total: 1200
            })
        ));
    }

    #[test]
    fn test_tier_filter_partitions() {
        assert!(TierFilter::Enterprise.matches(Some(Tier::Tier1)));
        assert!(!TierFilter::Enterprise.matches(Some(Tier::Tier3)));
        assert!(TierFilter::Commercial.matches(None));
        assert!(!TierFilter::Commercial.matches(Some(Tier::Tier2)));
        assert!(TierFilter::All.matches(Some(Tier::Tier4)));
    }

    #[test]
    fn test_audit_entries_describe_proposals() {
        let entries = AuditEntry::from_proposals(&[proposal("a1")]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rule, PriorityRule::ContinuityGeo);
        assert!(entries[0].detail.contains("a1 -> r1"));
    }

    #[test]
    fn test_persist_output_moves_everything() {
        use tam_core::Cohort;
        use tam_engine::{CascadePlan, ChildCascade};

        let build = BuildId::new("b1");
        let output = AssignmentOutput {
            build_id: build.clone(),
            cohort: Cohort::Customer,
            proposals: vec![proposal("a1"), proposal("a2")],
            warnings: Vec::new(),
            thresholds: tam_engine::CalibratedThresholds::empty(Cohort::Customer),
            statistics: tam_engine::Statistics::default(),
            cascade: CascadePlan {
                children: vec![ChildCascade {
                    account_id: AccountId::new("c1"),
                    new_owner_id: RepId::new("r1"),
                    new_owner_name: "Rep r1".into(),
                    rule_applied: PriorityRule::ContinuityCascade,
                }],
                opportunities: Vec::new(),
            },
        };

        let mut store = MemoryStore::new();
        persist_output(&mut store, &fast_policy(), &output, 500).unwrap();

        assert_eq!(store.proposals[&build].len(), 2);
        assert_eq!(store.child_cascades[&build].len(), 1);
        assert_eq!(store.audit[&build].len(), 2);
    }
}
