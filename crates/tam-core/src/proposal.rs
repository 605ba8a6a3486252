//! Proposal, warning and rule vocabulary
//!
//! Every assignment decision the engine emits is a [`Proposal`] tagged with
//! the closed [`PriorityRule`] that produced it, a priority level, a
//! free-text rationale and a [`Confidence`] grade. Non-fatal conditions are
//! [`Warning`]s: data on the output, never control flow.

use crate::{AccountId, RepId};
use serde::{Deserialize, Serialize};

/// The closed set of rules that can produce a proposal.
///
/// The source system dispatched on a free-form rule string; here the
/// registry is a compile-time enum and the legacy strings are only a
/// display concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityRule {
    /// P1: continuity plus geography match.
    ContinuityGeo,
    /// P2: geography match, owner may change.
    GeoMatch,
    /// P3: continuity regardless of geography.
    ContinuityAnyGeo,
    /// P4: any rep with capacity.
    Fallback,
    /// P5: least-loaded rep regardless of capacity. Still reported at
    /// priority level 4.
    ForcedFallback,
    /// Strategic-pool flow, bypassing the waterfall.
    Strategic,
    /// Child inherited its parent's proposed owner during cascade.
    ContinuityCascade,
    /// Locked account keeps its current owner.
    Holdover,
    /// Parent pre-assigned from its children's ownership.
    ParentAlignment,
}

impl PriorityRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityRule::ContinuityGeo => "P1",
            PriorityRule::GeoMatch => "P2",
            PriorityRule::ContinuityAnyGeo => "P3",
            PriorityRule::Fallback => "P4",
            PriorityRule::ForcedFallback => "Forced-Fallback",
            PriorityRule::Strategic => "Strategic",
            PriorityRule::ContinuityCascade => "Continuity-Cascade",
            PriorityRule::Holdover => "Holdover",
            PriorityRule::ParentAlignment => "Parent-Child Alignment",
        }
    }

    /// Reported priority level. Forced fallback is still level 4; the
    /// non-waterfall rules report at the top level.
    pub fn priority_level(&self) -> u8 {
        match self {
            PriorityRule::ContinuityGeo => 1,
            PriorityRule::GeoMatch => 2,
            PriorityRule::ContinuityAnyGeo => 3,
            PriorityRule::Fallback | PriorityRule::ForcedFallback => 4,
            PriorityRule::Strategic
            | PriorityRule::ContinuityCascade
            | PriorityRule::Holdover
            | PriorityRule::ParentAlignment => 1,
        }
    }
}

impl std::fmt::Display for PriorityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How confident the engine is that a proposal will survive review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Warning severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// The closed set of warning conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    /// An account with an active current owner was proposed to someone else.
    ContinuityBroken,
    /// P3 kept continuity across a region mismatch.
    CrossRegion,
    /// Forced assignment pushed a rep past capacity.
    CapacityExceeded,
    /// No territory→region resolution; the account skipped P1/P2.
    UnmappedTerritory,
    /// The batch model did not solve; the pass used its greedy scheme.
    SolverFallback,
    /// A rep finished at or above the CRE cap.
    CreRisk,
    /// A rep finished above a tier concentration cap.
    TierConcentration,
    /// Locked children with different owners force a split parent.
    WillCreateSplit,
    /// An account emerged from the run with no proposal. A bug.
    Unassigned,
    /// Reps left out of the threshold divisor.
    ExcludedFromThresholdCalc,
    /// A pipeline stage ran past its soft time limit.
    StageOverrun,
}

/// A non-fatal condition observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_id: Option<RepId>,
}

impl Warning {
    pub fn new(code: WarningCode, severity: Severity, message: impl Into<String>) -> Self {
        Warning {
            code,
            severity,
            message: message.into(),
            account_id: None,
            rep_id: None,
        }
    }

    pub fn for_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn for_rep(mut self, rep_id: RepId) -> Self {
        self.rep_id = Some(rep_id);
        self
    }
}

/// One proposed owner for one account. At most one live proposal exists per
/// account; the engine's output covers the assignable pool bijectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub account_id: AccountId,
    pub proposed_owner_id: RepId,
    pub proposed_owner_name: String,
    pub rule_applied: PriorityRule,
    pub priority_level: u8,
    pub rationale: String,
    #[serde(default)]
    pub warnings: Vec<WarningCode>,
    pub confidence: Confidence,
}

impl Proposal {
    pub fn new(
        account_id: AccountId,
        proposed_owner_id: RepId,
        proposed_owner_name: impl Into<String>,
        rule: PriorityRule,
        rationale: impl Into<String>,
    ) -> Self {
        Proposal {
            account_id,
            proposed_owner_id,
            proposed_owner_name: proposed_owner_name.into(),
            rule_applied: rule,
            priority_level: rule.priority_level(),
            rationale: rationale.into(),
            warnings: Vec::new(),
            confidence: Confidence::High,
        }
    }
}
