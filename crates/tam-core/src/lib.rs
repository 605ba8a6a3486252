//! # tam-core: Territory Assignment Core Model
//!
//! Provides the fundamental data structures shared by the assignment engine,
//! the persistence boundary and the CLI.
//!
//! ## Design Philosophy
//!
//! The engine is a **pure batch function**: it reads an immutable snapshot of
//! accounts and reps, and emits a batch of proposals. Everything in this crate
//! is plain data with small pure methods:
//!
//! - Type-safe string IDs ([`AccountId`], [`RepId`], [`BuildId`])
//! - Closed enums for everything the source system kept as strings
//!   ([`Tier`], [`Region`], [`Cohort`], [`fiscal::Quarter`])
//! - A total representation of the account hierarchy ([`ParentLink`])
//! - Revenue signals resolved through documented priority chains
//!   ([`Account::effective_arr`], [`Account::effective_atr`])
//!
//! Parsing from raw strings happens once, at the input boundary; past that
//! boundary unknown tiers or malformed flags cannot exist.
//!
//! ## Modules
//!
//! - [`error`] - Unified error type and result alias
//! - [`config`] - Run configuration (capacity bands, caps, mappings)
//! - [`fiscal`] - Fiscal-quarter calendar (fiscal year starts in February)
//! - [`cancel`] - Cancellation token and wall-clock run limits
//! - [`proposal`] - Proposal, warning and rule/confidence vocabulary

pub mod cancel;
pub mod config;
pub mod error;
pub mod fiscal;
pub mod proposal;

pub use cancel::{CancellationToken, RunClock, RunLimits, Stage};
pub use config::{Configuration, SolverConfig};
pub use error::{TamError, TamResult};
pub use fiscal::{FiscalCalendar, Quarter};
pub use proposal::{
    Confidence, PriorityRule, Proposal, Severity, Warning, WarningCode,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque account identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque sales rep identifier. Placeholder reps ("open headcount" seats)
/// carry auto-generated IDs but are otherwise ordinary reps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepId(pub String);

impl RepId {
    pub fn new(id: impl Into<String>) -> Self {
        RepId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one assignment build (one planning run's snapshot).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub String);

impl BuildId {
    pub fn new(id: impl Into<String>) -> Self {
        BuildId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two account populations. Each cohort runs through the engine
/// separately with its own capacity bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cohort {
    Customer,
    Prospect,
}

impl Cohort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cohort::Customer => "customer",
            Cohort::Prospect => "prospect",
        }
    }
}

impl std::str::FromStr for Cohort {
    type Err = TamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Cohort::Customer),
            "prospect" => Ok(Cohort::Prospect),
            other => Err(TamError::Parse(format!("unknown cohort '{other}'"))),
        }
    }
}

/// Account tier. Sourced from `expansion_tier` for customers and
/// `initial_sale_tier` for prospects; absent tiers stay `None` on the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Tier1 => "Tier 1",
            Tier::Tier2 => "Tier 2",
            Tier::Tier3 => "Tier 3",
            Tier::Tier4 => "Tier 4",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = TamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tier 1" | "tier1" | "1" => Ok(Tier::Tier1),
            "tier 2" | "tier2" | "2" => Ok(Tier::Tier2),
            "tier 3" | "tier3" | "3" => Ok(Tier::Tier3),
            "tier 4" | "tier4" | "4" => Ok(Tier::Tier4),
            other => Err(TamError::Parse(format!("unknown tier '{other}'"))),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sales team tier of a rep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TeamTier {
    Smb,
    Growth,
    Mm,
    Ent,
}

impl std::str::FromStr for TeamTier {
    type Err = TamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SMB" => Ok(TeamTier::Smb),
            "GROWTH" => Ok(TeamTier::Growth),
            "MM" => Ok(TeamTier::Mm),
            "ENT" => Ok(TeamTier::Ent),
            other => Err(TamError::Parse(format!("unknown team tier '{other}'"))),
        }
    }
}

/// Canonical sales regions, plus an `Other` escape hatch for regions outside
/// the canonical set. `Other` holds a trimmed, lower-cased normalization so
/// equality stays case-insensitive without re-normalizing on every compare.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    West,
    NorthEast,
    SouthEast,
    Central,
    Dach,
    Uki,
    Nordics,
    France,
    Benelux,
    MiddleEast,
    RoEmea,
    Apac,
    Other(String),
}

impl Region {
    /// Parse a raw region string. Never fails: unknown regions normalize
    /// into [`Region::Other`].
    pub fn parse(raw: &str) -> Region {
        let norm = raw.trim().to_ascii_lowercase();
        match norm.as_str() {
            "west" => Region::West,
            "north east" | "northeast" => Region::NorthEast,
            "south east" | "southeast" => Region::SouthEast,
            "central" => Region::Central,
            "dach" => Region::Dach,
            "uki" => Region::Uki,
            "nordics" => Region::Nordics,
            "france" => Region::France,
            "benelux" => Region::Benelux,
            "middle east" | "middle-east" => Region::MiddleEast,
            "ro-emea" | "ro emea" | "rest of emea" => Region::RoEmea,
            "apac" => Region::Apac,
            _ => Region::Other(norm),
        }
    }

    pub fn canonical(&self) -> &str {
        match self {
            Region::West => "West",
            Region::NorthEast => "North East",
            Region::SouthEast => "South East",
            Region::Central => "Central",
            Region::Dach => "DACH",
            Region::Uki => "UKI",
            Region::Nordics => "Nordics",
            Region::France => "France",
            Region::Benelux => "Benelux",
            Region::MiddleEast => "Middle East",
            Region::RoEmea => "RO-EMEA",
            Region::Apac => "APAC",
            Region::Other(s) => s,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical())
    }
}

/// Total representation of an account's position in the hierarchy.
///
/// The source data uses `ultimate_parent_id == account_id` as the root
/// sentinel; [`Account::parent_link`] folds that convention into a variant so
/// downstream code cannot forget the sentinel check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentLink {
    Root,
    Parent(AccountId),
}

/// A parent account (or child, for hierarchy cascade) in the input snapshot.
///
/// Only parents (`is_parent == true`) are directly assigned; children inherit
/// their parent's proposed owner during cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub name: String,
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default)]
    pub parent_id: Option<AccountId>,
    #[serde(default)]
    pub ultimate_parent_id: Option<AccountId>,
    #[serde(default)]
    pub is_customer: bool,
    /// Raw booked ARR.
    #[serde(default)]
    pub arr: f64,
    /// ARR recomputed by the revenue pipeline.
    #[serde(default)]
    pub calculated_arr: f64,
    /// Hierarchy-level bookings ARR, currency-converted. Highest-priority
    /// revenue signal when non-zero.
    #[serde(default)]
    pub hierarchy_bookings_arr_converted: f64,
    #[serde(default)]
    pub atr: f64,
    #[serde(default)]
    pub calculated_atr: f64,
    #[serde(default)]
    pub expansion_tier: Option<Tier>,
    #[serde(default)]
    pub initial_sale_tier: Option<Tier>,
    /// Count of open CRE risk flags on this account.
    #[serde(default)]
    pub cre_count: u32,
    #[serde(default)]
    pub renewal_date: Option<NaiveDate>,
    #[serde(default)]
    pub territory: Option<String>,
    #[serde(default)]
    pub current_owner_id: Option<RepId>,
    /// Lock: the account never changes owner in any pass.
    #[serde(default)]
    pub exclude_from_reassignment: bool,
}

impl Account {
    /// Effective ARR: first non-zero of
    /// (`hierarchy_bookings_arr_converted`, `calculated_arr`, `arr`).
    pub fn effective_arr(&self) -> f64 {
        for v in [
            self.hierarchy_bookings_arr_converted,
            self.calculated_arr,
            self.arr,
        ] {
            if v != 0.0 {
                return v;
            }
        }
        0.0
    }

    /// Effective ATR: first non-zero of (`calculated_atr`, `atr`).
    pub fn effective_atr(&self) -> f64 {
        for v in [self.calculated_atr, self.atr] {
            if v != 0.0 {
                return v;
            }
        }
        0.0
    }

    /// Tier under the given cohort's sourcing rule.
    pub fn tier(&self, cohort: Cohort) -> Option<Tier> {
        match cohort {
            Cohort::Customer => self.expansion_tier,
            Cohort::Prospect => self.initial_sale_tier,
        }
    }

    /// Fiscal quarter the account renews in, if a renewal date is known.
    pub fn renewal_quarter(&self, calendar: &FiscalCalendar) -> Option<Quarter> {
        self.renewal_date.map(|d| calendar.quarter_of(d))
    }

    pub fn cohort(&self) -> Cohort {
        if self.is_customer {
            Cohort::Customer
        } else {
            Cohort::Prospect
        }
    }

    /// Fold the `ultimate_parent_id == self` sentinel into [`ParentLink`].
    pub fn parent_link(&self) -> ParentLink {
        match (&self.ultimate_parent_id, &self.parent_id) {
            (Some(up), _) if *up == self.account_id => ParentLink::Root,
            (_, Some(p)) if *p != self.account_id => ParentLink::Parent(p.clone()),
            (Some(up), None) => ParentLink::Parent(up.clone()),
            _ => ParentLink::Root,
        }
    }
}

/// A sales rep in the input roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRep {
    pub rep_id: RepId,
    pub name: String,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub team_tier: Option<TeamTier>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub include_in_assignments: bool,
    #[serde(default)]
    pub is_strategic_rep: bool,
    /// Rep whose book is being drained into other reps. Backfill sources
    /// never receive assignments: `is_backfill_source` implies
    /// `!include_in_assignments`, validated at the input boundary.
    #[serde(default)]
    pub is_backfill_source: bool,
    #[serde(default)]
    pub is_placeholder: bool,
}

impl SalesRep {
    /// A rep that may receive proposals at all.
    pub fn is_assignable(&self) -> bool {
        self.is_active && self.include_in_assignments
    }

    /// Divisor eligibility for threshold calibration and normal-pool
    /// eligibility: assignable, non-strategic, and region known.
    pub fn is_normal_pool(&self) -> bool {
        self.is_assignable() && !self.is_strategic_rep && self.region.is_some()
    }

    /// Boundary validation of rep flag invariants.
    pub fn validate(&self) -> TamResult<()> {
        if self.is_backfill_source && self.include_in_assignments {
            return Err(TamError::InvariantViolation(format!(
                "rep {} is a backfill source but included in assignments",
                self.rep_id
            )));
        }
        Ok(())
    }
}

/// An open opportunity hanging off an account. Opportunities follow their
/// account's subtree during cascade and carry the prospect revenue signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: String,
    pub account_id: AccountId,
    #[serde(default)]
    pub net_arr: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str) -> Account {
        Account {
            account_id: AccountId::new(id),
            name: format!("Account {id}"),
            is_parent: true,
            parent_id: None,
            ultimate_parent_id: None,
            is_customer: true,
            arr: 0.0,
            calculated_arr: 0.0,
            hierarchy_bookings_arr_converted: 0.0,
            atr: 0.0,
            calculated_atr: 0.0,
            expansion_tier: None,
            initial_sale_tier: None,
            cre_count: 0,
            renewal_date: None,
            territory: None,
            current_owner_id: None,
            exclude_from_reassignment: false,
        }
    }

    #[test]
    fn test_effective_arr_priority_chain() {
        let mut a = account("a1");
        a.arr = 100.0;
        assert_eq!(a.effective_arr(), 100.0);
        a.calculated_arr = 200.0;
        assert_eq!(a.effective_arr(), 200.0);
        a.hierarchy_bookings_arr_converted = 300.0;
        assert_eq!(a.effective_arr(), 300.0);
    }

    #[test]
    fn test_effective_arr_zero_when_no_signal() {
        assert_eq!(account("a1").effective_arr(), 0.0);
    }

    #[test]
    fn test_parent_link_root_sentinel() {
        let mut a = account("a1");
        a.ultimate_parent_id = Some(AccountId::new("a1"));
        assert_eq!(a.parent_link(), ParentLink::Root);
    }

    #[test]
    fn test_parent_link_upward() {
        let mut a = account("a2");
        a.parent_id = Some(AccountId::new("a1"));
        a.ultimate_parent_id = Some(AccountId::new("root"));
        assert_eq!(a.parent_link(), ParentLink::Parent(AccountId::new("a1")));
    }

    #[test]
    fn test_tier_parses_source_strings() {
        assert_eq!("Tier 1".parse::<Tier>().unwrap(), Tier::Tier1);
        assert_eq!("tier 3".parse::<Tier>().unwrap(), Tier::Tier3);
        assert!("Platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_region_parse_is_case_insensitive() {
        assert_eq!(Region::parse("WEST"), Region::West);
        assert_eq!(Region::parse("north east"), Region::NorthEast);
        assert_eq!(Region::parse("Iberia"), Region::Other("iberia".into()));
    }

    #[test]
    fn test_backfill_invariant_rejected() {
        let rep = SalesRep {
            rep_id: RepId::new("r1"),
            name: "Rep".into(),
            region: Some(Region::West),
            team_tier: None,
            is_active: true,
            include_in_assignments: true,
            is_strategic_rep: false,
            is_backfill_source: true,
            is_placeholder: false,
        };
        assert!(matches!(
            rep.validate(),
            Err(TamError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_cohort_tier_sourcing() {
        let mut a = account("a1");
        a.expansion_tier = Some(Tier::Tier1);
        a.initial_sale_tier = Some(Tier::Tier3);
        assert_eq!(a.tier(Cohort::Customer), Some(Tier::Tier1));
        assert_eq!(a.tier(Cohort::Prospect), Some(Tier::Tier3));
    }
}
