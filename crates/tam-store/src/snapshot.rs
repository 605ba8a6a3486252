//! JSON snapshot codec
//!
//! The raw snapshot mirrors the upstream export: tiers, team tiers and
//! regions arrive as strings. Parsing into the closed domain enums happens
//! here, once, with a well-defined error for unknown strings; past this
//! boundary malformed data cannot exist.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tam_core::{
    Account, AccountId, BuildId, Configuration, Opportunity, Region, RepId, SalesRep, TamResult,
    TeamTier, Tier,
};

/// An account row as exported by the upstream system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAccount {
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub ultimate_parent_id: Option<String>,
    #[serde(default)]
    pub is_customer: bool,
    #[serde(default)]
    pub arr: f64,
    #[serde(default)]
    pub calculated_arr: f64,
    #[serde(default)]
    pub hierarchy_bookings_arr_converted: f64,
    #[serde(default)]
    pub atr: f64,
    #[serde(default)]
    pub calculated_atr: f64,
    #[serde(default)]
    pub expansion_tier: Option<String>,
    #[serde(default)]
    pub initial_sale_tier: Option<String>,
    #[serde(default)]
    pub cre_count: u32,
    #[serde(default)]
    pub renewal_date: Option<NaiveDate>,
    #[serde(default)]
    pub territory: Option<String>,
    #[serde(default)]
    pub current_owner_id: Option<String>,
    #[serde(default)]
    pub exclude_from_reassignment: bool,
}

impl RawAccount {
    pub fn into_account(self) -> TamResult<Account> {
        let parse_tier = |raw: Option<String>| -> TamResult<Option<Tier>> {
            raw.filter(|s| !s.trim().is_empty())
                .map(|s| s.parse())
                .transpose()
        };
        Ok(Account {
            account_id: AccountId::new(self.account_id),
            name: self.name,
            is_parent: self.is_parent,
            parent_id: self.parent_id.map(AccountId::new),
            ultimate_parent_id: self.ultimate_parent_id.map(AccountId::new),
            is_customer: self.is_customer,
            arr: self.arr,
            calculated_arr: self.calculated_arr,
            hierarchy_bookings_arr_converted: self.hierarchy_bookings_arr_converted,
            atr: self.atr,
            calculated_atr: self.calculated_atr,
            expansion_tier: parse_tier(self.expansion_tier)?,
            initial_sale_tier: parse_tier(self.initial_sale_tier)?,
            cre_count: self.cre_count,
            renewal_date: self.renewal_date,
            territory: self.territory.filter(|t| !t.trim().is_empty()),
            current_owner_id: self.current_owner_id.map(RepId::new),
            exclude_from_reassignment: self.exclude_from_reassignment,
        })
    }
}

/// A rep row as exported by the upstream system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRep {
    pub rep_id: String,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub team_tier: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub include_in_assignments: bool,
    #[serde(default)]
    pub is_strategic_rep: bool,
    #[serde(default)]
    pub is_backfill_source: bool,
    #[serde(default)]
    pub is_placeholder: bool,
}

impl RawRep {
    pub fn into_rep(self) -> TamResult<SalesRep> {
        let team_tier: Option<TeamTier> = self
            .team_tier
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse())
            .transpose()?;
        let rep = SalesRep {
            rep_id: RepId::new(self.rep_id),
            name: self.name,
            region: self
                .region
                .filter(|s| !s.trim().is_empty())
                .map(|s| Region::parse(&s)),
            team_tier,
            is_active: self.is_active,
            include_in_assignments: self.include_in_assignments,
            is_strategic_rep: self.is_strategic_rep,
            is_backfill_source: self.is_backfill_source,
            is_placeholder: self.is_placeholder,
        };
        rep.validate()?;
        Ok(rep)
    }
}

/// A complete raw input snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSnapshot {
    pub build_id: String,
    #[serde(default)]
    pub accounts: Vec<RawAccount>,
    #[serde(default)]
    pub reps: Vec<RawRep>,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    /// Optional embedded configuration; a CLI-side config file overrides it.
    #[serde(default)]
    pub configuration: Option<Configuration>,
}

/// The snapshot after boundary parsing.
#[derive(Debug, Clone)]
pub struct ParsedSnapshot {
    pub build_id: BuildId,
    pub accounts: Vec<Account>,
    pub reps: Vec<SalesRep>,
    pub opportunities: Vec<Opportunity>,
    pub configuration: Option<Configuration>,
}

impl AssignmentSnapshot {
    pub fn from_json_file(path: &Path) -> TamResult<AssignmentSnapshot> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&raw)?;
        Ok(snapshot)
    }

    pub fn parse(self) -> TamResult<ParsedSnapshot> {
        Ok(ParsedSnapshot {
            build_id: BuildId::new(self.build_id),
            accounts: self
                .accounts
                .into_iter()
                .map(RawAccount::into_account)
                .collect::<TamResult<_>>()?,
            reps: self
                .reps
                .into_iter()
                .map(RawRep::into_rep)
                .collect::<TamResult<_>>()?,
            opportunities: self.opportunities,
            configuration: self.configuration,
        })
    }
}
