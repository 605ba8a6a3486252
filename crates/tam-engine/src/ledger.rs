//! Workload ledger
//!
//! Tracks the evolving per-rep load across every capacity dimension and
//! answers `has_capacity` in O(1). One ledger exists per run, owned by the
//! pass driver and passed by exclusive reference into each helper; there is
//! no shared or global workload state.
//!
//! Capacity is a pure boolean query. "Rep full" is an ordinary `false`,
//! never an error.

use crate::thresholds::{Band, CalibratedThresholds};
use std::collections::{BTreeMap, HashSet};
use tam_core::{Account, Cohort, Configuration, FiscalCalendar, RepId, SalesRep, Tier};

/// Hard-cap default as a multiple of the preferred max, used when
/// `customer_hard_cap_arr` is not configured.
pub const HARD_CAP_FACTOR: f64 = 1.25;
/// A rep below half its ARR minimum is "deeply under-loaded".
pub const DEEP_UNDERLOAD_FRACTION: f64 = 0.5;
/// Deeply under-loaded reps may be filled to 1.2 × preferred max.
pub const RELIEF_STRETCH: f64 = 1.2;
/// Other below-minimum reps may stretch to 1.15 × preferred max.
pub const BAND_STRETCH: f64 = 1.15;
/// Two balance scores within this epsilon tie; raw ARR breaks the tie.
pub const BALANCE_EPSILON: f64 = 1e-2;

/// Per-rep load sums for one cohort.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Workload {
    pub arr: f64,
    /// Prospect-cohort revenue signal (new bookings minus churn).
    pub net_arr: f64,
    pub account_count: u32,
    pub cre: u32,
    pub atr: f64,
    pub tier1_count: u32,
    pub tier2_count: u32,
    pub quarter_renewals: [u32; 4],
}

/// Resolved capacity levels for one cohort: the calibrated bands with any
/// configured ARR overrides applied, plus the absolute caps.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityBands {
    pub arr: Band,
    pub atr: Band,
    pub cre: Band,
    pub tier1: Band,
    pub tier2: Band,
    /// Preferred per-rep ARR ceiling (soft).
    pub preferred_max: f64,
    /// Absolute per-rep ARR ceiling (hard). Infinite for prospects.
    pub hard_cap: f64,
    pub max_cre: u32,
}

impl CapacityBands {
    /// Compose calibrated thresholds with config overrides for the cohort.
    pub fn resolve(
        config: &Configuration,
        thresholds: &CalibratedThresholds,
        cohort: Cohort,
    ) -> CapacityBands {
        let (target_override, min_override, max_override) = match cohort {
            Cohort::Customer => (
                config.customer_target_arr,
                config.customer_min_arr,
                config.customer_max_arr,
            ),
            Cohort::Prospect => (
                config.prospect_target_arr,
                config.prospect_min_arr,
                config.prospect_max_arr,
            ),
        };
        let arr = Band {
            target: target_override.unwrap_or(thresholds.arr.target),
            min: min_override.unwrap_or(thresholds.arr.min),
            max: max_override.unwrap_or(thresholds.arr.max),
        };
        let preferred_max = arr.max;
        let hard_cap = match cohort {
            Cohort::Customer => config
                .customer_hard_cap_arr
                .unwrap_or(HARD_CAP_FACTOR * preferred_max),
            // Prospects have no hard ARR cap; balance is count-driven.
            Cohort::Prospect => f64::INFINITY,
        };
        CapacityBands {
            arr,
            atr: thresholds.atr,
            cre: thresholds.cre,
            tier1: thresholds.tier1,
            tier2: thresholds.tier2,
            preferred_max,
            hard_cap,
            max_cre: config.max_cre_per_rep,
        }
    }
}

/// The evolving per-rep workload for one cohort run.
#[derive(Debug)]
pub struct WorkloadLedger {
    cohort: Cohort,
    bands: CapacityBands,
    calendar: FiscalCalendar,
    loads: BTreeMap<RepId, Workload>,
    strategic: HashSet<RepId>,
}

impl WorkloadLedger {
    /// Seed a ledger with zeroed entries for every roster rep, then record
    /// `existing` accounts against their current owners. The engine passes
    /// the holdover-locked accounts here so their load is counted exactly
    /// once (holdover proposals do not `record` again).
    pub fn init(
        reps: &[SalesRep],
        existing: &[(&Account, f64)],
        config: &Configuration,
        thresholds: &CalibratedThresholds,
        cohort: Cohort,
    ) -> WorkloadLedger {
        let calendar = config
            .fiscal_calendar()
            .unwrap_or_default();
        let mut ledger = WorkloadLedger {
            cohort,
            bands: CapacityBands::resolve(config, thresholds, cohort),
            calendar,
            loads: reps
                .iter()
                .map(|r| (r.rep_id.clone(), Workload::default()))
                .collect(),
            strategic: reps
                .iter()
                .filter(|r| r.is_strategic_rep)
                .map(|r| r.rep_id.clone())
                .collect(),
        };
        for (account, net_arr) in existing {
            if let Some(owner) = account.current_owner_id.clone() {
                ledger.record(&owner, account, *net_arr);
            }
        }
        ledger
    }

    pub fn bands(&self) -> &CapacityBands {
        &self.bands
    }

    pub fn cohort(&self) -> Cohort {
        self.cohort
    }

    /// Current load for a rep. Unknown reps read as zero load.
    pub fn load(&self, rep: &RepId) -> Workload {
        self.loads.get(rep).copied().unwrap_or_default()
    }

    /// Increment every dimension for the account's cohort.
    pub fn record(&mut self, rep: &RepId, account: &Account, net_arr: f64) {
        let quarter = account.renewal_quarter(&self.calendar);
        let tier = account.tier(self.cohort);
        let load = self.loads.entry(rep.clone()).or_default();
        load.arr += account.effective_arr();
        load.net_arr += net_arr;
        load.account_count += 1;
        load.cre += account.cre_count;
        load.atr += account.effective_atr();
        match tier {
            Some(Tier::Tier1) => load.tier1_count += 1,
            Some(Tier::Tier2) => load.tier2_count += 1,
            _ => {}
        }
        if let Some(q) = quarter {
            load.quarter_renewals[q.index()] += 1;
        }
    }

    /// ARR headroom against the hard cap, for the model's per-rep
    /// constraint. Never negative.
    pub fn remaining_hard_cap(&self, rep: &RepId) -> f64 {
        (self.bands.hard_cap - self.load(rep).arr).max(0.0)
    }

    /// True when the rep is under the minimum band on any configured
    /// dimension (ARR, CRE, ATR, Tier-1, Tier-2).
    pub fn is_below_minimum(&self, rep: &RepId) -> bool {
        let load = self.load(rep);
        let b = &self.bands;
        load.arr < b.arr.min
            || (load.cre as f64) < b.cre.min
            || load.atr < b.atr.min
            || (load.tier1_count as f64) < b.tier1.min
            || (load.tier2_count as f64) < b.tier2.min
    }

    /// Mean of the current/target ratios across the configured dimensions;
    /// lower is more under-loaded. Prospects balance by account count, so
    /// their score is the raw count.
    pub fn balance_score(&self, rep: &RepId) -> f64 {
        let load = self.load(rep);
        if self.cohort == Cohort::Prospect {
            return load.account_count as f64;
        }
        let b = &self.bands;
        let dims = [
            (load.arr, b.arr.target),
            (load.cre as f64, b.cre.target),
            (load.atr, b.atr.target),
            (load.tier1_count as f64, b.tier1.target),
            (load.tier2_count as f64, b.tier2.target),
        ];
        let mut sum = 0.0;
        let mut used = 0usize;
        for (current, target) in dims {
            if target > f64::EPSILON {
                sum += current / target;
                used += 1;
            }
        }
        if used == 0 {
            0.0
        } else {
            sum / used as f64
        }
    }

    /// The §4.4.3 strict total order for greedy rep selection: balance
    /// score (with epsilon), then raw current ARR, then rep id.
    pub fn cmp_for_selection(&self, a: &RepId, b: &RepId) -> std::cmp::Ordering {
        let (sa, sb) = (self.balance_score(a), self.balance_score(b));
        if (sa - sb).abs() > BALANCE_EPSILON {
            return sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal);
        }
        let (la, lb) = (self.load(a).arr, self.load(b).arr);
        la.partial_cmp(&lb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    }

    /// Whether `rep` can take `account` without breaking the capacity
    /// policy.
    ///
    /// Customer policy, in order:
    /// 1. Past the hard cap: no.
    /// 2. Rep below minimum on any dimension: yes if the addition lands in
    ///    [min, preferred max]; yes if deeply under-loaded and the addition
    ///    stays within the relief bound; otherwise yes only within the
    ///    stretch bound.
    /// 3. Past the preferred max: no.
    /// 4. CRE-flagged account onto a rep at the CRE cap: no (unless the
    ///    caller ignores CRE).
    /// 5. Otherwise: yes.
    ///
    /// Prospects always fit; strategic reps always fit.
    pub fn has_capacity(&self, rep: &RepId, account: &Account, ignore_cre: bool) -> bool {
        if self.strategic.contains(rep) {
            return true;
        }
        if self.cohort == Cohort::Prospect {
            return true;
        }
        let load = self.load(rep);
        let b = &self.bands;
        let new_arr = load.arr + account.effective_arr();

        if new_arr > b.hard_cap {
            return false;
        }
        if self.is_below_minimum(rep) {
            if new_arr >= b.arr.min && new_arr <= b.preferred_max {
                return true;
            }
            if load.arr < DEEP_UNDERLOAD_FRACTION * b.arr.min
                && new_arr <= RELIEF_STRETCH * b.preferred_max
            {
                return true;
            }
            return new_arr <= BAND_STRETCH * b.preferred_max;
        }
        if new_arr > b.preferred_max {
            return false;
        }
        if !ignore_cre && account.cre_count > 0 && load.cre >= b.max_cre {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tam_core::AccountId;

    fn rep(id: &str, strategic: bool) -> SalesRep {
        SalesRep {
            rep_id: RepId::new(id),
            name: format!("Rep {id}"),
            region: Some(tam_core::Region::West),
            team_tier: None,
            is_active: true,
            include_in_assignments: true,
            is_strategic_rep: strategic,
            is_backfill_source: false,
            is_placeholder: false,
        }
    }

    fn account(id: &str, arr: f64, cre: u32) -> Account {
        Account {
            account_id: AccountId::new(id),
            name: format!("Account {id}"),
            is_parent: true,
            parent_id: None,
            ultimate_parent_id: None,
            is_customer: true,
            arr,
            calculated_arr: 0.0,
            hierarchy_bookings_arr_converted: 0.0,
            atr: 0.0,
            calculated_atr: 0.0,
            expansion_tier: None,
            initial_sale_tier: None,
            cre_count: cre,
            renewal_date: None,
            territory: None,
            current_owner_id: None,
            exclude_from_reassignment: false,
        }
    }

    fn thresholds_with_arr(target: f64, min: f64, max: f64) -> CalibratedThresholds {
        let mut t = CalibratedThresholds::empty(Cohort::Customer);
        t.normal_rep_count = 1;
        t.arr = Band { target, min, max };
        t
    }

    fn ledger(target: f64, min: f64, max: f64) -> WorkloadLedger {
        WorkloadLedger::init(
            &[rep("r1", false), rep("s1", true)],
            &[],
            &Configuration::default(),
            &thresholds_with_arr(target, min, max),
            Cohort::Customer,
        )
    }

    #[test]
    fn test_record_accumulates_dimensions() {
        let mut l = ledger(1_000_000.0, 850_000.0, 1_150_000.0);
        let mut a = account("a1", 300_000.0, 2);
        a.expansion_tier = Some(Tier::Tier1);
        a.atr = 50_000.0;
        let r = RepId::new("r1");
        l.record(&r, &a, 0.0);
        let load = l.load(&r);
        assert_eq!(load.arr, 300_000.0);
        assert_eq!(load.account_count, 1);
        assert_eq!(load.cre, 2);
        assert_eq!(load.atr, 50_000.0);
        assert_eq!(load.tier1_count, 1);
    }

    #[test]
    fn test_hard_cap_refuses() {
        let l = ledger(1_000_000.0, 850_000.0, 1_150_000.0);
        // hard cap = 1.25 * 1_150_000
        let r = RepId::new("r1");
        let big = account("a1", 1.25 * 1_150_000.0 + 1.0, 0);
        assert!(!l.has_capacity(&r, &big, false));
    }

    #[test]
    fn test_below_minimum_pull_into_band() {
        let l = ledger(1_000_000.0, 850_000.0, 1_150_000.0);
        let r = RepId::new("r1");
        // 900k lands inside [min, preferred_max]
        assert!(l.has_capacity(&r, &account("a1", 900_000.0, 0), false));
    }

    #[test]
    fn test_deep_underload_relief() {
        let l = ledger(1_000_000.0, 850_000.0, 1_150_000.0);
        let r = RepId::new("r1");
        // current 0 < 0.5*min; relief bound is 1.2 * preferred_max
        assert!(l.has_capacity(&r, &account("a1", 1.2 * 1_150_000.0, 0), false));
        assert!(!l.has_capacity(&r, &account("a2", 1.25 * 1_150_000.0 + 1.0, 0), false));
    }

    #[test]
    fn test_preferred_max_refuses_once_in_band() {
        let mut l = ledger(1_000_000.0, 0.0, 1_150_000.0);
        let r = RepId::new("r1");
        // Zero minimums on every dimension: the rep is never below minimum.
        l.record(&r, &account("seed", 900_000.0, 0), 0.0);
        assert!(!l.has_capacity(&r, &account("a1", 300_000.0, 0), false));
        assert!(l.has_capacity(&r, &account("a2", 200_000.0, 0), false));
    }

    #[test]
    fn test_cre_cap_blocks_flagged_accounts() {
        let mut l = ledger(1_000_000.0, 0.0, 10_000_000.0);
        let r = RepId::new("r1");
        for i in 0..3 {
            l.record(&r, &account(&format!("c{i}"), 1_000.0, 1), 0.0);
        }
        assert!(!l.has_capacity(&r, &account("a1", 1_000.0, 1), false));
        // unflagged accounts are unaffected
        assert!(l.has_capacity(&r, &account("a2", 1_000.0, 0), false));
        // ignore_cre overrides
        assert!(l.has_capacity(&r, &account("a3", 1_000.0, 1), true));
    }

    #[test]
    fn test_strategic_rep_always_has_capacity() {
        let l = ledger(1_000_000.0, 850_000.0, 1_150_000.0);
        let s = RepId::new("s1");
        assert!(l.has_capacity(&s, &account("a1", 1e12, 5), false));
    }

    #[test]
    fn test_prospect_cohort_always_fits() {
        let l = WorkloadLedger::init(
            &[rep("r1", false)],
            &[],
            &Configuration::default(),
            &CalibratedThresholds::empty(Cohort::Prospect),
            Cohort::Prospect,
        );
        let mut a = account("a1", 0.0, 0);
        a.is_customer = false;
        assert!(l.has_capacity(&RepId::new("r1"), &a, false));
    }

    #[test]
    fn test_selection_order_tie_breaks() {
        let mut l = ledger(1_000_000.0, 0.0, 1_150_000.0);
        let (r1, s1) = (RepId::new("r1"), RepId::new("s1"));
        // equal scores: rep id breaks the tie
        assert_eq!(l.cmp_for_selection(&r1, &s1), std::cmp::Ordering::Less);
        l.record(&r1, &account("a1", 500_000.0, 0), 0.0);
        assert_eq!(l.cmp_for_selection(&s1, &r1), std::cmp::Ordering::Less);
    }

    #[test]
    fn test_init_seeds_existing_accounts() {
        let mut a = account("locked", 400_000.0, 1);
        a.current_owner_id = Some(RepId::new("r1"));
        a.exclude_from_reassignment = true;
        let l = WorkloadLedger::init(
            &[rep("r1", false)],
            &[(&a, 0.0)],
            &Configuration::default(),
            &thresholds_with_arr(1_000_000.0, 850_000.0, 1_150_000.0),
            Cohort::Customer,
        );
        assert_eq!(l.load(&RepId::new("r1")).arr, 400_000.0);
        assert_eq!(l.load(&RepId::new("r1")).cre, 1);
    }
}
