//! Threshold calibration
//!
//! Converts the raw account pool into per-dimension `{target, min, max}`
//! bands used by the workload ledger's capacity checks and by the batch
//! model's balance objective.
//!
//! The divisor counts only *normal-pool* reps: active, included in
//! assignments, non-strategic, with a known region. Everyone else is listed
//! in an `excluded_from_threshold_calc` warning so reviewers can see who the
//! pool was normalized against.

use serde::{Deserialize, Serialize};
use tam_core::{
    Account, Cohort, Configuration, SalesRep, Severity, TamError, TamResult, Warning, WarningCode,
};

/// A `{target, min, max}` band for one capacity dimension.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Band {
    pub target: f64,
    pub min: f64,
    pub max: f64,
}

impl Band {
    /// Build a band around `target` with fractional variance `v`.
    /// `min` floors and `max` ceils so band edges are whole units.
    pub fn around(target: f64, v: f64) -> Band {
        Band {
            target,
            min: (target * (1.0 - v)).floor(),
            max: (target * (1.0 + v)).ceil(),
        }
    }
}

/// Pool totals accumulated during calibration, kept on the output for
/// auditability.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolTotals {
    pub accounts: usize,
    pub arr: f64,
    pub atr: f64,
    pub cre: f64,
    pub tier1: f64,
    pub tier2: f64,
    pub quarter_renewals: [f64; 4],
}

/// Calibrated per-rep bands for every tracked dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedThresholds {
    pub cohort: Cohort,
    /// Divisor: count of normal-pool reps.
    pub normal_rep_count: usize,
    pub totals: PoolTotals,
    pub arr: Band,
    pub atr: Band,
    pub cre: Band,
    pub tier1: Band,
    pub tier2: Band,
    pub quarters: [Band; 4],
}

impl CalibratedThresholds {
    /// Zeroed thresholds for an empty pool (no accounts to calibrate from).
    pub fn empty(cohort: Cohort) -> Self {
        CalibratedThresholds {
            cohort,
            normal_rep_count: 0,
            totals: PoolTotals::default(),
            arr: Band::default(),
            atr: Band::default(),
            cre: Band::default(),
            tier1: Band::default(),
            tier2: Band::default(),
            quarters: [Band::default(); 4],
        }
    }
}

/// Compute per-rep bands from the cohort's account pool.
///
/// Single sweep over `accounts` in input order; all sums are plain IEEE
/// addition, so targets are reproducible to within float tolerance and the
/// floor/ceil band edges are exact.
pub fn calibrate(
    accounts: &[&Account],
    reps: &[SalesRep],
    config: &Configuration,
    cohort: Cohort,
    warnings: &mut Vec<Warning>,
) -> TamResult<CalibratedThresholds> {
    let normal_rep_count = reps.iter().filter(|r| r.is_normal_pool()).count();
    if normal_rep_count == 0 {
        return Err(TamError::NoEligibleReps);
    }

    let excluded: Vec<&SalesRep> = reps
        .iter()
        .filter(|r| r.is_assignable() && !r.is_normal_pool())
        .collect();
    if !excluded.is_empty() {
        let names: Vec<&str> = excluded.iter().map(|r| r.rep_id.as_str()).collect();
        warnings.push(Warning::new(
            WarningCode::ExcludedFromThresholdCalc,
            Severity::Low,
            format!(
                "{} rep(s) excluded from threshold calibration (strategic or no region): {}",
                excluded.len(),
                names.join(", ")
            ),
        ));
    }

    let calendar = config.fiscal_calendar()?;
    let mut totals = PoolTotals {
        accounts: accounts.len(),
        ..PoolTotals::default()
    };
    for account in accounts {
        totals.arr += account.effective_arr();
        totals.atr += account.effective_atr();
        totals.cre += account.cre_count as f64;
        match account.tier(cohort) {
            Some(tam_core::Tier::Tier1) => totals.tier1 += 1.0,
            Some(tam_core::Tier::Tier2) => totals.tier2 += 1.0,
            _ => {}
        }
        if let Some(q) = account.renewal_quarter(&calendar) {
            totals.quarter_renewals[q.index()] += 1.0;
        }
    }

    let n = normal_rep_count as f64;
    let v = config.capacity_variance();
    let rv = config.renewal_variance();

    Ok(CalibratedThresholds {
        cohort,
        normal_rep_count,
        totals,
        arr: Band::around(totals.arr / n, v),
        atr: Band::around(totals.atr / n, v),
        cre: Band::around(totals.cre / n, v),
        tier1: Band::around(totals.tier1 / n, v),
        tier2: Band::around(totals.tier2 / n, v),
        quarters: [
            Band::around(totals.quarter_renewals[0] / n, rv),
            Band::around(totals.quarter_renewals[1] / n, rv),
            Band::around(totals.quarter_renewals[2] / n, rv),
            Band::around(totals.quarter_renewals[3] / n, rv),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tam_core::{AccountId, Region, RepId};

    fn rep(id: &str, region: Option<Region>, strategic: bool) -> SalesRep {
        SalesRep {
            rep_id: RepId::new(id),
            name: format!("Rep {id}"),
            region,
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

    #[test]
    fn test_no_eligible_reps() {
        let reps = vec![rep("r1", None, false), rep("r2", Some(Region::West), true)];
        let mut warnings = Vec::new();
        let result = calibrate(
            &[],
            &reps,
            &Configuration::default(),
            Cohort::Customer,
            &mut warnings,
        );
        assert!(matches!(result, Err(TamError::NoEligibleReps)));
    }

    #[test]
    fn test_divisor_excludes_strategic_and_regionless() {
        // 100 accounts totalling 50 CREs, 50 normal reps, 3 without regions,
        // 2 strategic.
        let mut reps: Vec<SalesRep> = (0..50)
            .map(|i| rep(&format!("r{i}"), Some(Region::West), false))
            .collect();
        for i in 0..3 {
            reps.push(rep(&format!("nr{i}"), None, false));
        }
        for i in 0..2 {
            reps.push(rep(&format!("s{i}"), Some(Region::West), true));
        }
        let accounts: Vec<Account> = (0..100)
            .map(|i| account(&format!("a{i}"), 10_000.0, if i < 50 { 1 } else { 0 }))
            .collect();
        let pool: Vec<&Account> = accounts.iter().collect();

        let mut warnings = Vec::new();
        let thresholds = calibrate(
            &pool,
            &reps,
            &Configuration::default(),
            Cohort::Customer,
            &mut warnings,
        )
        .unwrap();

        assert_eq!(thresholds.normal_rep_count, 50);
        assert!((thresholds.cre.target - 1.0).abs() < 1e-6);
        let excluded: Vec<&Warning> = warnings
            .iter()
            .filter(|w| w.code == WarningCode::ExcludedFromThresholdCalc)
            .collect();
        assert_eq!(excluded.len(), 1);
        assert!(excluded[0].message.contains("5 rep(s)"));
    }

    #[test]
    fn test_band_floor_ceil_edges() {
        let band = Band::around(100.0, 0.15);
        assert_eq!(band.min, 85.0);
        assert_eq!(band.max, 115.0);
        let odd = Band::around(33.3, 0.15);
        assert_eq!(odd.min, (33.3f64 * 0.85).floor());
        assert_eq!(odd.max, (33.3f64 * 1.15).ceil());
    }

    #[test]
    fn test_effective_arr_chain_feeds_totals() {
        let reps = vec![rep("r1", Some(Region::West), false)];
        let mut a = account("a1", 100.0, 0);
        a.calculated_arr = 250.0; // takes priority over raw arr
        let mut warnings = Vec::new();
        let thresholds = calibrate(
            &[&a],
            &reps,
            &Configuration::default(),
            Cohort::Customer,
            &mut warnings,
        )
        .unwrap();
        assert!((thresholds.totals.arr - 250.0).abs() < 1e-6);
    }

    #[test]
    fn test_renewal_bands_use_concentration_variance() {
        let reps = vec![rep("r1", Some(Region::West), false)];
        let mut a = account("a1", 100.0, 0);
        a.renewal_date = chrono::NaiveDate::from_ymd_opt(2025, 3, 15); // fiscal Q1
        let config = Configuration {
            capacity_variance_percent: 10.0,
            renewal_concentration_max: 50.0,
            ..Configuration::default()
        };
        let mut warnings = Vec::new();
        let thresholds =
            calibrate(&[&a], &reps, &config, Cohort::Customer, &mut warnings).unwrap();
        assert!((thresholds.quarters[0].target - 1.0).abs() < 1e-6);
        assert_eq!(thresholds.quarters[0].max, (1.0_f64 * 1.5).ceil());
        assert_eq!(thresholds.arr.max, (100.0_f64 * 1.1).ceil());
    }
}
