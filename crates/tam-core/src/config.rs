//! Run configuration
//!
//! All knobs the engine recognizes. Explicit `customer_*_arr` /
//! `prospect_*_arr` values override the calibrated ARR band; every other
//! dimension always uses the calibrated bands.

use crate::cancel::RunLimits;
use crate::fiscal::FiscalCalendar;
use crate::{TamError, TamResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hard upper bound on persistence write batches, rows per request.
pub const MAX_WRITE_BATCH: usize = 500;

/// Batch-model solver knobs.
///
/// `max_time_seconds` and `mip_gap` express the per-pass solve budget; a
/// non-optimal outcome (timeout, infeasible, backend error) makes the pass
/// fall back to its greedy scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum solve time per pass (seconds)
    pub max_time_seconds: f64,
    /// Relative optimality gap tolerance
    pub mip_gap: f64,
    /// Whether the backend should presolve
    pub presolve: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_time_seconds: 10.0,
            mip_gap: 0.05, // 5% gap
            presolve: true,
        }
    }
}

/// Engine configuration. Deserializable from TOML/JSON; every field has a
/// default so partial config files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Explicit customer ARR band (per rep). Unset fields fall back to the
    /// calibrated band.
    pub customer_target_arr: Option<f64>,
    pub customer_min_arr: Option<f64>,
    pub customer_max_arr: Option<f64>,
    /// Absolute ARR ceiling per customer-cohort rep. Defaults to
    /// 1.25 × preferred max when unset.
    pub customer_hard_cap_arr: Option<f64>,

    /// Prospect ARR band (soft; prospect balance is count-driven).
    pub prospect_target_arr: Option<f64>,
    pub prospect_min_arr: Option<f64>,
    pub prospect_max_arr: Option<f64>,

    /// Width of the ±band around calibrated targets, in percent.
    pub capacity_variance_percent: f64,
    /// Variance percent for the quarterly renewal bands.
    pub renewal_concentration_max: f64,

    /// Hard cap on CRE-flagged accounts per rep.
    pub max_cre_per_rep: u32,
    /// Soft caps; exceeding them only warns.
    pub max_tier1_per_rep: u32,
    pub max_tier2_per_rep: u32,

    /// Exact-match territory string → region string table, consulted before
    /// the built-in auto-map.
    pub territory_mappings: BTreeMap<String, String>,

    /// First month of the fiscal year (1..=12).
    pub fiscal_year_start_month: u32,

    pub solver: SolverConfig,
    pub limits: RunLimits,

    /// Rows per persistence write request (clamped to [`MAX_WRITE_BATCH`]).
    pub write_batch_size: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            customer_target_arr: None,
            customer_min_arr: None,
            customer_max_arr: None,
            customer_hard_cap_arr: None,
            prospect_target_arr: None,
            prospect_min_arr: None,
            prospect_max_arr: None,
            capacity_variance_percent: 15.0,
            renewal_concentration_max: 35.0,
            max_cre_per_rep: 3,
            max_tier1_per_rep: 10,
            max_tier2_per_rep: 15,
            territory_mappings: BTreeMap::new(),
            fiscal_year_start_month: 2,
            solver: SolverConfig::default(),
            limits: RunLimits::default(),
            write_batch_size: MAX_WRITE_BATCH,
        }
    }
}

impl Configuration {
    /// Validate ranges and build the fiscal calendar.
    pub fn fiscal_calendar(&self) -> TamResult<FiscalCalendar> {
        FiscalCalendar::new(self.fiscal_year_start_month)
    }

    /// Fractional variance for the cohort capacity band.
    pub fn capacity_variance(&self) -> f64 {
        self.capacity_variance_percent / 100.0
    }

    /// Fractional variance for the quarterly renewal bands.
    pub fn renewal_variance(&self) -> f64 {
        self.renewal_concentration_max / 100.0
    }

    /// Effective write batch size, never above the contract ceiling.
    pub fn effective_write_batch(&self) -> usize {
        self.write_batch_size.clamp(1, MAX_WRITE_BATCH)
    }

    pub fn validate(&self) -> TamResult<()> {
        if self.capacity_variance_percent < 0.0 || self.capacity_variance_percent >= 100.0 {
            return Err(TamError::Config(format!(
                "capacity_variance_percent must be in [0, 100), got {}",
                self.capacity_variance_percent
            )));
        }
        if self.renewal_concentration_max < 0.0 {
            return Err(TamError::Config(
                "renewal_concentration_max must be non-negative".into(),
            ));
        }
        self.fiscal_calendar()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Configuration::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.fiscal_year_start_month, 2);
        assert_eq!(cfg.effective_write_batch(), MAX_WRITE_BATCH);
    }

    #[test]
    fn test_batch_size_clamped_to_contract() {
        let cfg = Configuration {
            write_batch_size: 10_000,
            ..Configuration::default()
        };
        assert_eq!(cfg.effective_write_batch(), MAX_WRITE_BATCH);
    }

    #[test]
    fn test_variance_out_of_range_rejected() {
        let cfg = Configuration {
            capacity_variance_percent: 100.0,
            ..Configuration::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let cfg: Configuration =
            serde_json::from_str(r#"{ "max_cre_per_rep": 5 }"#).unwrap();
        assert_eq!(cfg.max_cre_per_rep, 5);
        assert_eq!(cfg.max_tier1_per_rep, 10);
    }
}
