//! Aligned summary tables for terminal output

use std::io::Write;
use tabwriter::TabWriter;
use tam_engine::{AssignmentOutput, CalibratedThresholds};

/// Render the run summary: counts, per-rep and per-region tables.
pub fn render_summary(output: &AssignmentOutput) -> anyhow::Result<String> {
    let mut tw = TabWriter::new(Vec::new());
    writeln!(
        tw,
        "build {}\tcohort {}\tproposals {}\twarnings {}",
        output.build_id,
        output.cohort.as_str(),
        output.proposals.len(),
        output.warnings.len()
    )?;
    writeln!(
        tw,
        "moved {}\tretained {}\tcascaded children {}\tcascaded opportunities {}",
        output.statistics.moved,
        output.statistics.retained,
        output.cascade.children.len(),
        output.cascade.opportunities.len()
    )?;
    writeln!(tw)?;

    writeln!(tw, "REP\tACCOUNTS\tARR\tCRE\tT1\tT2")?;
    for (rep, stat) in &output.statistics.per_rep {
        writeln!(
            tw,
            "{rep}\t{}\t{:.0}\t{}\t{}\t{}",
            stat.account_count, stat.arr, stat.cre, stat.tier1_count, stat.tier2_count
        )?;
    }
    writeln!(tw)?;

    writeln!(tw, "REGION\tACCOUNTS\tARR")?;
    for (region, stat) in &output.statistics.per_geo {
        writeln!(tw, "{region}\t{}\t{:.0}", stat.accounts, stat.arr)?;
    }

    let bytes = tw
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing summary table: {e:?}"))?;
    Ok(String::from_utf8(bytes)?)
}

/// Render calibrated threshold bands.
pub fn render_thresholds(thresholds: &CalibratedThresholds) -> anyhow::Result<String> {
    let mut tw = TabWriter::new(Vec::new());
    writeln!(
        tw,
        "cohort {}\tnormal reps {}\taccounts {}",
        thresholds.cohort.as_str(),
        thresholds.normal_rep_count,
        thresholds.totals.accounts
    )?;
    writeln!(tw)?;
    writeln!(tw, "DIMENSION\tTARGET\tMIN\tMAX")?;
    let rows = [
        ("ARR", thresholds.arr),
        ("ATR", thresholds.atr),
        ("CRE", thresholds.cre),
        ("Tier 1", thresholds.tier1),
        ("Tier 2", thresholds.tier2),
        ("Q1 renewals", thresholds.quarters[0]),
        ("Q2 renewals", thresholds.quarters[1]),
        ("Q3 renewals", thresholds.quarters[2]),
        ("Q4 renewals", thresholds.quarters[3]),
    ];
    for (name, band) in rows {
        writeln!(
            tw,
            "{name}\t{:.2}\t{:.0}\t{:.0}",
            band.target, band.min, band.max
        )?;
    }
    let bytes = tw
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing summary table: {e:?}"))?;
    Ok(String::from_utf8(bytes)?)
}
