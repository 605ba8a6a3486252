//! Territory → region resolution
//!
//! Accounts carry free-text territory strings ("Pac NW", "Austin-Houston");
//! reps carry canonical regions. Three fallbacks are tried in order:
//!
//! 1. The configured `territory_mappings` table (exact string match).
//! 2. The built-in auto-map: case-insensitive prefix-and-keyword lookup
//!    covering the standard North-American regions and EMEA sub-regions.
//! 3. Direct case-insensitive equality between the territory string and a
//!    rep region present in the roster.
//!
//! An account that fails all three has *unmapped geography*: it skips the
//! geography passes (P1/P2) and flows to P3/P4.

use std::collections::BTreeSet;
use tam_core::{Configuration, Region};

/// Keyword table for the built-in auto-map. Checked in order against the
/// lower-cased territory; the first hit wins, so more specific entries come
/// before broader ones (e.g. "middle east" before "east").
const AUTO_MAP: &[(&str, Region)] = &[
    // North America: West
    ("pac nw", Region::West),
    ("pacific northwest", Region::West),
    ("norcal", Region::West),
    ("socal", Region::West),
    ("bay area", Region::West),
    ("mountain", Region::West),
    ("west", Region::West),
    // North America: North East
    ("north east", Region::NorthEast),
    ("northeast", Region::NorthEast),
    ("new england", Region::NorthEast),
    ("new york", Region::NorthEast),
    ("tri-state", Region::NorthEast),
    ("boston", Region::NorthEast),
    // EMEA sub-regions before the North-American "east"/"south" keywords,
    // so "Middle East" never lands in South East.
    ("dach", Region::Dach),
    ("germany", Region::Dach),
    ("austria", Region::Dach),
    ("switzerland", Region::Dach),
    ("uki", Region::Uki),
    ("united kingdom", Region::Uki),
    ("ireland", Region::Uki),
    ("nordics", Region::Nordics),
    ("sweden", Region::Nordics),
    ("norway", Region::Nordics),
    ("denmark", Region::Nordics),
    ("finland", Region::Nordics),
    ("france", Region::France),
    ("benelux", Region::Benelux),
    ("netherlands", Region::Benelux),
    ("belgium", Region::Benelux),
    ("middle east", Region::MiddleEast),
    ("israel", Region::MiddleEast),
    ("emea", Region::RoEmea),
    // North America: South East
    ("south east", Region::SouthEast),
    ("southeast", Region::SouthEast),
    ("atlanta", Region::SouthEast),
    ("florida", Region::SouthEast),
    ("carolina", Region::SouthEast),
    // North America: Central
    ("central", Region::Central),
    ("midwest", Region::Central),
    ("texas", Region::Central),
    ("austin", Region::Central),
    ("houston", Region::Central),
    ("dallas", Region::Central),
    ("chicago", Region::Central),
];

/// Built-in auto-map lookup: prefix or keyword containment, case-insensitive.
pub fn auto_map(territory: &str) -> Option<Region> {
    let lower = territory.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    AUTO_MAP
        .iter()
        .find(|(key, _)| lower.starts_with(key) || lower.contains(key))
        .map(|(_, region)| region.clone())
}

/// Resolve an account territory to a region, trying the configured mapping
/// table, then the auto-map, then direct equality against `rep_regions`.
pub fn resolve_region(
    territory: Option<&str>,
    config: &Configuration,
    rep_regions: &BTreeSet<Region>,
) -> Option<Region> {
    let territory = territory?.trim();
    if territory.is_empty() {
        return None;
    }
    if let Some(mapped) = config.territory_mappings.get(territory) {
        return Some(Region::parse(mapped));
    }
    if let Some(region) = auto_map(territory) {
        return Some(region);
    }
    let direct = Region::parse(territory);
    if rep_regions.contains(&direct) {
        return Some(direct);
    }
    None
}

/// The set of regions present in a rep roster, for the direct-equality
/// fallback.
pub fn roster_regions(reps: &[tam_core::SalesRep]) -> BTreeSet<Region> {
    reps.iter().filter_map(|r| r.region.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(list: &[Region]) -> BTreeSet<Region> {
        list.iter().cloned().collect()
    }

    #[test]
    fn test_auto_map_keywords() {
        assert_eq!(auto_map("Pac NW"), Some(Region::West));
        assert_eq!(auto_map("Austin-Houston"), Some(Region::Central));
        assert_eq!(auto_map("Greater Boston"), Some(Region::NorthEast));
        assert_eq!(auto_map("Middle East"), Some(Region::MiddleEast));
        assert_eq!(auto_map("Sweden & Norway"), Some(Region::Nordics));
        assert_eq!(auto_map("Ruritania"), None);
    }

    #[test]
    fn test_configured_mapping_wins_over_auto_map() {
        let mut config = Configuration::default();
        config
            .territory_mappings
            .insert("Pac NW".into(), "Central".into());
        let resolved = resolve_region(Some("Pac NW"), &config, &regions(&[]));
        assert_eq!(resolved, Some(Region::Central));
    }

    #[test]
    fn test_direct_equality_fallback() {
        let config = Configuration::default();
        let roster = regions(&[Region::Other("iberia".into())]);
        assert_eq!(
            resolve_region(Some("Iberia"), &config, &roster),
            Some(Region::Other("iberia".into()))
        );
        // not in the roster: unmapped
        assert_eq!(resolve_region(Some("Oceania"), &config, &roster), None);
    }

    #[test]
    fn test_missing_or_blank_territory_is_unmapped() {
        let config = Configuration::default();
        assert_eq!(resolve_region(None, &config, &regions(&[])), None);
        assert_eq!(resolve_region(Some("  "), &config, &regions(&[])), None);
    }
}
