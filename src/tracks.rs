//! Track name normalization.
//!
//! Loggers, agents and config files spell tracks differently ("Road
//! America", "road_america", "VIR", "Virginia International Raceway").
//! Every track reference is reduced to one canonical key before it is
//! compared or stored.
//!
//! Normalization is idempotent: `normalize_track(normalize_track(x)) ==
//! normalize_track(x)`.

use regex::Regex;
use std::sync::OnceLock;

/// Affinity wildcard: the agent accepts every track.
pub const WILDCARD: &str = "*";

/// Canonical key used when a sample carries no track at all.
pub const UNKNOWN_TRACK: &str = "unknown";

/// Known aliases → canonical key. Aliases are listed in slug form.
const ALIASES: &[(&str, &str)] = &[
    ("barber_motorsports_park", "barber"),
    ("barber_motorsports", "barber"),
    ("circuit_of_the_americas", "cota"),
    ("circuit_americas", "cota"),
    ("austin", "cota"),
    ("indianapolis_motor_speedway", "indianapolis"),
    ("indy", "indianapolis"),
    ("ims", "indianapolis"),
    ("roadamerica", "road_america"),
    ("elkhart_lake", "road_america"),
    ("sebring_international_raceway", "sebring"),
    ("sebring_international", "sebring"),
    ("sonoma_raceway", "sonoma"),
    ("sears_point", "sonoma"),
    ("virginia", "vir"),
    ("virginia_international_raceway", "vir"),
    ("virginia_international", "vir"),
];

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9*]+").expect("separator pattern is valid"))
}

/// Lowercase, collapse every run of non-alphanumerics to `_`, trim
/// underscores.
fn slugify(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    separator_re()
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}

/// Reduce any spelling of a track to its canonical key.
///
/// Unknown tracks keep their slug so that new venues work without a
/// code change; the wildcard is preserved as-is.
pub fn normalize_track(raw: &str) -> String {
    let slug = slugify(raw);
    if slug.is_empty() {
        return UNKNOWN_TRACK.to_string();
    }
    if slug.contains('*') {
        return WILDCARD.to_string();
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == slug)
        .map_or(slug, |(_, canonical)| (*canonical).to_string())
}

/// True when `track` is the wildcard.
pub fn is_wildcard(track: &str) -> bool {
    track == WILDCARD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virginia_aliases_share_one_key() {
        let keys: Vec<String> = ["Virginia", "virginia", "VIR", "Virginia International Raceway"]
            .iter()
            .map(|s| normalize_track(s))
            .collect();
        assert!(keys.iter().all(|k| k == "vir"), "{keys:?}");
    }

    #[test]
    fn road_america_spellings_share_one_key() {
        assert_eq!(normalize_track("Road America"), "road_america");
        assert_eq!(normalize_track("road_america"), "road_america");
        assert_eq!(normalize_track("  ROAD-AMERICA "), "road_america");
        assert_eq!(normalize_track("RoadAmerica"), "road_america");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "Virginia", "VIR", "Road America", "COTA", "Circuit of the Americas",
            "sebring", "Sebring International Raceway", "Barber", "indy", "Sonoma Raceway",
            "Laguna Seca", "", "*", " Mid-Ohio ",
        ];
        for input in inputs {
            let once = normalize_track(input);
            assert_eq!(normalize_track(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn canonical_keys_are_fixed_points() {
        for (_, canonical) in ALIASES {
            assert_eq!(normalize_track(canonical), *canonical);
        }
    }

    #[test]
    fn unknown_tracks_keep_their_slug() {
        assert_eq!(normalize_track("Laguna Seca"), "laguna_seca");
        assert_eq!(normalize_track("   "), UNKNOWN_TRACK);
    }

    #[test]
    fn wildcard_survives() {
        assert!(is_wildcard(&normalize_track("*")));
        assert!(is_wildcard(&normalize_track(" * ")));
    }
}
