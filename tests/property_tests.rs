//! Property-based tests using proptest
//!
//! Flag and search-path invariants that must hold for any input, checked
//! both on the value types and through a live detector.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use test_fixtures::TrackingLibrary;

use magic_detect::{Detector, Flags, SearchPath};

/// Strategy for arbitrary flag masks, sign bit included
fn flags_strategy() -> impl Strategy<Value = Flags> {
    any::<i32>().prop_map(Flags::from_bits)
}

/// Strategy for a single database location; `:` cannot appear in one
fn path_entry_strategy() -> impl Strategy<Value = String> {
    "/[a-zA-Z0-9_./-]{1,40}"
}

fn detector() -> Detector {
    Detector::new(Arc::new(TrackingLibrary::new(Duration::ZERO))).unwrap()
}

proptest! {
    /// Display output parses back to the same mask
    #[test]
    fn flags_display_round_trip(flags in flags_strategy()) {
        let rendered = flags.to_string();
        let parsed: Flags = rendered.parse().unwrap();
        prop_assert_eq!(parsed, flags, "rendered as {}", rendered);
    }

    /// Flags read back exactly as set
    #[test]
    fn set_flags_then_flags(flags in flags_strategy()) {
        let detector = detector();
        prop_assert_eq!(detector.set_flags(flags).unwrap(), flags);
        prop_assert_eq!(detector.flags().unwrap(), flags);
    }

    /// Joining then parsing a path list is lossless
    #[test]
    fn search_path_join_parse_round_trip(entries in prop::collection::vec(path_entry_strategy(), 0..6)) {
        let path = SearchPath::new(entries.clone());
        prop_assert_eq!(SearchPath::parse(&path.join()).into_vec(), entries);
    }

    /// Whatever was loaded is what path() reports
    #[test]
    fn load_then_path(entries in prop::collection::vec(path_entry_strategy(), 1..6)) {
        // MAGIC forces path() back to the engine default
        if std::env::var_os("MAGIC").is_some() {
            return Ok(());
        }

        let detector = detector();
        let loaded = detector.load(&entries).unwrap();
        prop_assert_eq!(loaded.as_slice(), entries.as_slice());
        prop_assert_eq!(detector.path().unwrap().into_vec(), entries);
    }
}
