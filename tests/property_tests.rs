//! Property-based tests for chart construction and transition gating.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use proptest::prelude::*;
use statechart::{Chart, ChartError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

prop_compose! {
    fn state_names()(names in prop::collection::vec("[a-z][a-z0-9_]{0,7}", 0..12)) -> Vec<String> {
        names
    }
}

proptest! {
    #[test]
    fn state_count_tracks_distinct_names(names in state_names()) {
        let chart = Chart::new("chart").unwrap();
        for name in &names {
            chart.create_state(name.as_str()).unwrap();
        }

        let mut distinct: HashSet<&str> = names.iter().map(String::as_str).collect();
        distinct.insert("initial");
        distinct.insert("final");
        prop_assert_eq!(chart.state_count(), distinct.len());
        prop_assert!(chart.has_state("initial"));
        prop_assert!(chart.has_state("final"));
    }

    #[test]
    fn initial_and_final_survive_any_removals(names in state_names()) {
        let chart = Chart::new("chart").unwrap();
        for name in &names {
            chart.create_state(name.as_str()).unwrap();
        }
        for name in names.iter().map(String::as_str).chain(["initial", "final"]) {
            chart.remove_state(name);
        }

        prop_assert_eq!(chart.state_count(), 2);
        prop_assert!(chart.has_state("initial"));
        prop_assert!(chart.has_state("final"));
    }

    #[test]
    fn create_state_returns_the_same_handle(name in "[a-z]{1,8}", repeats in 1..5usize) {
        let chart = Chart::new("chart").unwrap();
        let first = chart.create_state(name.as_str()).unwrap();
        for _ in 0..repeats {
            prop_assert_eq!(&chart.create_state(name.as_str()).unwrap(), &first);
        }
        let expected = if name == "initial" || name == "final" { 2 } else { 3 };
        prop_assert_eq!(chart.state_count(), expected);
    }

    #[test]
    fn purge_removes_exactly_the_dangling_transitions(
        targets in prop::collection::vec(0..4usize, 1..16),
        removed in 0..4usize,
    ) {
        let chart = Chart::new("chart").unwrap();
        let source = chart.create_state("source").unwrap();
        let names = ["a", "b", "c", "d"];
        let states: Vec<_> = names
            .iter()
            .map(|name| chart.create_state(*name).unwrap())
            .collect();
        for &target in &targets {
            source.create_transition(&states[target]).unwrap();
        }

        prop_assert!(chart.remove_state(names[removed]));
        let dangling = targets.iter().filter(|&&t| t == removed).count();

        prop_assert_eq!(source.purge_expired_transitions(), dangling);
        prop_assert_eq!(source.transition_count(), targets.len() - dangling);
        prop_assert_eq!(source.purge_expired_transitions(), 0);
    }

    #[test]
    fn one_failing_guard_blocks_the_transition(guards in 1..6usize, failing in 0..6usize, spins in 1..20usize) {
        let failing = failing % guards;
        let chart = Chart::new("chart").unwrap();
        let transition = chart
            .initial_state()
            .create_transition(&chart.final_state())
            .unwrap();

        let open = Arc::new(AtomicBool::new(false));
        for i in 0..guards {
            if i == failing {
                let open = open.clone();
                transition.create_guard(move || open.load(Ordering::SeqCst));
            } else {
                transition.create_guard(|| true);
            }
        }

        for _ in 0..spins {
            chart.spin_once();
            prop_assert_eq!(chart.current_state_name(), "initial");
        }

        open.store(true, Ordering::SeqCst);
        chart.spin_once();
        prop_assert_eq!(chart.current_state_name(), "final");
    }

    #[test]
    fn empty_names_always_fail(name in "[a-z]{0,4}") {
        match Chart::new(name.as_str()) {
            Ok(chart) => {
                prop_assert!(!name.is_empty());
                prop_assert!(matches!(chart.create_state(""), Err(ChartError::EmptyStateName)));
            }
            Err(err) => {
                prop_assert!(name.is_empty());
                prop_assert!(matches!(err, ChartError::EmptyChartName));
            }
        }
    }
}
