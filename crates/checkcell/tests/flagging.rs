//! Integration tests for quantile ranking, outlier flagging and the review
//! session.

use std::collections::{BTreeMap, BTreeSet};

use checkcell::{
    Address, AnalysisConfig, Error, MemoryHost, PerturbationPolicy, QuantileTable, Session,
    Significance, WorkbookSnapshot, flag_sequence, flag_top_outlier,
};
use proptest::prelude::*;

fn a(text: &str) -> Address {
    Address::parse(text, "Sheet1").unwrap()
}

/// One input read by five formulas. B1..B4 sit on large offsets and barely
/// move; B5 has a baseline near zero and swings wildly.
fn outlier_workbook() -> WorkbookSnapshot {
    WorkbookSnapshot::new()
        .with_value(a("A1"), 10.0)
        .with_formula(a("B1"), "=A1+1000")
        .with_formula(a("B2"), "=A1+2000")
        .with_formula(a("B3"), "=A1+3000")
        .with_formula(a("B4"), "=A1+4000")
        .with_formula(a("B5"), "=A1*A1-99")
}

fn session(significance: f64) -> Session {
    Session::start(AnalysisConfig {
        rounds: 40,
        seed: Some(7),
        significance,
        policy: PerturbationPolicy::Deviation { scale: 0.5 },
        ..AnalysisConfig::default()
    })
    .unwrap()
}

#[test]
fn ranks_follow_sensitivity() {
    let mut host = MemoryHost::from_snapshot(&outlier_workbook());
    let mut session = session(0.95);
    let report = session.analyze(&mut host).unwrap();

    let order: Vec<String> = report
        .quantiles
        .descending()
        .map(|e| e.address.to_string())
        .collect();
    assert_eq!(
        order,
        ["Sheet1!B5", "Sheet1!B1", "Sheet1!B2", "Sheet1!B3", "Sheet1!B4"]
    );
    assert!((report.quantiles.rank_of(&a("B5")).unwrap() - 1.0).abs() < f64::EPSILON);
    assert!(report.quantiles.rank_of(&a("B4")).unwrap().abs() < f64::EPSILON);
}

#[test]
fn mark_good_walks_down_the_outliers() {
    let mut host = MemoryHost::from_snapshot(&outlier_workbook());
    let mut session = session(0.7);
    session.analyze(&mut host).unwrap();

    assert_eq!(session.flagged(), Some(&a("B5")));
    assert_eq!(session.mark_good(a("B5")).unwrap(), Some(a("B1")));
    assert_eq!(session.mark_good(a("B1")).unwrap(), None);
    assert_eq!(session.flagged(), None);
    assert_eq!(session.known_good().len(), 2);
}

#[test]
fn known_good_cells_survive_reanalysis() {
    let mut host = MemoryHost::from_snapshot(&outlier_workbook());
    let mut session = session(0.95);
    session.analyze(&mut host).unwrap();
    session.mark_good(a("B5")).unwrap();

    let report = session.analyze(&mut host).unwrap();
    assert_eq!(report.flagged, None);
    assert!(session.known_good().contains(&a("B5")));
}

#[test]
fn reset_forgets_confirmations() {
    let mut host = MemoryHost::from_snapshot(&outlier_workbook());
    let mut session = session(0.95);
    session.analyze(&mut host).unwrap();
    session.mark_good(a("B5")).unwrap();

    session.reset();
    assert!(session.known_good().is_empty());
    assert!(session.report().is_none());
    assert!(matches!(
        session.mark_good(a("B1")),
        Err(Error::NoActiveAnalysis)
    ));

    session.analyze(&mut host).unwrap();
    assert_eq!(session.flagged(), Some(&a("B5")));
}

#[test]
fn end_returns_the_last_report() {
    let mut host = MemoryHost::from_snapshot(&outlier_workbook());
    let mut session = session(0.95);
    session.analyze(&mut host).unwrap();

    let report = session.end().unwrap();
    assert_eq!(report.quantiles.len(), 5);
    assert_eq!(report.seed, 7);
}

fn scores() -> impl Strategy<Value = Vec<(Address, f64)>> {
    prop::collection::btree_map(1u32..60, 0u8..12, 0..20).prop_map(|cells| {
        cells
            .into_iter()
            .map(|(row, score)| (Address::new("Sheet1", 2, row), f64::from(score) / 4.0))
            .collect()
    })
}

proptest! {
    #[test]
    fn ranks_ignore_input_order(shuffled in scores().prop_shuffle(), significance in 0.01f64..0.99) {
        let mut sorted = shuffled.clone();
        sorted.sort_by(|x, y| x.0.cmp(&y.0));

        let left = QuantileTable::compute(shuffled);
        let right = QuantileTable::compute(sorted);
        prop_assert_eq!(&left, &right);

        let s = Significance::new(significance).unwrap();
        let none = BTreeSet::new();
        prop_assert_eq!(
            flag_top_outlier(&left, s, &none),
            flag_top_outlier(&right, s, &none)
        );
    }

    #[test]
    fn ranks_lie_in_unit_interval_and_follow_scores(cells in scores()) {
        let table = QuantileTable::compute(cells);
        for pair in table.entries().windows(2) {
            prop_assert!(pair[0].score <= pair[1].score);
            prop_assert!(pair[0].rank <= pair[1].rank);
            if pair[0].score == pair[1].score {
                prop_assert_eq!(pair[0].rank, pair[1].rank);
            }
        }
        prop_assert!(table.entries().iter().all(|e| (0.0..=1.0).contains(&e.rank)));
    }

    #[test]
    fn flag_sequence_visits_each_candidate_once(cells in scores(), significance in 0.01f64..0.99) {
        let table = QuantileTable::compute(cells);
        let s = Significance::new(significance).unwrap();
        let sequence = flag_sequence(&table, s, &BTreeSet::new());

        let unique: BTreeSet<&Address> = sequence.iter().collect();
        prop_assert_eq!(unique.len(), sequence.len());

        let ranks: BTreeMap<&Address, f64> =
            table.entries().iter().map(|e| (&e.address, e.rank)).collect();
        for address in &sequence {
            prop_assert!(ranks[address] > significance);
        }
        let expected = table.entries().iter().filter(|e| e.rank > significance).count();
        prop_assert_eq!(sequence.len(), expected);

        for pair in sequence.windows(2) {
            prop_assert!(ranks[&pair[0]] >= ranks[&pair[1]]);
        }
    }
}
