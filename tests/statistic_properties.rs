mod common;

use std::sync::Arc;

use common::{group, site, source, uniform_reads};
use diffsite::genomics::DefaultFormat;
use diffsite::statistics::DirichletStatistic;
use diffsite::{
    build_statistic, AlphaInitKind, CallConfig, ParallelPileup, Pileup, SiteCaller,
    StatisticCalculator, StatisticKind, Strand,
};
use proptest::prelude::*;
use test_case::test_case;

fn dirmult(threshold: f64) -> DirichletStatistic {
    let config = CallConfig::default().with_threshold(threshold);
    build_statistic(&config, StatisticKind::DirMult, AlphaInitKind::Mean)
}

fn replicate_strategy() -> impl Strategy<Value = Pileup> {
    proptest::collection::vec((0usize..4, 0u8..45), 0..20).prop_map(|observations| {
        Pileup::from_observations("chr1", 42, Strand::Unknown, 4, &observations)
    })
}

fn site_strategy() -> impl Strategy<Value = ParallelPileup> {
    (
        proptest::collection::vec(replicate_strategy(), 1..4),
        proptest::collection::vec(replicate_strategy(), 1..4),
    )
        .prop_map(|(a, b)| site(a, b))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn statistic_is_never_negative(site in site_strategy()) {
        let value = dirmult(0.0).statistic(&site);
        prop_assert!(value >= 0.0);
        prop_assert!(!value.is_nan());
    }

    #[test]
    fn swapping_groups_keeps_the_value(site in site_strategy()) {
        let statistic = dirmult(0.0);
        let forward = statistic.statistic(&site);
        let backward = statistic.statistic(&site.swap());
        prop_assert!((forward - backward).abs() <= 1e-9 * forward.abs().max(1.0));
    }

    #[test]
    fn estimated_error_statistic_is_never_negative(site in site_strategy(), error in 0.0f64..0.2) {
        let config = CallConfig::default();
        let statistic = build_statistic(&config, StatisticKind::DirMultEstimatedError(error), AlphaInitKind::Combined);
        prop_assert!(statistic.statistic(&site) >= 0.0);
    }
}

#[test_case(1.999, 2.0 => true ; "just below threshold")]
#[test_case(2.0, 2.0 => false ; "exactly at threshold")]
#[test_case(2.001, 2.0 => false ; "above threshold")]
#[test_case(0.0, 0.0 => false ; "zero threshold keeps zero")]
fn filter_boundary(value: f64, threshold: f64) -> bool {
    dirmult(threshold).filter(value)
}

fn caller(config: &CallConfig, a: Vec<Vec<diffsite::AlignmentRecord>>, b: Vec<Vec<diffsite::AlignmentRecord>>) -> SiteCaller {
    let statistic = build_statistic(config, StatisticKind::DirMult, AlphaInitKind::Mean);
    SiteCaller::new(
        config,
        a.into_iter().map(source).collect(),
        b.into_iter().map(source).collect(),
        Box::new(statistic),
        Arc::new(DefaultFormat),
    )
    .expect("caller builds")
}

#[test]
fn identical_groups_score_zero_end_to_end() {
    let config = CallConfig::default()
        .with_window_size(10)
        .with_min_coverage(1)
        .with_variants_only(false);
    let reads = || {
        let mut records = Vec::new();
        for _ in 0..2 {
            records.push(common::record(0, "10M", b"ACGTACGTAC", 30));
        }
        records
    };
    let mut caller = caller(&config, vec![reads()], vec![reads()]);

    let contig: Arc<str> = Arc::from("chr1");
    let (calls, _) = caller.call_window(&contig, 0, 10).unwrap();
    assert_eq!(calls.len(), 10);
    for call in &calls {
        assert!(call.score.value.abs() < 1e-9, "position {}: {}", call.site.position(), call.score.value);
        assert_eq!(call.site.pileups_a()[0].coverage(), 2);
    }
}

#[test]
fn opposite_bases_score_far_above_threshold() {
    let config = CallConfig::default().with_window_size(10).with_threshold(2.0);
    let a = (0..5).map(|_| uniform_reads("chr1", 0, 10, b'A', 10)).collect();
    let b = (0..5).map(|_| uniform_reads("chr1", 0, 10, b'G', 10)).collect();
    let mut caller = caller(&config, a, b);

    let contig: Arc<str> = Arc::from("chr1");
    let (calls, report) = caller.call_window(&contig, 0, 10).unwrap();
    assert_eq!(report.sites_evaluated, 10);
    for call in &calls {
        assert!(call.score.value > 2.0, "position {}: {}", call.site.position(), call.score.value);
        assert!(call.passed);
    }
}

#[test_case(StatisticKind::DirMult, AlphaInitKind::Mean)]
#[test_case(StatisticKind::DirMult, AlphaInitKind::Moments)]
#[test_case(StatisticKind::DirMult, AlphaInitKind::Combined)]
#[test_case(StatisticKind::DirMultEstimatedError(0.01), AlphaInitKind::Mean)]
#[test_case(StatisticKind::DirMultEstimatedError(0.05), AlphaInitKind::Combined)]
fn every_estimator_separates_groups(kind: StatisticKind, init: AlphaInitKind) {
    let statistic = build_statistic(&CallConfig::default(), kind, init);
    let differing = statistic.statistic(&site(group(0, 5, 10), group(2, 5, 10)));
    let identical = statistic.statistic(&site(group(1, 3, 10), group(1, 3, 10)));
    assert!(differing > 2.0, "{}: {differing}", statistic.name());
    assert_eq!(identical, 0.0);
}

#[test]
fn comparison_exposes_fits() {
    let comparison = dirmult(0.0).evaluate(&site(group(0, 5, 10), group(2, 5, 10)));
    assert!(comparison.alpha_a.alpha[0] > comparison.alpha_a.alpha[2]);
    assert!(comparison.alpha_b.alpha[2] > comparison.alpha_b.alpha[0]);
    assert_eq!(
        comparison.value,
        ((comparison.self_a + comparison.self_b) - (comparison.cross_a + comparison.cross_b)).max(0.0)
    );
}
