use chrono::TimeDelta;
use polars::prelude::*;
use reactorlog_core::{align, nearest_matches, AlignError, MergePolicy};

/// Small deterministic generator so the sweeps below are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: i64) -> i64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) % bound as u64) as i64
    }
}

fn brute_force(ts: i64, right: &[i64], tolerance: i64) -> Option<i64> {
    right
        .iter()
        .map(|&r| ((r - ts).abs(), r))
        .filter(|&(distance, _)| distance <= tolerance)
        .min_by_key(|&(distance, r)| (distance, r))
        .map(|(_, r)| r)
}

#[test]
fn matches_agree_with_a_brute_force_search() {
    let mut rng = Lcg(7);
    for round in 0..200 {
        let mut left: Vec<i64> = (0..rng.next(20)).map(|_| rng.next(1_000)).collect();
        let mut right: Vec<i64> = (0..rng.next(20)).map(|_| rng.next(1_000)).collect();
        left.sort_unstable();
        right.sort_unstable();
        let tolerance = rng.next(120);

        let matches = nearest_matches(&left, &right, tolerance);
        assert_eq!(matches.len(), left.len(), "round {round}");

        for (ts, found) in left.iter().zip(&matches) {
            let matched = found.map(|idx| right[idx]);
            assert_eq!(matched, brute_force(*ts, &right, tolerance), "round {round}, ts {ts}");
            if let Some(value) = matched {
                assert!((value - ts).abs() <= tolerance);
            }
        }
    }
}

fn datetime_series(name: &str, minutes: &[i64]) -> Series {
    let micros: Vec<i64> = minutes.iter().map(|m| m * 60_000_000).collect();
    Series::new(name.into(), micros)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .expect("datetime")
}

#[test]
fn unsorted_inputs_are_sorted_before_matching() {
    let left = DataFrame::new(vec![
        datetime_series("Date", &[30, 0, 10]).into(),
        Series::new("temp".into(), vec![3.0, 1.0, 2.0]).into(),
    ])
    .expect("left");
    let right = DataFrame::new(vec![
        datetime_series("Date", &[31, 9]).into(),
        Series::new("nh3".into(), vec![0.3, 0.1]).into(),
    ])
    .expect("right");

    let aligned = align(
        &left,
        "Date",
        &right,
        "Date",
        TimeDelta::minutes(5),
        &MergePolicy::default(),
    )
    .expect("align");

    let temp: Vec<Option<f64>> = aligned
        .df()
        .column("temp")
        .expect("temp")
        .f64()
        .expect("f64")
        .into_iter()
        .collect();
    assert_eq!(temp, vec![Some(1.0), Some(2.0), Some(3.0)]);
    assert_eq!(aligned.matches(), &[None, Some(1), Some(0)]);

    let nh3: Vec<Option<f64>> = aligned
        .df()
        .column("nh3")
        .expect("nh3")
        .f64()
        .expect("f64")
        .into_iter()
        .collect();
    assert_eq!(nh3, vec![None, Some(0.1), Some(0.3)]);
    assert_eq!(aligned.df().get_column_names_str(), vec!["Date", "temp", "nh3"]);
}

#[test]
fn equidistant_rows_match_the_earlier_right_row() {
    let left = DataFrame::new(vec![
        datetime_series("Date", &[10]).into(),
        Series::new("temp".into(), vec![300.0]).into(),
    ])
    .expect("left");
    let right = DataFrame::new(vec![
        datetime_series("Date", &[8, 12]).into(),
        Series::new("nh3".into(), vec![0.8, 1.2]).into(),
    ])
    .expect("right");

    let aligned = align(
        &left,
        "Date",
        &right,
        "Date",
        TimeDelta::minutes(5),
        &MergePolicy::default(),
    )
    .expect("align");
    assert_eq!(aligned.matches(), &[Some(0)]);
    let nh3: Vec<Option<f64>> = aligned
        .df()
        .column("nh3")
        .expect("nh3")
        .f64()
        .expect("f64")
        .into_iter()
        .collect();
    assert_eq!(nh3, vec![Some(0.8)]);
}

#[test]
fn empty_left_gives_an_empty_table_with_all_columns() {
    let left = DataFrame::new(vec![
        datetime_series("Date", &[]).into(),
        Series::new("temp".into(), Vec::<f64>::new()).into(),
    ])
    .expect("left");
    let right = DataFrame::new(vec![
        datetime_series("Date", &[1]).into(),
        Series::new("nh3".into(), vec![0.5]).into(),
    ])
    .expect("right");

    let aligned = align(
        &left,
        "Date",
        &right,
        "Date",
        TimeDelta::minutes(5),
        &MergePolicy::default(),
    )
    .expect("align");
    assert!(aligned.is_empty());
    assert_eq!(aligned.df().width(), 3);
}

#[test]
fn missing_timestamp_column_is_reported() {
    let left = DataFrame::new(vec![Series::new("temp".into(), vec![1.0]).into()]).expect("left");
    let right = DataFrame::new(vec![datetime_series("Date", &[1]).into()]).expect("right");

    let err = align(
        &left,
        "Date",
        &right,
        "Date",
        TimeDelta::minutes(5),
        &MergePolicy::default(),
    )
    .expect_err("must fail");
    assert!(matches!(err, AlignError::MissingTimestamp { .. }));
}

#[test]
fn negative_tolerance_is_rejected() {
    let frame = DataFrame::new(vec![datetime_series("Date", &[1]).into()]).expect("frame");
    let err = align(
        &frame,
        "Date",
        &frame,
        "Date",
        TimeDelta::minutes(-1),
        &MergePolicy::default(),
    )
    .expect_err("must fail");
    assert!(matches!(err, AlignError::InvalidTolerance(_)));
}
