//! Property tests for the recurrence expansion engine.

use almanac_core::calendar::add_days;
use almanac_core::{expand, normalize, RepeatFrequency, Series, WeekSelector};
use chrono::NaiveDate;
use proptest::prelude::*;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..1100).prop_map(|offset| add_days(epoch(), offset))
}

fn arb_frequency() -> impl Strategy<Value = RepeatFrequency> {
    prop_oneof![
        Just(RepeatFrequency::None),
        Just(RepeatFrequency::Daily),
        Just(RepeatFrequency::Monthly),
        Just(RepeatFrequency::Quarterly),
        Just(RepeatFrequency::Other("yearly".into())),
    ]
}

fn arb_weeks() -> impl Strategy<Value = Vec<WeekSelector>> {
    prop::collection::btree_set(1u8..=4, 0..3)
        .prop_map(|weeks| weeks.into_iter().filter_map(WeekSelector::new).collect())
}

fn arb_series() -> impl Strategy<Value = Series> {
    (
        arb_date(),
        arb_frequency(),
        arb_weeks(),
        prop::collection::vec(arb_date(), 0..6),
        prop::option::of(arb_date()),
    )
        .prop_map(|(start, frequency, weeks, exclusions, end_date)| {
            let mut series = Series::new("Property", start).with_repeat(frequency, weeks);
            series.id = "ts-prop".into();
            series.exclusions = exclusions;
            series.end_date = end_date;
            series
        })
}

/// A range and a sub-range inside it
fn arb_nested_ranges() -> impl Strategy<Value = ((NaiveDate, NaiveDate), (NaiveDate, NaiveDate))> {
    (0i64..1100, 0i64..200, 0i64..200, 0i64..200).prop_map(|(start, len, lead, inner)| {
        let outer_start = add_days(epoch(), start);
        let outer_end = add_days(outer_start, len);
        let inner_start = add_days(outer_start, lead.min(len));
        let inner_end = add_days(inner_start, inner.min(len - lead.min(len)));
        ((outer_start, outer_end), (inner_start, inner_end))
    })
}

proptest! {
    #[test]
    fn prop_expansion_is_deterministic(series in arb_series(), ((start, end), _) in arb_nested_ranges()) {
        prop_assert_eq!(expand(&series, start, end), expand(&series, start, end));
    }

    #[test]
    fn prop_dates_ascending_and_in_range(series in arb_series(), ((start, end), _) in arb_nested_ranges()) {
        let occurrences = expand(&series, start, end);
        prop_assert!(occurrences.windows(2).all(|w| w[0].date < w[1].date));
        prop_assert!(occurrences.iter().all(|o| o.date >= start && o.date <= end));
    }

    #[test]
    fn prop_sub_range_is_restriction(series in arb_series(), ((start, end), (inner_start, inner_end)) in arb_nested_ranges()) {
        let restricted: Vec<_> = expand(&series, start, end)
            .into_iter()
            .filter(|o| o.date >= inner_start && o.date <= inner_end)
            .collect();
        prop_assert_eq!(expand(&series, inner_start, inner_end), restricted);
    }

    #[test]
    fn prop_exclusions_only_remove(series in arb_series(), ((start, end), _) in arb_nested_ranges()) {
        let mut unrestricted = series.clone();
        unrestricted.exclusions.clear();

        let expected: Vec<_> = expand(&unrestricted, start, end)
            .into_iter()
            .filter(|o| !series.exclusions.contains(&o.date))
            .collect();
        prop_assert_eq!(expand(&series, start, end), expected);
    }

    #[test]
    fn prop_nothing_after_end_date(series in arb_series(), ((start, end), _) in arb_nested_ranges()) {
        if let Some(end_date) = series.end_date {
            prop_assert!(expand(&series, start, end).iter().all(|o| o.date <= end_date));
        }
    }

    #[test]
    fn prop_nothing_before_start_date(series in arb_series(), ((start, end), _) in arb_nested_ranges()) {
        prop_assert!(expand(&series, start, end).iter().all(|o| o.date >= series.start_date));
    }

    #[test]
    fn prop_creation_date_always_present(series in arb_series(), lead in 0i64..60, tail in 0i64..60) {
        let start = add_days(series.start_date, -lead);
        let end = add_days(series.start_date, tail);
        let ended_before = series.end_date.map_or(false, |e| e < series.start_date);
        let excluded = series.exclusions.contains(&series.start_date);

        let has_start = expand(&series, start, end)
            .iter()
            .any(|o| o.date == series.start_date);
        prop_assert_eq!(has_start, !ended_before && !excluded);
    }

    #[test]
    fn prop_occurrences_match_rule(series in arb_series(), ((start, end), _) in arb_nested_ranges()) {
        let rule = normalize(&series);
        for occurrence in expand(&series, start, end) {
            prop_assert!(rule.matches(occurrence.date));
            prop_assert_eq!(occurrence.series_id.as_str(), "ts-prop");
        }
    }
}
