mod common;

use common::{GENERIC_BI_CSV, fixture_dataset, urban_sales_rows};
use insightstream::{
    filter::{
        FilterDimension, FilterState, Selection, apply_filters, filter_options, parse_filter_args,
    },
    projection::project_rows,
};

#[test]
fn unfiltered_state_returns_every_row() {
    let rows = urban_sales_rows();
    let filtered = apply_filters(&rows, &FilterState::default());
    assert_eq!(filtered, rows);
}

#[test]
fn disjoint_selection_returns_nothing() {
    let rows = urban_sales_rows();
    let state = FilterState {
        years: Selection::only([1999]),
        ..FilterState::default()
    };
    assert!(apply_filters(&rows, &state).is_empty());
}

#[test]
fn built_in_dimensions_are_anded() {
    let rows = urban_sales_rows();
    let state = parse_filter_args(&[
        "city=Istanbul".to_string(),
        "category=Coffee,Tea".to_string(),
    ])
    .unwrap();
    let filtered = apply_filters(&rows, &state);
    let ids: Vec<&str> = filtered.iter().map(|r| r.tx_id.as_str()).collect();
    assert_eq!(ids, vec!["TX001", "TX004", "TX012"]);
}

#[test]
fn months_filter_by_index() {
    let rows = urban_sales_rows();
    let mut state = FilterState::default();
    state.toggle(FilterDimension::Months, "Jan").unwrap();
    assert_eq!(apply_filters(&rows, &state).len(), 3);
    state.toggle(FilterDimension::Months, "December").unwrap();
    assert_eq!(apply_filters(&rows, &state).len(), 4);
    state.clear(FilterDimension::Months);
    assert!(state.is_unfiltered());
    assert!(state.toggle(FilterDimension::Years, "twenty").is_err());
}

#[test]
fn generic_filters_match_display_text_of_any_column() {
    let dataset = fixture_dataset(GENERIC_BI_CSV);
    let rows = project_rows(&dataset.rows, &dataset.mapping, &[]);
    let mut state = FilterState::default();
    state.toggle_generic("Channel", "Online");
    assert_eq!(apply_filters(&rows, &state).len(), 3);
    state.toggle_generic("Visits", "22");
    assert!(apply_filters(&rows, &state).is_empty());
    state.toggle_generic("Visits", "22");
    assert!(!state.generic_filters.contains_key("Visits"));
    state.toggle_generic("Channel", "Online");
    assert!(state.is_unfiltered());
}

#[test]
fn options_list_years_descending_and_branches_of_selected_cities() {
    let rows = urban_sales_rows();
    let mut state = FilterState::default();
    let options = filter_options(&rows, &state);
    assert_eq!(options.years, vec![2023]);
    assert_eq!(options.months.len(), 12);
    assert_eq!(options.months[0].id, 1);
    assert_eq!(options.months[0].name, "January");
    assert_eq!(
        options.cities,
        vec!["Ankara", "Antalya", "Bursa", "Istanbul", "Izmir"]
    );
    assert_eq!(
        options.categories,
        vec!["Coffee", "Cold Drinks", "Desserts", "Snacks", "Tea"]
    );
    assert_eq!(options.branches.len(), 7);

    state.toggle(FilterDimension::Cities, "Ankara").unwrap();
    let options = filter_options(&rows, &state);
    assert_eq!(options.branches, vec!["Kizilay", "Merkez"]);
    assert_eq!(options.cities.len(), 5);
}

#[test]
fn filter_state_reads_from_yaml() {
    let state: FilterState = serde_yaml::from_str(
        "years: [2023]\nmonths: ALL\ncities: [Izmir]\ngenericFilters:\n  Channel: [Online]\n",
    )
    .unwrap();
    assert!(state.years.allows(&2023));
    assert!(state.months.is_all());
    assert_eq!(state.generic_filters.len(), 1);
}
