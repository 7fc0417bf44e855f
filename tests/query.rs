mod common;

use common::{assert_close, urban_sales_rows};
use insightstream::query::{QueryPlan, answer_query, execute_query_plan};

#[test]
fn top_n_plan_truncates_sorted_groups() {
    let rows = urban_sales_rows();
    let plan = QueryPlan::from_json(
        r#"{"intent":"topN","groupBy":"city","metric":"revenue","chart":"bar","titleTR":"En iyi şehirler","topN":2}"#,
    )
    .unwrap();
    let answer = answer_query(&rows, &plan);
    assert_eq!(answer.title, "En iyi şehirler");
    assert_eq!(answer.data.len(), 2);
    assert_eq!(answer.data[0].label, "Istanbul");
    assert_eq!(answer.data[1].label, "Ankara");
    assert!(answer.answer.contains("Istanbul"));
}

#[test]
fn plan_filters_match_substrings_case_insensitively() {
    let rows = urban_sales_rows();
    let plan = QueryPlan::from_json(
        r#"{"intent":"breakdown","groupBy":"branch","metric":"profit","filters":{"year":2023,"city":"istan"}}"#,
    )
    .unwrap();
    let points = execute_query_plan(&rows, &plan);
    let labels: Vec<&str> = points.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["Besiktas", "Kadikoy"]);
    assert_close(points[0].value, 5950.0 + 1350.0 + 2288.0 + 7560.0);
}

#[test]
fn unknown_names_fall_back_to_category_revenue() {
    let rows = urban_sales_rows();
    let plan = QueryPlan::from_json(r#"{"groupBy":"planet","metric":"happiness"}"#).unwrap();
    let points = execute_query_plan(&rows, &plan);
    assert_eq!(points[0].label, "Coffee");
    assert_close(points[0].value, 104450.0);
    assert_eq!(plan.title(), "REVENUE by category");
}

#[test]
fn unmatched_filters_yield_no_groups() {
    let rows = urban_sales_rows();
    let plan = QueryPlan::from_json(r#"{"groupBy":"city","filters":{"year":1990}}"#).unwrap();
    let answer = answer_query(&rows, &plan);
    assert!(answer.data.is_empty());
    assert_eq!(answer.answer, "No rows matched the query.");
}

#[test]
fn malformed_plan_is_an_error() {
    assert!(QueryPlan::from_json("{ not json").is_err());
}
