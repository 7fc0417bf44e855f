mod common;

use common::{assert_close, text_row, urban_sales_rows};
use insightstream::{
    analytics::{BubbleChart, FORECAST_HORIZON, forecast, pareto, price_quantity_bubbles},
    filter::{FilterState, Selection, apply_filters},
    projection::project_rows,
    schema::SchemaMapping,
};

fn product_rows() -> Vec<insightstream::projection::CanonicalRow> {
    let mapping = SchemaMapping {
        category: Some("Category".into()),
        price: Some("Price".into()),
        qty: Some("Qty".into()),
        margin: Some("Margin".into()),
        ..SchemaMapping::default()
    };
    let raw = vec![
        text_row(&[
            ("PRODUCT ID", "P1"),
            ("Category", "Tea"),
            ("Price", "10"),
            ("Qty", "4"),
            ("Margin", "50"),
        ]),
        text_row(&[
            ("PRODUCT ID", "P1"),
            ("Category", "Tea"),
            ("Price", "10"),
            ("Qty", "6"),
            ("Margin", "50"),
        ]),
        text_row(&[
            ("PRODUCT ID", "P2"),
            ("Category", "Coffee"),
            ("Price", "20"),
            ("Qty", "3"),
            ("Margin", "25"),
        ]),
        text_row(&[
            ("PRODUCT ID", "P3"),
            ("Category", "Coffee"),
            ("Price", "30"),
            ("Qty", "1"),
            ("Margin", "-10"),
        ]),
    ];
    project_rows(&raw, &mapping, &[])
}

#[test]
fn bubbles_aggregate_per_product() {
    let chart = price_quantity_bubbles(&product_rows());
    let BubbleChart::Correlation { data } = chart else {
        panic!("expected a correlation chart");
    };
    assert_eq!(data.len(), 3);
    assert_eq!(data[0].label, "P1");
    assert_eq!(data[0].category, "Tea");
    assert_close(data[0].x, 10.0);
    assert_close(data[0].y, 10.0);
    assert_close(data[0].z, 50.0);
    assert_close(data[1].z, 15.0);
    // Negative profit is floored for the bubble size.
    assert_eq!(data[2].z, 0.0);
}

#[test]
fn single_product_falls_back_to_category_counts() {
    let rows = urban_sales_rows();
    let chart = price_quantity_bubbles(&rows);
    let BubbleChart::Fallback { data } = chart else {
        panic!("expected the fallback chart");
    };
    assert_eq!(data[0].label, "Coffee");
    assert_eq!(data[0].value, 5.0);
    assert_eq!(data.len(), 5);
}

#[test]
fn flat_prices_fall_back() {
    let mapping = SchemaMapping {
        price: Some("Price".into()),
        qty: Some("Qty".into()),
        ..SchemaMapping::default()
    };
    let raw: Vec<_> = ["A", "B", "C"]
        .into_iter()
        .map(|id| text_row(&[("Product", id), ("Price", "12"), ("Qty", "2")]))
        .collect();
    let rows = project_rows(&raw, &mapping, &[]);
    assert!(price_quantity_bubbles(&rows).is_fallback());
}

#[test]
fn forecast_projects_six_months_from_full_year() {
    let rows = urban_sales_rows();
    let points = forecast(&rows);
    assert_eq!(points.len(), 12 + FORECAST_HORIZON);
    assert_eq!(points[0].label, "Jan");
    assert_close(points[0].actual.unwrap_or_default(), 13375.0);
    assert_eq!(points[0].forecast, None);
    // December anchors the forecast line.
    assert_eq!(points[11].forecast, Some(7182.0));
    assert_eq!(points[12].label, "Jan+");
    assert_eq!(points[12].actual, None);
    let first = 41726.0 / 6.0;
    assert_close(points[12].forecast.unwrap_or_default(), first);
    let second = (1980.0 + 4928.0 + 6076.0 + 7560.0 + 7182.0 + first) / 6.0;
    assert_close(points[13].forecast.unwrap_or_default(), second);
    assert_eq!(points[17].label, "Jun+");
}

#[test]
fn short_history_returns_actuals_only() {
    let rows = urban_sales_rows();
    let filters = FilterState {
        months: Selection::only([1, 2, 3]),
        ..FilterState::default()
    };
    let points = forecast(&apply_filters(&rows, &filters));
    assert_eq!(points.len(), 12);
    assert!(points.iter().all(|p| p.forecast.is_none()));
    assert_eq!(points[1].actual, Some(3000.0));
    assert_eq!(points[5].actual, None);
}

#[test]
fn forecast_uses_latest_year_only() {
    let mapping = SchemaMapping {
        date: Some("Date".into()),
        profit: Some("Profit".into()),
        ..SchemaMapping::default()
    };
    let raw = vec![
        text_row(&[("Date", "2022-03-01"), ("Profit", "500")]),
        text_row(&[("Date", "2023-03-01"), ("Profit", "7")]),
    ];
    let points = forecast(&project_rows(&raw, &mapping, &[]));
    assert_eq!(points[2].actual, Some(7.0));
}

#[test]
fn pareto_accumulates_to_one_hundred() {
    let rows = urban_sales_rows();
    let points = pareto(&rows);
    assert_eq!(points.len(), 5);
    assert_eq!(points[0].label, "Coffee");
    assert_close(points[0].cumulative_percent, 104450.0 / 237550.0 * 100.0);
    assert_close(points[4].cumulative_percent, 100.0);
    assert!(
        points
            .windows(2)
            .all(|pair| pair[0].cumulative_percent <= pair[1].cumulative_percent)
    );
}

#[test]
fn pareto_with_zero_revenue_is_all_zero() {
    let mapping = SchemaMapping {
        category: Some("Category".into()),
        ..SchemaMapping::default()
    };
    let raw = vec![
        text_row(&[("Category", "Tea")]),
        text_row(&[("Category", "Coffee")]),
    ];
    let points = pareto(&project_rows(&raw, &mapping, &[]));
    assert_eq!(points.len(), 2);
    assert!(points.iter().all(|p| p.cumulative_percent == 0.0));
}
