mod common;

use common::{URBAN_SALES_JSON, assert_close, fixture_dataset, urban_sales_rows};
use insightstream::{
    data::{RawRow, Value},
    expr::CalculatedField,
    projection::{CanonicalRow, DERIVED_KEYS, Projector, TxIdFallback, project_rows},
    schema::SchemaMapping,
};

fn raw(pairs: &[(&str, Value)]) -> RawRow {
    pairs.iter().cloned().collect()
}

#[test]
fn urban_sales_rows_derive_business_fields() {
    let rows = urban_sales_rows();
    assert_eq!(rows.len(), 14);

    let first = &rows[0];
    assert_eq!(first.unit_price, 85.0);
    assert_eq!(first.qty_sold, 200.0);
    assert_close(first.margin_rate, 0.35);
    assert_close(first.revenue, 17000.0);
    assert_close(first.profit, 5950.0);
    assert_eq!(first.tx_id, "TX001");
    assert_eq!(first.year, Some(2023));
    assert_eq!(first.month_index, Some(1));
    assert_eq!(first.month_label(), "January");
    assert_eq!(first.weekday_label(), "Thursday");
    assert_eq!(first.city, "Istanbul");
    assert_eq!(first.branch, "Besiktas");
    assert_eq!(first.category, "Coffee");
    assert_eq!(first.product_id, "UNK_PROD");
    assert_close(first.calculated_value("Gross").unwrap(), 17000.0);

    // Fractional margins are already rates.
    let tea = &rows[2];
    assert_close(tea.margin_rate, 0.45);
    assert_close(tea.profit, 6075.0);
}

#[test]
fn inferred_mapping_reads_profit_from_the_margin_column() {
    let dataset = fixture_dataset(URBAN_SALES_JSON);
    let rows = project_rows(&dataset.rows, &dataset.mapping, &[]);
    assert_eq!(rows[0].profit, 35.0);
    assert_close(rows[0].revenue, 17000.0);
}

#[test]
fn projection_keeps_raw_keys_and_is_repeatable() {
    let dataset = fixture_dataset(URBAN_SALES_JSON);
    let projector = Projector::new(dataset.mapping.clone());
    let once = projector.project_all(&dataset.rows);
    let twice = projector.project_all(&dataset.rows);
    assert_eq!(once, twice);

    let record = once[0].to_record();
    for (key, value) in dataset.rows[0].iter() {
        assert_eq!(record.value(key), value, "raw key {key} changed");
    }
    for key in DERIVED_KEYS {
        assert!(record.contains_key(key), "missing {key}");
    }
    let keys: Vec<&str> = record.keys().collect();
    assert_eq!(keys[0], "TRANSACTION ID");
    assert_eq!(keys[8], "REVENUE_final");
}

#[test]
fn unmapped_fields_use_defaults() {
    let rows = project_rows(&[raw(&[("Note", Value::text("x"))])], &SchemaMapping::default(), &[]);
    let row = &rows[0];
    assert_eq!(row.revenue, 0.0);
    assert_eq!(row.city, "Other");
    assert_eq!(row.branch, "General");
    assert_eq!(row.category, "Uncategorized");
    assert_eq!(row.tx_id, "TX_ROW_1");
    assert_eq!(row.year, None);
    assert_eq!(row.month_label(), "invalid");
    assert_eq!(row.weekday_label(), "invalid");
    assert_eq!(row.value("MONTH_index"), Value::Empty);
}

#[test]
fn row_ordinal_fallback_is_stable_and_random_is_not() {
    let mapping = SchemaMapping {
        tx_id: Some("Id".into()),
        ..SchemaMapping::default()
    };
    let rows = vec![
        raw(&[("Id", Value::Empty)]),
        raw(&[("Id", Value::text("A-7"))]),
        raw(&[("Id", Value::text(""))]),
    ];
    let stable = Projector::new(mapping.clone()).project_all(&rows);
    let ids: Vec<&str> = stable.iter().map(|r| r.tx_id.as_str()).collect();
    assert_eq!(ids, vec!["TX_ROW_1", "A-7", "TX_ROW_3"]);

    let random = Projector::new(mapping).with_tx_fallback(TxIdFallback::Random);
    let a = random.project(&rows[0], 1);
    let b = random.project(&rows[0], 1);
    assert!(a.tx_id.starts_with("TX_"));
    assert_ne!(a.tx_id, b.tx_id);
}

#[test]
fn mapped_revenue_still_computes_profit_from_price_and_quantity() {
    let mapping = SchemaMapping {
        revenue: Some("Sales".into()),
        price: Some("Price".into()),
        qty: Some("Qty".into()),
        margin: Some("Margin".into()),
        ..SchemaMapping::default()
    };
    let row = raw(&[
        ("Sales", Value::Number(1000.0)),
        ("Price", Value::Number(10.0)),
        ("Qty", Value::Number(20.0)),
        ("Margin", Value::text("50%")),
    ]);
    let projected = project_rows(&[row], &mapping, &[]);
    assert_eq!(projected[0].revenue, 1000.0);
    assert_close(projected[0].profit, 100.0);
}

#[test]
fn year_and_month_columns_back_up_missing_dates() {
    let mapping = SchemaMapping {
        date: Some("Date".into()),
        year: Some("Yil".into()),
        month: Some("Ay".into()),
        ..SchemaMapping::default()
    };
    let rows = vec![
        raw(&[
            ("Date", Value::text("not a date")),
            ("Yil", Value::text("2024 FY")),
            ("Ay", Value::text("Mart")),
        ]),
        raw(&[
            ("Date", Value::Number(44931.0)),
            ("Yil", Value::Empty),
            ("Ay", Value::Empty),
        ]),
    ];
    let projected = project_rows(&rows, &mapping, &[]);
    assert_eq!(projected[0].year, Some(2024));
    assert_eq!(projected[0].month_index, Some(3));
    assert_eq!(projected[0].weekday_index, None);
    assert_eq!(projected[1].year, Some(2023));
    assert_eq!(projected[1].month_index, Some(1));
    assert_eq!(projected[1].weekday_label(), "Thursday");
}

#[test]
fn calculated_fields_are_resolvable_by_name() {
    let fields = vec![
        CalculatedField::new("Double", "[Amount] * 2"),
        CalculatedField::new("Broken", "[Amount] +"),
    ];
    let rows = project_rows(
        &[raw(&[("Amount", Value::text("1.500,25"))])],
        &SchemaMapping::default(),
        &fields,
    );
    let row: &CanonicalRow = &rows[0];
    assert_close(row.calculated_value("Double").unwrap(), 3000.5);
    assert_eq!(row.value("Broken"), Value::Number(0.0));
    assert_eq!(row.value("Amount"), Value::text("1.500,25"));
    assert_eq!(row.value("Absent"), Value::Empty);
}
