use insightstream::{
    data::{RawRow, Value},
    expr::{
        CalculatedField, ExprError, Expression, evaluate, parse_calculated_fields,
        validate_expression,
    },
};

fn row(pairs: &[(&str, Value)]) -> RawRow {
    pairs.iter().cloned().collect()
}

#[test]
fn adds_string_and_number_columns() {
    let values = row(&[("A", Value::text("10")), ("B", Value::Number(5.0))]);
    assert_eq!(evaluate("[A]+[B]", &values), 15.0);
}

#[test]
fn columns_are_normalized_before_arithmetic() {
    let values = row(&[
        ("Revenue", Value::text("₺1.234,50")),
        ("Cost", Value::text("234,50")),
    ]);
    assert!((evaluate("[Revenue] - [Cost]", &values) - 1000.0).abs() < 1e-9);
}

#[test]
fn unsafe_input_evaluates_to_zero() {
    let empty = RawRow::new();
    assert_eq!(evaluate("DROP TABLE", &empty), 0.0);
    assert_eq!(evaluate("alert(1)", &empty), 0.0);
    assert_eq!(evaluate("[A] +", &empty), 0.0);
    assert_eq!(evaluate("", &empty), 0.0);
}

#[test]
fn division_by_zero_is_zero() {
    let values = row(&[("A", Value::Number(10.0)), ("B", Value::Number(0.0))]);
    assert_eq!(evaluate("[A]/[B]", &values), 0.0);
    let parsed = Expression::parse("[A]/[B]").unwrap();
    assert!(matches!(parsed.eval(&values), Err(ExprError::NonFinite)));
}

#[test]
fn missing_columns_contribute_zero() {
    let values = row(&[("A", Value::Number(3.0))]);
    assert_eq!(evaluate("[A] * 2 + [Missing]", &values), 6.0);
}

#[test]
fn validation_reports_unknown_columns_and_syntax() {
    let columns = vec!["Revenue".to_string(), "Cost".to_string()];
    assert!(validate_expression("([Revenue] - [Cost]) / [Revenue]", &columns).is_ok());
    assert!(matches!(
        validate_expression("[Revenue] - [Tax]", &columns),
        Err(ExprError::UnknownColumn(name)) if name == "Tax"
    ));
    assert!(validate_expression("[Revenue] ** 2", &columns).is_err());
    assert!(validate_expression("[Revenue", &columns).is_err());
}

#[test]
fn expression_lists_columns_in_first_use_order() {
    let parsed = Expression::parse("[B] * [A] + [B]").unwrap();
    assert_eq!(parsed.columns(), vec!["B", "A"]);
    assert_eq!(parsed.source(), "[B] * [A] + [B]");
}

#[test]
fn calculated_field_specs_parse() {
    let field = CalculatedField::parse("Net = [Revenue] - [Cost]").unwrap();
    assert_eq!(field.name, "Net");
    assert_eq!(field.expression, "[Revenue] - [Cost]");
    assert!(field.id.starts_with("calc_"));

    assert!(CalculatedField::parse("=[Revenue]").is_err());
    assert!(CalculatedField::parse("Net").is_err());
    assert!(CalculatedField::parse("Net=[Revenue] -").is_err());

    let specs = vec!["A=1".to_string(), "B=[A]*2".to_string()];
    let fields = parse_calculated_fields(&specs).unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[1].name, "B");
}
