use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use rust_sqlite_records::{
    create_engine, create_table, create_table_from_records, delete_all_records, delete_records,
    delete_records_by_values, get_table, insert_records, missing_primary_key, record,
    records_equal, select_record_by_primary_key, select_records_all, select_records_chunks,
    select_records_slice, update_matching_records, CreateTableOptions, Engine, IfExists, Record,
    SqlType, Value,
};

fn xy_records() -> Vec<Record> {
    vec![
        record! { "id" => 1, "x" => 1, "y" => 2 },
        record! { "id" => 2, "x" => 2, "y" => 4 },
        record! { "id" => 3, "x" => 4, "y" => 8 },
        record! { "id" => 4, "x" => 8, "y" => 11 },
    ]
}

// Helper function to create an in-memory engine holding the xy table
fn create_test_db() -> Result<Engine> {
    let engine = create_engine("sqlite://")?;
    create_table(
        "xy",
        &[("id", SqlType::Integer), ("x", SqlType::Integer), ("y", SqlType::Integer)],
        &["id"],
        &engine,
        None,
        false,
        IfExists::Error,
    )?;
    insert_records("xy", &xy_records(), &engine)?;
    Ok(engine)
}

fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect()
}

#[test]
fn test_xy_scenario() -> Result<()> {
    let engine = create_test_db()?;

    // Delete id 1
    delete_records("xy", "id", &[1.into()], &engine)?;
    assert_eq!(ids(&select_records_all("xy", &engine, None)?), vec![2, 3, 4]);

    // Update y of id 2, matching on id
    update_matching_records("xy", &[record! { "id" => 2, "y" => 99 }], &["id"], &engine)?;
    let rows = select_records_all("xy", &engine, None)?;
    assert!(records_equal(
        &rows,
        &[
            record! { "id" => 2, "x" => 2, "y" => 99 },
            record! { "id" => 3, "x" => 4, "y" => 8 },
            record! { "id" => 4, "x" => 8, "y" => 11 },
        ]
    ));

    // Slice is ordered by primary key
    let slice = select_records_slice("xy", Some(1), Some(3), &engine, None)?;
    assert_eq!(ids(&slice), vec![3, 4]);
    Ok(())
}

#[test]
fn test_slice_on_full_table() -> Result<()> {
    let engine = create_test_db()?;
    let slice = select_records_slice("xy", Some(1), Some(3), &engine, None)?;
    assert_eq!(ids(&slice), vec![2, 3]);
    Ok(())
}

#[test]
fn test_chunks_of_two() -> Result<()> {
    let engine = create_test_db()?;
    let mut chunks = select_records_chunks("xy", &engine, 2, None)?;
    assert_eq!(ids(&chunks.next().expect("first batch")?), vec![1, 2]);
    assert_eq!(ids(&chunks.next().expect("second batch")?), vec![3, 4]);
    assert!(chunks.next().is_none());
    Ok(())
}

#[test]
fn test_insert_select_roundtrip() -> Result<()> {
    let engine = create_test_db()?;
    let rows = select_records_all("xy", &engine, None)?;
    assert!(records_equal(&rows, &xy_records()));
    Ok(())
}

#[test]
fn test_roundtrip_every_value_kind() -> Result<()> {
    let engine = create_engine("sqlite://")?;
    let day = NaiveDate::from_ymd_opt(2024, 5, 17).expect("valid date");
    let records = vec![
        record! {
            "id" => 1,
            "name" => "a",
            "active" => true,
            "born" => day,
            "seen" => day.and_hms_opt(12, 30, 0).expect("valid time"),
            "alarm" => NaiveTime::from_hms_micro_opt(9, 15, 30, 250_000).expect("valid time"),
            "wait" => TimeDelta::milliseconds(1_500),
            "score" => 1.5,
            "amount" => Value::Decimal("1.50".into()),
            "raw" => vec![0u8, 1, 255],
            "tags" => vec![serde_json::json!("x"), serde_json::json!(1)],
            "meta" => serde_json::json!({ "k": [1, 2], "ok": true }),
            "note" => None::<String>,
        },
        record! {
            "id" => 2,
            "name" => "b",
            "active" => false,
            "born" => day,
            "seen" => day.and_hms_opt(0, 0, 0).expect("valid time"),
            "alarm" => NaiveTime::from_hms_opt(23, 59, 59).expect("valid time"),
            "wait" => TimeDelta::zero(),
            "score" => 2,
            "amount" => Value::Decimal("12345678901234567890.12".into()),
            "raw" => Vec::<u8>::new(),
            "tags" => Vec::<serde_json::Value>::new(),
            "meta" => serde_json::json!({}),
            "note" => "present",
        },
    ];
    let table = create_table_from_records(
        "people",
        &records,
        &["id"],
        &engine,
        &CreateTableOptions::default(),
    )?;
    let column_type = |name: &str| table.column(name).map(|c| c.sql_type.clone());
    assert_eq!(column_type("active"), Some(SqlType::Boolean));
    assert_eq!(column_type("born"), Some(SqlType::Date));
    assert_eq!(column_type("alarm"), Some(SqlType::Time));
    assert_eq!(column_type("wait"), Some(SqlType::Interval));
    assert_eq!(column_type("score"), Some(SqlType::Float));
    assert_eq!(column_type("amount"), Some(SqlType::Numeric));
    assert_eq!(column_type("raw"), Some(SqlType::Blob));
    assert_eq!(column_type("tags"), Some(SqlType::Array));
    assert_eq!(column_type("meta"), Some(SqlType::Json));

    let rows = select_records_all("people", &engine, None)?;
    assert!(records_equal(&rows, &records));

    // Decimals keep trailing zeros and digits beyond f64 precision
    let amounts: Vec<Value> = rows.iter().filter_map(|r| r.get("amount").cloned()).collect();
    assert_eq!(
        amounts,
        vec![
            Value::Decimal("1.50".into()),
            Value::Decimal("12345678901234567890.12".into()),
        ]
    );
    Ok(())
}

#[test]
fn test_missing_primary_key() -> Result<()> {
    let engine = create_test_db()?;
    create_table("bare", &[("v", SqlType::Text)], &[], &engine, None, false, IfExists::Error)?;
    assert!(!missing_primary_key(&get_table("xy", &engine, None)?));
    assert!(missing_primary_key(&get_table("bare", &engine, None)?));
    Ok(())
}

#[test]
fn test_select_by_primary_key() -> Result<()> {
    let engine = create_test_db()?;
    let found = select_record_by_primary_key("xy", &record! { "id" => 3 }, &engine, None)?;
    assert_eq!(found, Some(record! { "id" => 3, "x" => 4, "y" => 8 }));
    let missing = select_record_by_primary_key("xy", &record! { "id" => 42 }, &engine, None)?;
    assert_eq!(missing, None);
    Ok(())
}

#[test]
fn test_empty_match_record_deletes_nothing() -> Result<()> {
    let engine = create_test_db()?;
    delete_records_by_values("xy", &[Record::new()], &engine)?;
    assert_eq!(select_records_all("xy", &engine, None)?.len(), 4);
    Ok(())
}

#[test]
fn test_delete_all_is_idempotent() -> Result<()> {
    let engine = create_test_db()?;
    delete_all_records("xy", &engine)?;
    assert!(select_records_all("xy", &engine, None)?.is_empty());
    delete_all_records("xy", &engine)?;
    assert!(select_records_all("xy", &engine, None)?.is_empty());
    Ok(())
}

#[test]
fn test_failed_insert_applies_nothing() -> Result<()> {
    let engine = create_test_db()?;
    let batch = vec![record! { "id" => 5, "x" => 0, "y" => 0 }, record! { "id" => 1, "x" => 0, "y" => 0 }];
    let err = insert_records("xy", &batch, &engine).unwrap_err();
    assert!(err.as_sqlite().is_some());
    assert_eq!(select_records_all("xy", &engine, None)?.len(), 4);
    Ok(())
}
