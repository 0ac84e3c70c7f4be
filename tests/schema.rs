use anyhow::Result;
use rust_sqlite_records::config::{ColumnConstraint, ColumnDefinition, DefaultValue};
use rust_sqlite_records::{
    copy_table, create_table, drop_table, get_column_names, get_column_types, get_engine_table,
    get_row_count, get_schemas, get_table, get_table_names, insert_records, primary_key_names,
    record, select_records_all, table_exists, tables_metadata_equal, Engine, Error, IfExists,
    Schema, SqlType, SqliteConfig, Table, TableDefinition,
};
use tempfile::NamedTempFile;

// Helper function to create a file-backed engine that outlives a single connection
fn create_temp_db() -> Result<(Engine, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let url = format!("sqlite:///{}", temp_file.path().display());
    let engine = Engine::from_url(&url)?;
    Ok((engine, temp_file))
}

fn users_schema() -> Schema {
    Schema::new().add_table(
        TableDefinition::new("users")
            .add_column(
                ColumnDefinition::new("id", SqlType::Integer)
                    .with_constraint(ColumnConstraint::PrimaryKey)
                    .with_constraint(ColumnConstraint::Autoincrement),
            )
            .add_column(
                ColumnDefinition::new("name", SqlType::Text).with_constraint(ColumnConstraint::NotNull),
            )
            .add_column(
                ColumnDefinition::new("active", SqlType::Boolean)
                    .with_default(DefaultValue::Integer(1)),
            )
            .with_primary_key(&["id"]),
    )
}

#[test]
fn test_configured_schema_is_created() -> Result<()> {
    let engine = Engine::new(SqliteConfig::in_memory().with_schema(users_schema()))?;
    let users = get_table("users", &engine, None)?;
    assert_eq!(primary_key_names(&users), vec!["id"]);
    assert_eq!(get_column_names(&users), vec!["id", "name", "active"]);
    assert!(users.column("id").is_some_and(|c| c.autoincrement));

    // Defaults fill columns left out of the record
    insert_records("users", &[record! { "name" => "alice" }], &engine)?;
    assert_eq!(
        select_records_all("users", &engine, None)?,
        vec![record! { "id" => 1, "name" => "alice", "active" => true }]
    );
    Ok(())
}

#[test]
fn test_reflection_of_foreign_table() -> Result<()> {
    let engine = Engine::in_memory()?;
    let conn = engine.connect()?;
    conn.execute_batch(
        "CREATE TABLE legacy (code VARCHAR(8), part INT, weight DOUBLE, note, PRIMARY KEY (part, code))",
    )?;
    let legacy = get_table("legacy", &*conn, None)?;
    drop(conn);

    assert_eq!(primary_key_names(&legacy), vec!["part", "code"]);
    assert_eq!(
        get_column_types(&legacy),
        vec![
            ("code".to_string(), SqlType::Text),
            ("part".to_string(), SqlType::Integer),
            ("weight".to_string(), SqlType::Float),
            ("note".to_string(), SqlType::Any),
        ]
    );
    Ok(())
}

#[test]
fn test_missing_table_is_reported() -> Result<()> {
    let engine = Engine::in_memory()?;
    assert!(matches!(
        get_table("nope", &engine, None),
        Err(Error::NoSuchTable { .. })
    ));
    assert!(!table_exists("nope", &engine, None)?);
    drop_table("nope", &engine, true, None)?;
    assert!(drop_table("nope", &engine, false, None).is_err());
    Ok(())
}

#[test]
fn test_create_copy_drop() -> Result<()> {
    let engine = Engine::in_memory()?;
    create_table(
        "xy",
        &[("id", SqlType::Integer), ("x", SqlType::Integer)],
        &["id"],
        &engine,
        None,
        false,
        IfExists::Error,
    )?;
    insert_records("xy", &[record! { "id" => 1, "x" => 5 }], &engine)?;

    let copy = copy_table("xy_copy", "xy", &engine, IfExists::Error)?;
    assert!(!tables_metadata_equal(&copy, &get_table("xy", &engine, None)?));
    assert_eq!(get_row_count("xy_copy", &engine)?, 1);
    assert_eq!(get_table_names(&engine, None)?, vec!["xy", "xy_copy"]);

    // Replace starts from an empty table
    create_table(
        "xy_copy",
        &[("id", SqlType::Integer)],
        &["id"],
        &engine,
        None,
        false,
        IfExists::Replace,
    )?;
    assert_eq!(get_row_count("xy_copy", &engine)?, 0);

    // Creating over an existing table fails without Replace
    assert!(create_table(
        "xy",
        &[("id", SqlType::Integer)],
        &["id"],
        &engine,
        None,
        false,
        IfExists::Error,
    )
    .is_err());

    drop_table("xy_copy", &engine, false, None)?;
    assert_eq!(get_table_names(&engine, None)?, vec!["xy"]);
    assert!(get_schemas(&engine)?.contains(&"main".to_string()));
    Ok(())
}

#[test]
fn test_file_engine_and_table_open() -> Result<()> {
    let (engine, temp_file) = create_temp_db()?;
    create_table(
        "xy",
        &[("id", SqlType::Integer), ("x", SqlType::Integer)],
        &["id"],
        &engine,
        None,
        false,
        IfExists::Error,
    )?;
    insert_records("xy", &[record! { "id" => 1, "x" => 5 }, record! { "id" => 2, "x" => 6 }], &engine)?;

    // A second engine on the same file sees the committed rows
    let url = format!("sqlite:///{}", temp_file.path().display());
    let (other, xy) = get_engine_table(&url, "xy", None)?;
    assert_eq!(primary_key_names(&xy), vec!["id"]);
    assert_eq!(get_row_count(&xy, &other)?, 2);

    let table = Table::open(&url, "xy", None)?;
    assert_eq!(table.row_count()?, 2);
    assert!(Table::open(&url, "missing", None).is_err());
    Ok(())
}

#[test]
fn test_bad_urls_are_rejected() {
    assert!(matches!(
        Engine::from_url("postgres://localhost/db"),
        Err(Error::InvalidReference(_))
    ));
    assert!(matches!(
        Engine::from_url("sqlite://host/db"),
        Err(Error::InvalidReference(_))
    ));
}
