use anyhow::Result;
use futures::TryStreamExt;
use rust_sqlite_records::{record, AsyncEngine, AsyncRecords, Error, IfExists, Record, SqlType, Value};
use tempfile::NamedTempFile;

// Helper function to create an async engine with the xy table on a temporary file
async fn create_temp_db() -> Result<(AsyncEngine, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let engine = AsyncEngine::connect(&format!("sqlite:///{}", temp_file.path().display())).await?;
    engine
        .create_table(
            "xy",
            vec![
                ("id".to_string(), SqlType::Integer),
                ("x".to_string(), SqlType::Integer),
                ("y".to_string(), SqlType::Integer),
            ],
            vec!["id".to_string()],
            false,
            IfExists::Error,
        )
        .await?;
    Ok((engine, temp_file))
}

fn xy_records() -> Vec<Record> {
    vec![
        record! { "id" => 1, "x" => 1, "y" => 2 },
        record! { "id" => 2, "x" => 2, "y" => 4 },
        record! { "id" => 3, "x" => 4, "y" => 8 },
        record! { "id" => 4, "x" => 8, "y" => 11 },
    ]
}

#[tokio::test]
async fn test_engine_crud() -> Result<()> {
    let (engine, _temp_file) = create_temp_db().await?;
    engine.insert_records("xy", xy_records()).await?;

    assert_eq!(engine.delete_records("xy", "id", vec![Value::from(1)]).await?, 1);
    let updated = engine
        .update_matching_records("xy", vec![record! { "id" => 2, "y" => 99 }], vec!["id".to_string()])
        .await?;
    assert_eq!(updated, 1);
    assert_eq!(
        engine.select_record_by_primary_key("xy", record! { "id" => 2 }).await?,
        Some(record! { "id" => 2, "x" => 2, "y" => 99 })
    );

    assert_eq!(engine.set_column_values("xy", "x", Value::from(0)).await?, 3);
    assert_eq!(engine.delete_all_records("xy").await?, 3);
    assert!(engine.select_records_all("xy").await?.is_empty());

    engine.drop_table("xy", false).await?;
    Ok(())
}

#[tokio::test]
async fn test_chunk_stream() -> Result<()> {
    let (engine, _temp_file) = create_temp_db().await?;
    engine.insert_records("xy", xy_records()).await?;

    let batches: Vec<Vec<Record>> = engine.select_records_chunks("xy", 3).try_collect().await?;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 3);
    assert_eq!(batches[1], vec![record! { "id" => 4, "x" => 8, "y" => 11 }]);

    let exact: Vec<Vec<Record>> = engine.select_records_chunks("xy", 2).try_collect().await?;
    assert_eq!(exact.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_session_commit_and_rollback() -> Result<()> {
    let (engine, _temp_file) = create_temp_db().await?;

    // Uncommitted writes are invisible to the engine
    let session = engine.session().await?;
    session.insert_records("xy", xy_records()).await?;
    assert_eq!(session.select_records_all("xy").await?.len(), 4);
    assert!(engine.select_records_all("xy").await?.is_empty());
    session.commit().await?;
    assert_eq!(engine.select_records_all("xy").await?.len(), 4);

    // A finished session cannot be reused
    assert!(matches!(session.commit().await, Err(Error::InvalidReference(_))));
    assert!(matches!(
        session.select_records_all("xy").await,
        Err(Error::InvalidReference(_))
    ));

    let session = engine.session().await?;
    session.delete_all_records("xy").await?;
    session.rollback().await?;
    assert_eq!(engine.select_records_all("xy").await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_failed_session_write_keeps_earlier_writes_pending() -> Result<()> {
    let (engine, _temp_file) = create_temp_db().await?;
    engine.insert_records("xy", xy_records()).await?;

    let session = engine.session().await?;
    session.insert_records("xy", vec![record! { "id" => 5, "x" => 0, "y" => 0 }]).await?;
    assert!(session
        .insert_records("xy", vec![record! { "id" => 1, "x" => 0, "y" => 0 }])
        .await
        .is_err());
    session.commit().await?;

    let ids: Vec<i64> = engine
        .select_records_all("xy")
        .await?
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    Ok(())
}
