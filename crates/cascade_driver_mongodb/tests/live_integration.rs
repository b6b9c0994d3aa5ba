use std::time::Duration;

use cascade_core::{
    ComparisonOperator, DataSource, DataSourceOptions, DbError, QueryBuilder, SchemaOperation,
    Value,
};
use cascade_driver_mongodb::MongoDriver;
use cascade_test_support::containers;

async fn connect_mongodb(uri: String) -> Result<DataSource, DbError> {
    let options = DataSourceOptions {
        name: "live-mongodb".to_string(),
        uri,
        is_default: true,
        pool_size: 5,
        connect_timeout: Some(Duration::from_secs(10)),
        default_delete_strategy: Default::default(),
        default_trash_table: None,
        model_defaults: Default::default(),
    };
    let driver = MongoDriver::new(&options).await?;
    let source = DataSource::from_options(&options, std::sync::Arc::new(driver));
    source.connect().await?;
    Ok(source)
}

async fn insert_row(
    source: &DataSource,
    collection: &str,
    row: Vec<(String, Value)>,
) -> Result<u64, DbError> {
    let compiled = source
        .driver()
        .query_parser()
        .parse_insert(collection, std::slice::from_ref(&row))?;
    let connection = source.connection().await?;
    let result = connection.execute(&compiled).await?;
    Ok(result.affected_rows)
}

fn run_async<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Runtime::new()
        .expect("failed to start tokio runtime for live integration test")
        .block_on(fut)
}

#[test]
#[ignore = "requires Docker daemon"]
fn mongodb_connect_ping_and_introspect() -> Result<(), DbError> {
    containers::with_mongodb_url(|uri| {
        run_async(async {
            let source = containers::retry_db_operation(Duration::from_secs(30), || {
                run_async(connect_mongodb(uri.clone()))
            })?;
            assert!(source.driver().is_connected());

            source
                .driver()
                .migration_driver()
                .apply(&[SchemaOperation::CreateTable {
                    table: "accounts".to_string(),
                    columns: Vec::new(),
                }])
                .await?;

            assert!(source.driver().blueprint().has_table("accounts").await?);
            let tables = source.driver().blueprint().tables().await?;
            assert!(tables.iter().any(|n| n == "accounts"));

            source.disconnect().await?;
            Ok(())
        })
    })
}

#[test]
#[ignore = "requires Docker daemon"]
fn mongodb_crud_round_trip() -> Result<(), DbError> {
    containers::with_mongodb_url(|uri| {
        run_async(async {
            let source = containers::retry_db_operation(Duration::from_secs(30), || {
                run_async(connect_mongodb(uri.clone()))
            })?;

            insert_row(
                &source,
                "accounts",
                vec![
                    ("handle".to_string(), Value::Text("ada".to_string())),
                    ("balance".to_string(), Value::Int(100)),
                ],
            )
            .await?;
            insert_row(
                &source,
                "accounts",
                vec![
                    ("handle".to_string(), Value::Text("grace".to_string())),
                    ("balance".to_string(), Value::Int(250)),
                ],
            )
            .await?;

            let count = QueryBuilder::new("accounts").count(&source).await?;
            assert_eq!(count, 2);

            let ada = QueryBuilder::new("accounts")
                .where_("handle", ComparisonOperator::Eq, Value::Text("ada".to_string()))
                .first(&source)
                .await?;
            assert!(ada.is_some());

            let updated = QueryBuilder::new("accounts")
                .where_("handle", ComparisonOperator::Eq, Value::Text("ada".to_string()))
                .update(&source, vec![("balance".to_string(), Value::Int(500))])
                .await?;
            assert_eq!(updated, 1);

            let deleted = QueryBuilder::new("accounts")
                .where_("handle", ComparisonOperator::Eq, Value::Text("grace".to_string()))
                .delete(&source)
                .await?;
            assert_eq!(deleted, 1);

            let remaining = QueryBuilder::new("accounts").count(&source).await?;
            assert_eq!(remaining, 1);

            source.disconnect().await?;
            Ok(())
        })
    })
}

#[test]
#[ignore = "requires Docker daemon"]
fn mongodb_transaction_rolls_back_on_error() -> Result<(), DbError> {
    containers::with_mongodb_url(|uri| {
        run_async(async {
            let source = containers::retry_db_operation(Duration::from_secs(30), || {
                run_async(connect_mongodb(uri.clone()))
            })?;

            insert_row(
                &source,
                "accounts",
                vec![
                    ("handle".to_string(), Value::Text("ada".to_string())),
                    ("balance".to_string(), Value::Int(100)),
                ],
            )
            .await?;

            let outcome: Result<(), DbError> = source
                .transaction(|| async {
                    insert_row(
                        &source,
                        "accounts",
                        vec![
                            ("handle".to_string(), Value::Text("rolled-back".to_string())),
                            ("balance".to_string(), Value::Int(1)),
                        ],
                    )
                    .await?;
                    Err(DbError::NotSupported("force rollback".to_string()))
                })
                .await;
            assert!(outcome.is_err());

            let count = QueryBuilder::new("accounts").count(&source).await?;
            assert_eq!(count, 1, "rolled-back transaction must not leave a row behind");

            source.disconnect().await?;
            Ok(())
        })
    })
}
