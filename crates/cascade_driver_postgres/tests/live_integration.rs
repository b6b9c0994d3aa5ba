use std::time::Duration;

use cascade_core::{
    ColumnDefinition, ColumnType, ComparisonOperator, DataSource, DataSourceOptions, DbError,
    QueryBuilder, SchemaOperation, SortDirection, Value,
};
use cascade_driver_postgres::PostgresDriver;
use cascade_test_support::containers;

async fn connect_postgres(uri: String) -> Result<DataSource, DbError> {
    let options = DataSourceOptions {
        name: "live-postgres".to_string(),
        uri,
        is_default: true,
        pool_size: 5,
        connect_timeout: Some(Duration::from_secs(10)),
        default_delete_strategy: Default::default(),
        default_trash_table: None,
        model_defaults: Default::default(),
    };
    let driver = PostgresDriver::new(&options)?;
    let source = DataSource::from_options(&options, std::sync::Arc::new(driver));
    source.connect().await?;
    Ok(source)
}

async fn seed_accounts_table(source: &DataSource) -> Result<(), DbError> {
    let columns = vec![
        ColumnDefinition::new("id", ColumnType::Id).primary_key().auto_increment(),
        ColumnDefinition::new("handle", ColumnType::String(64)).unique(),
        ColumnDefinition::new("balance", ColumnType::Integer),
        ColumnDefinition::new("nickname", ColumnType::String(64)).nullable(),
    ];
    source
        .driver()
        .migration_driver()
        .apply(&[SchemaOperation::CreateTable {
            table: "accounts".to_string(),
            columns,
        }])
        .await
}

async fn insert_row(
    source: &DataSource,
    table: &str,
    row: Vec<(String, Value)>,
) -> Result<u64, DbError> {
    let compiled = source
        .driver()
        .query_parser()
        .parse_insert(table, std::slice::from_ref(&row))?;
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
fn postgres_connect_ping_and_migrate() -> Result<(), DbError> {
    containers::with_postgres_url(|uri| {
        run_async(async {
            let source = containers::retry_db_operation(Duration::from_secs(30), || {
                run_async(connect_postgres(uri.clone()))
            })?;
            assert!(source.driver().is_connected());

            seed_accounts_table(&source).await?;
            assert!(source.driver().blueprint().has_table("accounts").await?);

            let table = source.driver().blueprint().table("accounts").await?;
            assert_eq!(table.name, "accounts");
            assert!(!table.columns.is_empty());

            source.disconnect().await?;
            Ok(())
        })
    })
}

#[test]
#[ignore = "requires Docker daemon"]
fn postgres_crud_round_trip() -> Result<(), DbError> {
    containers::with_postgres_url(|uri| {
        run_async(async {
            let source = containers::retry_db_operation(Duration::from_secs(30), || {
                run_async(connect_postgres(uri.clone()))
            })?;
            seed_accounts_table(&source).await?;

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

            let ranked = QueryBuilder::new("accounts")
                .order_by("balance", SortDirection::Desc)
                .get(&source)
                .await?;
            assert_eq!(ranked.len(), 2);

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
fn postgres_transaction_rolls_back_on_error() -> Result<(), DbError> {
    containers::with_postgres_url(|uri| {
        run_async(async {
            let source = containers::retry_db_operation(Duration::from_secs(30), || {
                run_async(connect_postgres(uri.clone()))
            })?;
            seed_accounts_table(&source).await?;

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

#[test]
#[ignore = "requires Docker daemon"]
fn postgres_explain_returns_a_plan() -> Result<(), DbError> {
    containers::with_postgres_url(|uri| {
        run_async(async {
            let source = containers::retry_db_operation(Duration::from_secs(30), || {
                run_async(connect_postgres(uri.clone()))
            })?;
            seed_accounts_table(&source).await?;

            let plan = QueryBuilder::new("accounts")
                .where_("balance", ComparisonOperator::Gt, Value::Int(0))
                .explain(&source)
                .await?;
            assert!(!plan.is_empty());

            source.disconnect().await?;
            Ok(())
        })
    })
}
