use std::sync::Arc;

use cascade_core::{Capability, ComparisonOperator, DataSourceRegistry, DriverKind, QueryBuilder, Value};
use cascade_test_support::{FakeDriver, FakeQueryOutcome};

#[tokio::test]
async fn registry_dispatches_through_the_registered_driver() {
    let registry = DataSourceRegistry::new();
    let driver = Arc::new(FakeDriver::new(DriverKind::Postgres, Capability::TRANSACTIONS));
    driver.push_outcome(FakeQueryOutcome::Rows(vec![vec![("id".to_string(), Value::Int(1))]]));

    registry.register(driver, "primary", true).unwrap();
    let source = registry.default_source().unwrap();
    source.connect().await.unwrap();

    let mut query = QueryBuilder::new("users");
    query.where_("id", ComparisonOperator::Eq, Value::Int(1));
    let rows = query.get(&source).await.unwrap();

    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn transaction_commits_on_success_and_rolls_back_on_error() {
    let registry = DataSourceRegistry::new();
    let driver = Arc::new(FakeDriver::new(DriverKind::Postgres, Capability::TRANSACTIONS));
    registry.register(driver.clone(), "primary", true).unwrap();
    let source = registry.default_source().unwrap();
    source.connect().await.unwrap();

    source
        .transaction(|| async { Ok::<_, cascade_core::DbError>(()) })
        .await
        .unwrap();
    assert_eq!(driver.stats().transactions_committed, 1);

    let result = source
        .transaction(|| async { Err::<(), _>(cascade_core::DbError::RollbackRequested) })
        .await;
    assert!(result.is_err());
    assert_eq!(driver.stats().transactions_rolled_back, 1);
}

#[tokio::test]
async fn nested_transaction_calls_reuse_the_outer_connection() {
    let registry = DataSourceRegistry::new();
    let driver = Arc::new(FakeDriver::new(DriverKind::Postgres, Capability::TRANSACTIONS));
    registry.register(driver.clone(), "primary", true).unwrap();
    let source = registry.default_source().unwrap();
    source.connect().await.unwrap();

    source
        .transaction(|| async {
            source
                .transaction(|| async { Ok::<_, cascade_core::DbError>(()) })
                .await
        })
        .await
        .unwrap();

    assert_eq!(driver.stats().transactions_begun, 1, "nesting must not open a second transaction");
    assert_eq!(driver.stats().transactions_committed, 1);
}
