use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::events::{DataSourceEvent, EventBus};
use crate::{DataSource, DbError, Driver};

/// Owns every registered `DataSource`, elects a default, and forwards each
/// source's events onto one bus so a caller can subscribe once.
pub struct DataSourceRegistry {
    sources: RwLock<HashMap<String, Arc<DataSource>>>,
    default_name: RwLock<Option<String>>,
    events: EventBus,
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            default_name: RwLock::new(None),
            events: EventBus::default(),
        }
    }

    /// Registers a data source. The first one registered becomes the
    /// default automatically; later registrations only become default if
    /// `driver`'s `DataSource::is_default` is explicitly `true`.
    pub fn register(&self, driver: Arc<dyn Driver>, name: impl Into<String>, is_default: bool) -> Result<(), DbError> {
        let name = name.into();
        let mut sources = self.sources.write().unwrap();
        if sources.contains_key(&name) {
            return Err(DbError::DuplicateDataSourceName(name));
        }

        let source = Arc::new(DataSource::new(name.clone(), driver, is_default));
        self.forward_events(&source);

        let make_default = is_default || sources.is_empty();
        sources.insert(name.clone(), source);

        // `registered`/`default-registered` fire on the registry thread
        // before `register` returns, per the spec's event-ordering note.
        self.events.publish(DataSourceEvent::Registered {
            data_source: name.clone(),
        });
        if make_default {
            *self.default_name.write().unwrap() = Some(name.clone());
            self.events.publish(DataSourceEvent::DefaultRegistered { data_source: name });
        }
        Ok(())
    }

    /// Drops every registered data source and the default pointer. Per the
    /// data-source lifecycle invariant ("destroyed only on explicit clear"),
    /// nothing else in this crate removes a registration.
    pub fn clear(&self) {
        self.sources.write().unwrap().clear();
        *self.default_name.write().unwrap() = None;
    }

    fn forward_events(&self, source: &Arc<DataSource>) {
        let mut rx = source.events().subscribe();
        let bus = self.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => bus.publish(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn get(&self, name: &str) -> Result<Arc<DataSource>, DbError> {
        self.sources
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::MissingDataSource(name.to_string()))
    }

    pub fn default_source(&self) -> Result<Arc<DataSource>, DbError> {
        let name = self
            .default_name
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| DbError::MissingDataSource("<default>".to_string()))?;
        self.get(&name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataSourceEvent> {
        self.events.subscribe()
    }

    pub async fn connect_all(&self) -> Result<(), DbError> {
        let sources: Vec<Arc<DataSource>> = self.sources.read().unwrap().values().cloned().collect();
        for source in sources {
            source.connect().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Capability, Connection, DriverKind, PoolStatus, QueryResult, Transaction};
    use crate::{Blueprint, CompiledQuery, MigrationDriver, Operation, QueryParser};
    use async_trait::async_trait;

    struct StubConnection;
    #[async_trait]
    impl Connection for StubConnection {
        async fn execute(&self, _query: &CompiledQuery) -> Result<QueryResult, DbError> {
            Ok(QueryResult::empty())
        }
        async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
            Err(DbError::NotSupported("stub".into()))
        }
    }

    struct StubParser;
    impl QueryParser for StubParser {
        fn parse(&self, _table: &str, _ops: &[Operation]) -> Result<CompiledQuery, DbError> {
            Ok(CompiledQuery::Sql {
                sql: String::new(),
                params: Vec::new(),
            })
        }
    }

    struct StubDriver {
        parser: StubParser,
    }

    #[async_trait]
    impl Driver for StubDriver {
        fn kind(&self) -> DriverKind {
            DriverKind::Postgres
        }
        fn capabilities(&self) -> Capability {
            Capability::empty()
        }
        async fn connect(&self) -> Result<(), DbError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), DbError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn connection(&self) -> Result<Box<dyn Connection>, DbError> {
            Ok(Box::new(StubConnection))
        }
        async fn pool_status(&self) -> PoolStatus {
            PoolStatus::default()
        }
        fn query_parser(&self) -> &dyn QueryParser {
            &self.parser
        }
        fn migration_driver(&self) -> &dyn MigrationDriver {
            unimplemented!("not needed for this test")
        }
        fn blueprint(&self) -> &dyn Blueprint {
            unimplemented!("not needed for this test")
        }
    }

    #[tokio::test]
    async fn first_registered_source_becomes_default() {
        let registry = DataSourceRegistry::new();
        registry
            .register(
                Arc::new(StubDriver { parser: StubParser }),
                "primary",
                false,
            )
            .unwrap();
        assert_eq!(registry.default_source().unwrap().name(), "primary");
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let registry = DataSourceRegistry::new();
        registry
            .register(Arc::new(StubDriver { parser: StubParser }), "a", false)
            .unwrap();
        let err = registry
            .register(Arc::new(StubDriver { parser: StubParser }), "a", false)
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateDataSourceName(_)));
    }

    #[tokio::test]
    async fn explicit_default_overrides_first_registered() {
        let registry = DataSourceRegistry::new();
        registry
            .register(Arc::new(StubDriver { parser: StubParser }), "a", false)
            .unwrap();
        registry
            .register(Arc::new(StubDriver { parser: StubParser }), "b", true)
            .unwrap();
        assert_eq!(registry.default_source().unwrap().name(), "b");
    }

    #[tokio::test]
    async fn register_publishes_registered_and_default_registered_events() {
        let registry = DataSourceRegistry::new();
        let mut events = registry.subscribe();
        registry
            .register(Arc::new(StubDriver { parser: StubParser }), "a", false)
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            DataSourceEvent::Registered { data_source } if data_source == "a"
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            DataSourceEvent::DefaultRegistered { data_source } if data_source == "a"
        ));
    }

    #[tokio::test]
    async fn clear_removes_every_source_and_the_default_pointer() {
        let registry = DataSourceRegistry::new();
        registry
            .register(Arc::new(StubDriver { parser: StubParser }), "a", false)
            .unwrap();
        registry.clear();

        assert!(registry.get("a").is_err());
        assert!(registry.default_source().is_err());
    }
}
