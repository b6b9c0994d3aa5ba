use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::{DataSourceEvent, EventBus};
use crate::{Connection, DbError, Driver};

/// The strategy `delete()` uses when a model doesn't override it: remove the
/// row outright, mark it deleted in place, or move it to a separate trash
/// table. Carried as config for `Writer`/`Restorer` implementations to read;
/// this crate's interface-only contract doesn't act on it itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteStrategy {
    Hard,
    Soft,
    Trash,
}

impl Default for DeleteStrategy {
    fn default() -> Self {
        Self::Hard
    }
}

/// Connection options for one data source, deserializable from whatever
/// config format the embedding application uses (JSON, TOML, env). Cascade
/// only defines the shape; loading it from a file is the caller's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceOptions {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default)]
    pub connect_timeout: Option<Duration>,
    /// The delete strategy models on this data source fall back to when
    /// they don't specify their own.
    #[serde(default)]
    pub default_delete_strategy: DeleteStrategy,
    /// The table/collection name `DeleteStrategy::Trash` moves rows into,
    /// when a model doesn't name its own.
    #[serde(default)]
    pub default_trash_table: Option<String>,
    /// Per-data-source defaults (e.g. timestamps column names, default
    /// scopes) a `Model` implementation can read at registration time.
    /// Opaque to this crate — shape is entirely up to the embedding
    /// application's model layer.
    #[serde(default)]
    pub model_defaults: serde_json::Map<String, serde_json::Value>,
}

fn default_pool_size() -> u32 {
    10
}

impl DataSourceOptions {
    /// Reads `{PREFIX}_URL` (e.g. `DATABASE_URL` for prefix `"DATABASE"`)
    /// for the common single-data-source deployment.
    pub fn from_env(name: impl Into<String>, env_prefix: &str) -> Result<Self, DbError> {
        let var = format!("{}_URL", env_prefix);
        let uri = std::env::var(&var).map_err(|_| {
            DbError::MissingDataSource(format!("environment variable {} is not set", var))
        })?;
        Ok(Self {
            name: name.into(),
            uri,
            is_default: false,
            pool_size: default_pool_size(),
            connect_timeout: None,
            default_delete_strategy: DeleteStrategy::default(),
            default_trash_table: None,
            model_defaults: serde_json::Map::new(),
        })
    }
}

/// A named, connected driver instance.
pub struct DataSource {
    name: String,
    driver: Arc<dyn Driver>,
    is_default: bool,
    events: EventBus,
    default_delete_strategy: DeleteStrategy,
    default_trash_table: Option<String>,
    model_defaults: serde_json::Map<String, serde_json::Value>,
}

impl DataSource {
    pub fn new(name: impl Into<String>, driver: Arc<dyn Driver>, is_default: bool) -> Self {
        Self {
            name: name.into(),
            driver,
            is_default,
            events: EventBus::default(),
            default_delete_strategy: DeleteStrategy::default(),
            default_trash_table: None,
            model_defaults: serde_json::Map::new(),
        }
    }

    /// Builds a `DataSource` carrying `options`' delete-strategy and
    /// model-defaults config alongside the driver, rather than just the
    /// bare `name`/`is_default` pair `new` takes.
    pub fn from_options(options: &DataSourceOptions, driver: Arc<dyn Driver>) -> Self {
        Self {
            name: options.name.clone(),
            driver,
            is_default: options.is_default,
            events: EventBus::default(),
            default_delete_strategy: options.default_delete_strategy,
            default_trash_table: options.default_trash_table.clone(),
            model_defaults: options.model_defaults.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn default_delete_strategy(&self) -> DeleteStrategy {
        self.default_delete_strategy
    }

    pub fn default_trash_table(&self) -> Option<&str> {
        self.default_trash_table.as_deref()
    }

    pub fn model_defaults(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.model_defaults
    }

    pub async fn connect(&self) -> Result<(), DbError> {
        self.driver.connect().await?;
        self.events.publish(DataSourceEvent::Connected {
            data_source: self.name.clone(),
        });
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), DbError> {
        self.driver.disconnect().await?;
        self.events.publish(DataSourceEvent::Disconnected {
            data_source: self.name.clone(),
        });
        Ok(())
    }

    /// The connection to use for the next driver call: the task's ambient
    /// transaction connection if one is bound for this data source,
    /// otherwise a fresh lease from the pool.
    pub async fn connection(&self) -> Result<Arc<dyn Connection>, DbError> {
        if let Some(conn) = crate::transaction::current(&self.name) {
            return Ok(conn);
        }
        Ok(Arc::from(self.driver.connection().await?))
    }

    /// Begin a transaction and bind it as the ambient connection for
    /// `data_source` while `body` runs. Nested calls for the same data
    /// source reuse the already-bound connection rather than opening a
    /// second transaction.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> Result<T, DbError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, DbError>>,
    {
        if crate::transaction::in_transaction(&self.name) {
            return body().await;
        }

        let conn = self.connection().await?;
        let txn = conn.begin().await?;
        self.events.publish(DataSourceEvent::TransactionStarted {
            data_source: self.name.clone(),
        });

        let txn_conn: Arc<dyn Connection> = Arc::new(TransactionScopedConnection { inner: txn });
        let result = crate::transaction::with_transaction(&self.name, txn_conn.clone(), body()).await;

        // Recover the boxed transaction to commit/roll back; the scoped
        // wrapper should be the only owner left once the task-local scope
        // exits. A caller that stashed the ambient `Arc<dyn Connection>`
        // somewhere that outlives `body` (a spawned task, a cached field)
        // leaves a second owner behind, which we can't safely commit or
        // roll back through, so it is reported rather than panicked on.
        let txn_conn = match Arc::try_unwrap(txn_conn) {
            Ok(txn_conn) => txn_conn,
            Err(_) => return Err(DbError::TransactionConnectionLeaked(self.name.clone())),
        };

        match result {
            Ok(value) => {
                txn_conn.inner.commit().await?;
                self.events.publish(DataSourceEvent::TransactionCommitted {
                    data_source: self.name.clone(),
                });
                Ok(value)
            }
            Err(err) => {
                let _ = txn_conn.inner.rollback().await;
                self.events
                    .publish(DataSourceEvent::TransactionRolledBack {
                        data_source: self.name.clone(),
                    });
                Err(err)
            }
        }
    }
}

/// Adapts a `Box<dyn Transaction>` so it can be bound as an ambient
/// `Connection` without exposing `commit`/`rollback` to nested callers.
struct TransactionScopedConnection {
    inner: Box<dyn crate::Transaction>,
}

#[async_trait::async_trait]
impl Connection for TransactionScopedConnection {
    async fn execute(
        &self,
        query: &crate::CompiledQuery,
    ) -> Result<crate::QueryResult, DbError> {
        self.inner.execute(query).await
    }

    async fn begin(&self) -> Result<Box<dyn crate::Transaction>, DbError> {
        Err(DbError::NotSupported(
            "nested transactions are not supported".to_string(),
        ))
    }
}
