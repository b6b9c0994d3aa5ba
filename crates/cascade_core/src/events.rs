use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

/// A notable thing that happened on a `DataSource`, forwarded to the owning
/// `DataSourceRegistry`'s subscribers.
#[derive(Debug, Clone)]
pub enum DataSourceEvent {
    /// Fired by the registry, on the registry thread, before `register`
    /// returns — one of the "four named events" the registry's bus carries.
    Registered { data_source: String },
    /// Fired alongside `Registered` when this registration won the default
    /// election (first registration, or an explicit `is_default: true`).
    DefaultRegistered { data_source: String },
    Connected { data_source: String },
    Disconnected { data_source: String },
    QueryExecuted {
        data_source: String,
        sql: String,
        duration: Duration,
    },
    TransactionStarted { data_source: String },
    TransactionCommitted { data_source: String },
    TransactionRolledBack { data_source: String },
    MigrationApplied { data_source: String, name: String },
}

/// A small broadcast bus a `DataSourceRegistry` forwards every connected
/// `DataSource`'s events through, so one subscription sees activity across
/// all registered sources.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DataSourceEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataSourceEvent> {
        self.sender.subscribe()
    }

    /// Best-effort publish: a full channel with no subscribers left is not
    /// an error, it just means nobody's listening right now.
    pub fn publish(&self, event: DataSourceEvent) {
        let _ = self.sender.send(event);
    }
}
