use crate::FormattedError;
use thiserror::Error;

/// Every fallible operation in Cascade returns this error type, so an
/// application never has to match on a per-driver error enum.
#[derive(Debug, Error)]
pub enum DbError {
    // --- configuration -----------------------------------------------
    #[error("no data source named '{0}' is registered")]
    MissingDataSource(String),

    #[error("a data source named '{0}' is already registered")]
    DuplicateDataSourceName(String),

    #[error("unknown driver kind '{0}'")]
    UnknownDriver(String),

    // --- connection -----------------------------------------------
    #[error("data source '{0}' is not connected")]
    NotConnected(String),

    #[error("failed to connect: {0}")]
    ConnectFailed(FormattedError),

    #[error("failed to disconnect cleanly: {0}")]
    DisconnectFailed(FormattedError),

    // --- parse -----------------------------------------------
    #[error("invalid operation payload: {0}")]
    InvalidOperationPayload(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("malformed join field '{0}'")]
    BadJoinField(String),

    // --- execution -----------------------------------------------
    #[error("query failed: {source}")]
    QueryFailed {
        source: FormattedError,
        sql: String,
        params: Vec<String>,
    },

    #[error("constraint violation: {0}")]
    ConstraintViolation(FormattedError),

    #[error("unique constraint violation: {0}")]
    UniqueViolation(FormattedError),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(FormattedError),

    #[error("not-null violation: {0}")]
    NotNullViolation(FormattedError),

    // --- transaction -----------------------------------------------
    #[error("no active transaction on the current task")]
    NoActiveTransaction,

    #[error("transaction was already committed")]
    AlreadyCommitted,

    #[error("transaction rollback was requested")]
    RollbackRequested,

    #[error("transaction connection for data source '{0}' is still referenced outside its scope")]
    TransactionConnectionLeaked(String),

    // --- migration -----------------------------------------------
    #[error("migration is missing a name")]
    MissingMigrationName,

    #[error("a migration named '{0}' is already registered")]
    DuplicateMigrationRegistration(String),

    #[error("migration '{name}' failed: {source}")]
    MigrationFailed {
        name: String,
        source: Box<DbError>,
    },

    // --- scope -----------------------------------------------
    #[error("unknown scope '{0}'")]
    UnknownScope(String),

    // --- ambient -----------------------------------------------
    #[error("operation not supported by this engine: {0}")]
    NotSupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub fn connect_failed(msg: impl Into<String>) -> Self {
        Self::ConnectFailed(FormattedError::new(msg))
    }

    pub fn query_failed(msg: impl Into<String>, sql: impl Into<String>, params: Vec<String>) -> Self {
        Self::QueryFailed {
            source: FormattedError::new(msg),
            sql: sql.into(),
            params,
        }
    }

    pub fn migration_failed(name: impl Into<String>, source: DbError) -> Self {
        Self::MigrationFailed {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// The structured diagnostics carried by this error, if any.
    pub fn formatted(&self) -> Option<&FormattedError> {
        match self {
            Self::ConnectFailed(f)
            | Self::DisconnectFailed(f)
            | Self::ConstraintViolation(f)
            | Self::UniqueViolation(f)
            | Self::ForeignKeyViolation(f)
            | Self::NotNullViolation(f) => Some(f),
            Self::QueryFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// True for errors a caller could reasonably retry (e.g. a transient
    /// network failure), as opposed to a logic error like a syntax mistake.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ConnectFailed(_) | Self::DisconnectFailed(_))
    }
}
