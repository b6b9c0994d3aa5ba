#![allow(clippy::result_large_err)]

mod blueprint;
mod column;
mod datasource;
mod dialect;
pub mod driver;
pub mod events;
mod index;
mod migration;
mod migration_driver;
mod migration_runner;
mod model;
mod operation;
mod query_builder;
mod query_parser;
mod registry;
mod relation;
mod scope;
pub mod transaction;

mod error;
mod error_formatter;
mod value;

pub use blueprint::{Blueprint, ColumnInfo, ForeignKeyInfo, IndexInfo, TableInfo};
pub use column::{ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyDefinition, OnDelete};
pub use datasource::{DataSource, DataSourceOptions, DeleteStrategy};
pub use dialect::{Dialect, LikeClause};
pub use driver::{Capability, Connection, Driver, DriverKind, PoolStatus, QueryResult, Transaction};
pub use error::DbError;
pub use error_formatter::{
    ConnectionErrorFormatter, DefaultErrorFormatter, ErrorLocation, FormattedError,
    QueryErrorFormatter, sanitize_uri,
};
pub use index::{IndexDefinition, IndexKind, VectorMetric};
pub use migration::{ColumnHandle, ForeignKeyHandle, Migration, SchemaBuilder, TableBuilder};
pub use migration_driver::{MigrationDriver, MigrationRecord, SchemaOperation};
pub use migration_runner::{
    MigrationFailure, MigrationOutcome, MigrationRunner, RunReport, StatusEntry,
};
pub use model::{Model, Restorer, Writer};
pub use operation::{ComparisonOperator, Connector, JoinKind, Operation, SortDirection};
pub use query_builder::{CursorPage, Page, QueryBuilder};
pub use query_parser::{CompiledQuery, ParamCounter, QueryParser, UpdateOp};
pub use registry::DataSourceRegistry;
pub use relation::{PivotDefinition, RelationDefinition, RelationKind};
pub use scope::{NamedScope, Scope, ScopePlacement};
pub use value::Value;

pub use chrono;
