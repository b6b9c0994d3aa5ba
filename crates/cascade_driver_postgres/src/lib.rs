mod blueprint;
mod dialect;
mod driver;
mod error;
mod migration_driver;
mod query_parser;
mod value_codec;

pub use blueprint::PostgresBlueprint;
pub use dialect::{map_postgres_type_to_column_type, PgTypeFacts, PostgresDialect};
pub use driver::{PostgresConnection, PostgresDriver, PostgresTransaction};
pub use error::{PostgresErrorFormatter, format_pg_error};
pub use migration_driver::PostgresMigrationDriver;
pub use query_parser::PostgresQueryParser;
