#![allow(clippy::result_large_err)]

mod blueprint;
pub mod driver;
mod error;
mod migration_driver;
pub mod query_parser;
mod value_codec;

pub use blueprint::MongoBlueprint;
pub use driver::{MongoConnection, MongoDriver, MongoTransaction};
pub use error::{MongoErrorFormatter, format_mongo_error};
pub use migration_driver::MongoMigrationDriver;
pub use query_parser::MongoQueryParser;
