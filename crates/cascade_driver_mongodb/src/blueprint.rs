use bson::Document;
use futures::TryStreamExt;
use mongodb::Database;

use cascade_core::{Blueprint, DbError, ForeignKeyInfo, IndexInfo, TableInfo};

use crate::error::format_mongo_error;

/// Read-only schema introspection over MongoDB's collection/index metadata.
/// A missing collection yields an empty `TableInfo`, never an error (§4.4);
/// Mongo has no native column catalog, so `TableInfo::columns` is always
/// empty and `has_column` always answers `false` — a document's shape is
/// only known by sampling, which introspection deliberately doesn't do.
pub struct MongoBlueprint {
    db: Database,
}

impl MongoBlueprint {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl Blueprint for MongoBlueprint {
    async fn has_table(&self, name: &str) -> Result<bool, DbError> {
        Ok(self.tables().await?.iter().any(|n| n == name))
    }

    async fn table(&self, name: &str) -> Result<TableInfo, DbError> {
        if !self.has_table(name).await? {
            return Ok(TableInfo::default());
        }

        let collection = self.db.collection::<Document>(name);
        let mut cursor = collection.list_indexes().await.map_err(format_mongo_error)?;

        let mut indexes = Vec::new();
        while let Some(model) = cursor.try_next().await.map_err(format_mongo_error)? {
            let options = model.options.unwrap_or_default();
            let index_name = options.name.clone().unwrap_or_default();
            let columns: Vec<String> = model.keys.into_iter().map(|(k, _)| k).collect();
            indexes.push(IndexInfo {
                is_primary: index_name == "_id_",
                name: index_name,
                columns,
                is_unique: options.unique.unwrap_or(false),
            });
        }

        Ok(TableInfo {
            name: name.to_string(),
            columns: Vec::new(),
            indexes,
            foreign_keys: Vec::<ForeignKeyInfo>::new(),
        })
    }

    async fn tables(&self) -> Result<Vec<String>, DbError> {
        let mut names = self
            .db
            .list_collection_names()
            .await
            .map_err(format_mongo_error)?;
        names.sort();
        Ok(names)
    }

    async fn has_column(&self, _table: &str, _column: &str) -> Result<bool, DbError> {
        // No native column catalog on a schemaless engine; a real answer
        // would require sampling documents, which introspection avoids.
        Ok(false)
    }
}
