use async_trait::async_trait;
use bson::{Document, doc};
use mongodb::Database;
use mongodb::options::{CreateCollectionOptions, IndexOptions};
use mongodb::{IndexModel, options::RenameCollectionOptions};

use cascade_core::{
    DbError, IndexDefinition, IndexKind, MigrationDriver, MigrationRecord, SchemaOperation,
    VectorMetric,
};

use crate::error::format_mongo_error;

/// Renders and executes `SchemaOperation` atoms against MongoDB.
///
/// Mongo is schemaless: column-level atoms (`AddColumn`, `DropColumn`,
/// `ModifyColumn`, `RenameColumn`) and relational-only constraints
/// (`AddForeignKey`, `AddPrimaryKey`, `AddCheckConstraint`,
/// `DropConstraint`) have no native equivalent and are logged no-ops, the
/// same resolution the relational driver uses for `ValidateSchema` in
/// reverse (§4.5, DESIGN.md). `Ttl` indexes, by contrast, map onto a real
/// native feature (`expireAfterSeconds`) instead of the partial-index
/// emulation the relational driver needs.
pub struct MongoMigrationDriver {
    db: Database,
    ledger_collection: String,
}

impl MongoMigrationDriver {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            ledger_collection: "_migrations".to_string(),
        }
    }

    pub fn with_ledger_collection(mut self, name: impl Into<String>) -> Self {
        self.ledger_collection = name.into();
        self
    }

    async fn apply_one(&self, op: &SchemaOperation) -> Result<(), DbError> {
        match op {
            SchemaOperation::CreateTable { table, columns } => {
                let validator = jsonschema_validator(columns);
                let mut options = CreateCollectionOptions::default();
                if let Some(validator) = validator {
                    options.validator = Some(validator);
                }
                match self.db.create_collection(table).with_options(options).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.to_string().contains("already exists") => Ok(()),
                    Err(e) => Err(format_mongo_error(e)),
                }
            }
            SchemaOperation::DropTable { table, if_exists } => {
                let result = self.db.collection::<Document>(table).drop().await;
                match result {
                    Ok(()) => Ok(()),
                    Err(_) if *if_exists => Ok(()),
                    Err(e) => Err(format_mongo_error(e)),
                }
            }
            SchemaOperation::RenameTable { from, to } => self
                .db
                .collection::<Document>(from)
                .rename(to, RenameCollectionOptions::default())
                .await
                .map_err(format_mongo_error),
            SchemaOperation::AddColumn { table, column } => {
                log::debug!("addColumn '{}' on '{}' is a no-op on MongoDB; collections are schemaless", column.name, table);
                Ok(())
            }
            SchemaOperation::DropColumn { table, column } => {
                // Schemaless: existing documents keep the field, but new
                // writes simply omit it. There's no DDL step required.
                log::debug!("dropColumn '{}' on '{}' is a no-op on MongoDB", column, table);
                Ok(())
            }
            SchemaOperation::ModifyColumn { table, column } => {
                log::debug!("modifyColumn '{}' on '{}' is a no-op on MongoDB", column.name, table);
                Ok(())
            }
            SchemaOperation::RenameColumn { table, from, to } => self
                .db
                .collection::<Document>(table)
                .update_many(doc! {}, doc! { "$rename": { from: to } })
                .await
                .map(|_| ())
                .map_err(format_mongo_error),
            SchemaOperation::CreateIndex { table, index } => self.create_index(table, index).await,
            SchemaOperation::DropIndex { table, name } => self
                .db
                .collection::<Document>(table)
                .drop_index(name)
                .await
                .map_err(format_mongo_error),
            SchemaOperation::AddForeignKey { table, foreign_key, .. } => {
                log::debug!(
                    "foreign key {:?} -> '{}' on '{}' is a no-op on MongoDB; enforce via application code or $lookup",
                    foreign_key.columns, foreign_key.references_table, table
                );
                Ok(())
            }
            SchemaOperation::DropForeignKey { table, name } => {
                log::debug!("dropForeignKey '{}' on '{}' is a no-op on MongoDB", name, table);
                Ok(())
            }
            SchemaOperation::AddPrimaryKey { table, columns } => {
                log::debug!("addPrimaryKey {:?} on '{}' is a no-op on MongoDB; _id is always primary", columns, table);
                Ok(())
            }
            SchemaOperation::AddCheckConstraint { table, name, .. } => {
                log::debug!("checkConstraint '{}' on '{}' is a no-op on MongoDB; use ValidateSchema for $jsonSchema rules", name, table);
                Ok(())
            }
            SchemaOperation::DropConstraint { table, name } => {
                log::debug!("dropConstraint '{}' on '{}' is a no-op on MongoDB", name, table);
                Ok(())
            }
            SchemaOperation::ValidateSchema { table, rule } => {
                let command = doc! {
                    "collMod": table,
                    "validator": { "$jsonSchema": parse_rule(rule)? },
                };
                self.db.run_command(command).await.map(|_| ()).map_err(format_mongo_error)
            }
            SchemaOperation::Raw(statement) => {
                let command: Document = serde_json::from_str(statement)
                    .and_then(|json: serde_json::Value| {
                        bson::to_document(&json).map_err(serde::de::Error::custom)
                    })
                    .map_err(|e| DbError::InvalidOperationPayload(format!("invalid raw command: {}", e)))?;
                self.db.run_command(command).await.map(|_| ()).map_err(format_mongo_error)
            }
        }
    }

    async fn create_index(&self, table: &str, index: &IndexDefinition) -> Result<(), DbError> {
        let collection = self.db.collection::<Document>(table);

        if let IndexKind::Vector { metric, .. } = &index.kind {
            // Vector search indexes are an Atlas Search feature created
            // through `createSearchIndexes`, not the classic `createIndexes`
            // command `IndexModel` wraps.
            let similarity = match metric {
                VectorMetric::Cosine => "cosine",
                VectorMetric::Euclidean => "euclidean",
                VectorMetric::DotProduct => "dotProduct",
            };
            let field = index.columns.first().cloned().unwrap_or_default();
            let command = doc! {
                "createSearchIndexes": table,
                "indexes": [{
                    "name": index.name.clone().unwrap_or_else(|| format!("{}_vector_idx", field)),
                    "type": "vectorSearch",
                    "definition": {
                        "fields": [{
                            "type": "vector",
                            "path": &field,
                            "similarity": similarity,
                        }]
                    }
                }]
            };
            return self.db.run_command(command).await.map(|_| ()).map_err(format_mongo_error);
        }

        let mut keys = Document::new();
        let key_value = match &index.kind {
            IndexKind::Geo => bson::Bson::String("2dsphere".to_string()),
            IndexKind::FullText => bson::Bson::String("text".to_string()),
            _ => bson::Bson::Int32(1),
        };
        for column in &index.columns {
            keys.insert(column, key_value.clone());
        }

        let mut options = IndexOptions::builder()
            .name(index.name.clone())
            .unique(matches!(index.kind, IndexKind::Unique))
            .build();

        if let IndexKind::Ttl { after_seconds } = &index.kind {
            options.expire_after = Some(std::time::Duration::from_secs((*after_seconds).max(0) as u64));
        }

        let model = IndexModel::builder().keys(keys).options(options).build();
        collection.create_index(model).await.map(|_| ()).map_err(format_mongo_error)
    }
}

fn parse_rule(rule: &str) -> Result<Document, DbError> {
    serde_json::from_str(rule)
        .and_then(|json: serde_json::Value| bson::to_document(&json).map_err(serde::de::Error::custom))
        .map_err(|e| DbError::InvalidOperationPayload(format!("invalid $jsonSchema rule: {}", e)))
}

/// Builds a best-effort `$jsonSchema` validator from a `createTable` column
/// list, so a migration's column definitions still constrain documents
/// even though MongoDB has no native column DDL. Columns without an
/// explicit not-null requirement are left out of `required` instead of
/// guessed at.
fn jsonschema_validator(columns: &[cascade_core::ColumnDefinition]) -> Option<Document> {
    if columns.is_empty() {
        return None;
    }
    let mut properties = Document::new();
    let mut required = Vec::new();
    for column in columns {
        properties.insert(&column.name, doc! { "bsonType": bson_type_name(&column.ty) });
        if !column.nullable {
            required.push(column.name.clone());
        }
    }
    Some(doc! {
        "bsonType": "object",
        "properties": properties,
        "required": required,
    })
}

fn bson_type_name(ty: &cascade_core::ColumnType) -> &'static str {
    use cascade_core::ColumnType;
    match ty {
        ColumnType::Id
        | ColumnType::TinyInt
        | ColumnType::SmallInt
        | ColumnType::Integer
        | ColumnType::BigInt
        | ColumnType::Year => "long",
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal { .. } => "double",
        ColumnType::Boolean => "bool",
        ColumnType::Char(_)
        | ColumnType::String(_)
        | ColumnType::Text
        | ColumnType::MediumText
        | ColumnType::LongText
        | ColumnType::Enum(_)
        | ColumnType::Set(_)
        | ColumnType::Ulid
        | ColumnType::IpAddress
        | ColumnType::MacAddress => "string",
        ColumnType::Json | ColumnType::Jsonb => "object",
        ColumnType::Uuid => "string",
        ColumnType::Date | ColumnType::Time | ColumnType::DateTime | ColumnType::Timestamp | ColumnType::TimestampTz => "date",
        ColumnType::Binary => "binData",
        ColumnType::Point | ColumnType::Polygon | ColumnType::LineString | ColumnType::Geometry => "object",
        ColumnType::Array(_) => "array",
        ColumnType::Vector(_) => "array",
    }
}

#[async_trait]
impl MigrationDriver for MongoMigrationDriver {
    async fn apply(&self, operations: &[SchemaOperation]) -> Result<(), DbError> {
        for op in operations {
            self.apply_one(op).await?;
        }
        Ok(())
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    async fn ensure_ledger(&self) -> Result<(), DbError> {
        match self.db.create_collection(&self.ledger_collection).await {
            Ok(()) => {}
            Err(e) if e.to_string().contains("already exists") => {}
            Err(e) => return Err(format_mongo_error(e)),
        }
        let collection = self.db.collection::<Document>(&self.ledger_collection);
        let model = IndexModel::builder()
            .keys(doc! { "name": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection.create_index(model).await.map(|_| ()).map_err(format_mongo_error)
    }

    async fn recorded_migrations(&self) -> Result<Vec<MigrationRecord>, DbError> {
        use futures::TryStreamExt;
        let collection = self.db.collection::<Document>(&self.ledger_collection);
        let mut cursor = collection
            .find(doc! {})
            .sort(doc! { "batch": 1, "name": 1 })
            .await
            .map_err(format_mongo_error)?;

        let mut records = Vec::new();
        while let Some(doc) = cursor.try_next().await.map_err(format_mongo_error)? {
            let name = doc.get_str("name").unwrap_or_default().to_string();
            let batch = doc.get_i64("batch").unwrap_or(0);
            records.push(MigrationRecord { name, batch });
        }
        Ok(records)
    }

    async fn record_migration(&self, name: &str, batch: i64) -> Result<(), DbError> {
        let collection = self.db.collection::<Document>(&self.ledger_collection);
        collection
            .insert_one(doc! { "name": name, "batch": batch })
            .await
            .map(|_| ())
            .map_err(format_mongo_error)
    }

    async fn remove_migration_record(&self, name: &str) -> Result<(), DbError> {
        let collection = self.db.collection::<Document>(&self.ledger_collection);
        collection
            .delete_one(doc! { "name": name })
            .await
            .map(|_| ())
            .map_err(format_mongo_error)
    }
}
