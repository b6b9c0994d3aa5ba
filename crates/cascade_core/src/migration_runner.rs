use std::collections::HashMap;
use std::sync::Arc;

use crate::{DbError, Migration, MigrationDriver, SchemaBuilder};

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub name: String,
    pub batch: i64,
}

#[derive(Debug, Clone)]
pub struct MigrationFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub applied: Vec<MigrationOutcome>,
    pub failure: Option<MigrationFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub name: String,
    pub batch: Option<i64>,
    pub pending: bool,
}

/// Registers migrations and drives them against a `MigrationDriver`,
/// tracking what has run in the `_migrations` ledger.
pub struct MigrationRunner {
    registered: HashMap<String, Arc<dyn Migration>>,
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self {
            registered: HashMap::new(),
        }
    }

    pub fn register(&mut self, migration: Arc<dyn Migration>) -> Result<(), DbError> {
        let name = migration.name();
        if name.is_empty() {
            return Err(DbError::MissingMigrationName);
        }
        if self.registered.contains_key(&name) {
            return Err(DbError::DuplicateMigrationRegistration(name));
        }
        self.registered.insert(name, migration);
        Ok(())
    }

    pub fn register_many(
        &mut self,
        migrations: impl IntoIterator<Item = Arc<dyn Migration>>,
    ) -> Result<(), DbError> {
        for migration in migrations {
            self.register(migration)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.registered.clear();
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registered.keys().cloned().collect();
        names.sort();
        names
    }

    /// Migrations not yet recorded in the ledger, sorted by `(order, name)`
    /// — migrations with no explicit order sort after all that have one,
    /// and ties within the same order break on name.
    fn pending(&self, recorded: &[String]) -> Vec<Arc<dyn Migration>> {
        let mut pending: Vec<Arc<dyn Migration>> = self
            .registered
            .iter()
            .filter(|(name, _)| !recorded.iter().any(|r| r == *name))
            .map(|(_, m)| m.clone())
            .collect();

        pending.sort_by(|a, b| {
            let ord_a = a.order().unwrap_or(i64::MAX);
            let ord_b = b.order().unwrap_or(i64::MAX);
            ord_a.cmp(&ord_b).then_with(|| a.name().cmp(&b.name()))
        });

        pending
    }

    pub async fn run(
        &self,
        name: &str,
        driver: &dyn MigrationDriver,
        batch: i64,
    ) -> Result<(), DbError> {
        let migration = self
            .registered
            .get(name)
            .ok_or_else(|| DbError::MissingMigrationName)?;
        self.run_one(migration.as_ref(), driver, batch).await
    }

    async fn run_one(
        &self,
        migration: &dyn Migration,
        driver: &dyn MigrationDriver,
        batch: i64,
    ) -> Result<(), DbError> {
        let mut schema = SchemaBuilder::new();
        migration.up(&mut schema).await;
        schema
            .execute(driver)
            .await
            .map_err(|e| DbError::migration_failed(migration.name(), e))?;
        driver.record_migration(&migration.name(), batch).await
    }

    pub async fn rollback(
        &self,
        name: &str,
        driver: &dyn MigrationDriver,
    ) -> Result<(), DbError> {
        let migration = self
            .registered
            .get(name)
            .ok_or_else(|| DbError::MissingMigrationName)?;
        self.rollback_one(migration.as_ref(), driver).await
    }

    async fn rollback_one(
        &self,
        migration: &dyn Migration,
        driver: &dyn MigrationDriver,
    ) -> Result<(), DbError> {
        let mut schema = SchemaBuilder::new();
        migration.down(&mut schema).await;
        schema
            .execute(driver)
            .await
            .map_err(|e| DbError::migration_failed(migration.name(), e))?;
        driver.remove_migration_record(&migration.name()).await
    }

    /// Run every registered migration not yet recorded, in `(order, name)`
    /// order, stopping at the first failure. Successful migrations before
    /// the failure are left applied — `run_all` does not roll them back.
    pub async fn run_all(&self, driver: &dyn MigrationDriver) -> Result<RunReport, DbError> {
        driver.ensure_ledger().await?;
        let recorded = driver.recorded_migrations().await?;
        let recorded_names: Vec<String> = recorded.iter().map(|r| r.name.clone()).collect();
        let next_batch = recorded.iter().map(|r| r.batch).max().unwrap_or(0) + 1;

        let mut report = RunReport::default();
        for migration in self.pending(&recorded_names) {
            match self.run_one(migration.as_ref(), driver, next_batch).await {
                Ok(()) => report.applied.push(MigrationOutcome {
                    name: migration.name(),
                    batch: next_batch,
                }),
                Err(err) => {
                    report.failure = Some(MigrationFailure {
                        name: migration.name(),
                        error: err.to_string(),
                    });
                    break;
                }
            }
        }
        Ok(report)
    }

    pub async fn rollback_last(&self, driver: &dyn MigrationDriver) -> Result<RunReport, DbError> {
        self.rollback_batches(driver, 1).await
    }

    /// Roll back the most recent `batches` batches, most-recent migration
    /// within each batch first.
    pub async fn rollback_batches(
        &self,
        driver: &dyn MigrationDriver,
        batches: i64,
    ) -> Result<RunReport, DbError> {
        driver.ensure_ledger().await?;
        let mut recorded = driver.recorded_migrations().await?;
        recorded.sort_by(|a, b| b.batch.cmp(&a.batch).then_with(|| b.name.cmp(&a.name)));

        let max_batch = recorded.iter().map(|r| r.batch).max().unwrap_or(0);
        let floor = max_batch - batches + 1;

        let mut report = RunReport::default();
        for record in recorded.into_iter().filter(|r| r.batch >= floor) {
            let Some(migration) = self.registered.get(&record.name) else {
                continue;
            };
            match self.rollback_one(migration.as_ref(), driver).await {
                Ok(()) => report.applied.push(MigrationOutcome {
                    name: record.name,
                    batch: record.batch,
                }),
                Err(err) => {
                    report.failure = Some(MigrationFailure {
                        name: record.name,
                        error: err.to_string(),
                    });
                    break;
                }
            }
        }
        Ok(report)
    }

    pub async fn rollback_all(&self, driver: &dyn MigrationDriver) -> Result<RunReport, DbError> {
        driver.ensure_ledger().await?;
        let recorded = driver.recorded_migrations().await?;
        let batches = recorded.iter().map(|r| r.batch).max().unwrap_or(0);
        self.rollback_batches(driver, batches).await
    }

    /// Roll back everything, then run everything again from scratch.
    pub async fn fresh(&self, driver: &dyn MigrationDriver) -> Result<RunReport, DbError> {
        self.rollback_all(driver).await?;
        self.run_all(driver).await
    }

    pub async fn status(&self, driver: &dyn MigrationDriver) -> Result<Vec<StatusEntry>, DbError> {
        driver.ensure_ledger().await?;
        let recorded = driver.recorded_migrations().await?;
        let recorded_by_name: HashMap<&str, i64> =
            recorded.iter().map(|r| (r.name.as_str(), r.batch)).collect();

        let mut entries: Vec<StatusEntry> = self
            .registered
            .keys()
            .map(|name| StatusEntry {
                name: name.clone(),
                batch: recorded_by_name.get(name.as_str()).copied(),
                pending: !recorded_by_name.contains_key(name.as_str()),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoopMigration {
        name: String,
        order: Option<i64>,
    }

    #[async_trait]
    impl Migration for NoopMigration {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn order(&self) -> Option<i64> {
            self.order
        }

        async fn up(&self, _schema: &mut SchemaBuilder) {}
        async fn down(&self, _schema: &mut SchemaBuilder) {}
    }

    #[test]
    fn pending_sorts_by_order_then_name() {
        let mut runner = MigrationRunner::new();
        runner
            .register(Arc::new(NoopMigration {
                name: "z_create_users".into(),
                order: Some(1),
            }))
            .unwrap();
        runner
            .register(Arc::new(NoopMigration {
                name: "a_create_posts".into(),
                order: None,
            }))
            .unwrap();
        runner
            .register(Arc::new(NoopMigration {
                name: "a_create_comments".into(),
                order: Some(1),
            }))
            .unwrap();

        let pending = runner.pending(&[]);
        let names: Vec<String> = pending.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["a_create_comments", "z_create_users", "a_create_posts"]
        );
    }

    #[test]
    fn duplicate_registration_errors() {
        let mut runner = MigrationRunner::new();
        runner
            .register(Arc::new(NoopMigration {
                name: "m1".into(),
                order: None,
            }))
            .unwrap();
        let err = runner
            .register(Arc::new(NoopMigration {
                name: "m1".into(),
                order: None,
            }))
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateMigrationRegistration(_)));
    }
}
