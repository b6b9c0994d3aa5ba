use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{DataSource, DbError, NamedScope, QueryBuilder, Scope};

/// Describes one record type's mapping onto a table/collection: its name,
/// primary key, data source, and the scopes that apply to every query
/// built through it.
///
/// This is intentionally an interface-only contract — Cascade does not
/// generate the trait impl; an application (or a derive macro layered on
/// top, out of scope here) provides it.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Sized + 'static {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";

    /// The registered data source name this model reads/writes through, or
    /// `None` to use the registry's default.
    fn data_source() -> Option<&'static str> {
        None
    }

    /// Global scopes, named so a caller can disable one of them for a
    /// single call with `QueryBuilder::without_global_scope`. Spliced into
    /// the operation list at execution time, before or after the caller's
    /// own operations per each scope's `placement()` — not applied eagerly
    /// at `query()` time, so a `without_global_scope` call issued after
    /// `query()` still takes effect.
    fn global_scopes() -> Vec<NamedScope> {
        Vec::new()
    }

    /// Named local scopes a caller can opt into with `.scope("name")`.
    fn local_scopes() -> Vec<NamedScope> {
        Vec::new()
    }

    fn query() -> QueryBuilder {
        let mut builder = QueryBuilder::new(Self::TABLE);
        builder.with_global_scopes(Self::global_scopes());
        builder
    }

    /// `query()` plus one named local scope applied immediately. Returns
    /// `None` if no local scope of that name is registered.
    fn query_scoped(name: &str) -> Option<QueryBuilder> {
        let mut builder = Self::query();
        let scope = Self::local_scopes().into_iter().find(|s| s.name == name)?;
        scope.scope.apply(&mut builder);
        Some(builder)
    }
}

/// Writes a `Model` back to storage: insert on first save, update after.
#[async_trait]
pub trait Writer: Model {
    async fn insert(&self, data_source: &DataSource) -> Result<(), DbError>;
    async fn update(&self, data_source: &DataSource) -> Result<(), DbError>;
    async fn delete(&self, data_source: &DataSource) -> Result<(), DbError>;

    async fn save(&self, data_source: &DataSource, is_new: bool) -> Result<(), DbError> {
        if is_new {
            self.insert(data_source).await
        } else {
            self.update(data_source).await
        }
    }
}

/// Rehydrates a `Model` from a raw driver row/document.
pub trait Restorer: Model {
    fn restore(row: crate::driver::Row) -> Result<Self, DbError>;
}
