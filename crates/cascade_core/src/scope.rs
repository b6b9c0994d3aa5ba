use std::sync::Arc;

use crate::QueryBuilder;

/// A reusable query constraint applied automatically (a "global" scope,
/// e.g. soft-delete filtering) or only when a caller opts in (a "local"
/// scope, e.g. `published()`).
///
/// Implemented as a plain closure-wrapping trait object rather than a
/// trait with an `apply` method per implementor, since scopes are almost
/// always one-liners defined inline alongside a `Model`.
pub trait Scope: Send + Sync {
    fn apply(&self, builder: &mut QueryBuilder);

    /// Where in the operation list this scope's constraints should be
    /// spliced. Global scopes default to `Before`, matching "applied
    /// before the caller's own where clauses" so an explicit caller clause
    /// still composes with, rather than overrides, the scope.
    fn placement(&self) -> ScopePlacement {
        ScopePlacement::Before
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePlacement {
    Before,
    After,
}

impl<F> Scope for F
where
    F: Fn(&mut QueryBuilder) + Send + Sync,
{
    fn apply(&self, builder: &mut QueryBuilder) {
        self(builder)
    }
}

/// A named scope, either registered as a `Model` global scope (spliced in
/// automatically, per its `placement()`, unless disabled for one call) or a
/// local scope a caller opts into with `.scope("name")`.
///
/// Wraps the scope in an `Arc` rather than a `Box` so that `QueryBuilder`,
/// which carries its pending global scopes by value, stays `Clone` without
/// needing `Scope: Clone` — `clone()` on a `NamedScope` only bumps a refcount.
#[derive(Clone)]
pub struct NamedScope {
    pub name: String,
    pub scope: Arc<dyn Scope>,
}

impl NamedScope {
    pub fn new(name: impl Into<String>, scope: impl Scope + 'static) -> Self {
        Self {
            name: name.into(),
            scope: Arc::new(scope),
        }
    }
}

impl std::fmt::Debug for NamedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedScope").field("name", &self.name).finish_non_exhaustive()
    }
}
