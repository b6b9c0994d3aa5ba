/// The cardinality of a declared relation, used to auto-derive the
/// local/foreign join keys a join-relation method doesn't specify
/// explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
}

/// A declared relation between two tables/collections.
#[derive(Debug, Clone)]
pub struct RelationDefinition {
    pub name: String,
    pub kind: RelationKind,
    pub related_table: String,
    pub local_key: String,
    pub foreign_key: String,
    /// Only set for `BelongsToMany`: the join/pivot table and its two
    /// foreign-key columns.
    pub pivot: Option<PivotDefinition>,
}

#[derive(Debug, Clone)]
pub struct PivotDefinition {
    pub table: String,
    pub local_foreign_key: String,
    pub related_foreign_key: String,
}

impl RelationDefinition {
    /// Derives the join-key defaults a caller didn't specify explicitly:
    /// `belongsTo ⇒ localField = "<name>Id"`, `foreignField = "id"`;
    /// `hasOne`/`hasMany` ⇒ `localField = "id"`,
    /// `foreignField = singularize(rootTable)+"Id"`. `root_table` is the
    /// table the relation is declared *on* — only `hasOne`/`hasMany` need
    /// it, since their foreign key lives on the related table and is named
    /// after the owner, not the other way around.
    pub fn conventional(
        name: impl Into<String>,
        kind: RelationKind,
        related_table: impl Into<String>,
        root_table: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let related_table = related_table.into();
        let root_table = root_table.into();
        let (local_key, foreign_key) = match kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                ("id".to_string(), format!("{}Id", singular(&root_table)))
            }
            RelationKind::BelongsTo => (format!("{}Id", name), "id".to_string()),
            RelationKind::BelongsToMany => ("id".to_string(), "id".to_string()),
        };

        Self {
            name,
            kind,
            related_table,
            local_key,
            foreign_key,
            pivot: None,
        }
    }
}

/// Naive singularization (`posts` -> `post`) sufficient for default
/// foreign-key-name derivation; callers needing an irregular plural should
/// specify keys explicitly rather than rely on this heuristic.
fn singular(table: &str) -> String {
    table.strip_suffix('s').unwrap_or(table).to_string()
}
