/// An engine-neutral column type, mapped to a concrete engine type by
/// [`crate::Dialect::sql_type`]. Covers spec §4.1's closed abstract-type
/// enum (`string, char, text, integer, smallInteger, tinyInteger,
/// bigInteger, float, double, decimal, boolean, date, dateTime, timestamp,
/// time, year, json, binary, uuid, ulid, ipAddress, macAddress, point,
/// polygon, lineString, geometry, vector, enum, set, mediumText, longText`)
/// plus `Id`/`Jsonb`/`TimestampTz`/`Array` as Postgres-native supplements.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Id,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    Boolean,
    Char(u32),
    String(u32),
    Text,
    MediumText,
    LongText,
    Json,
    Jsonb,
    Uuid,
    /// A 26-character Crockford-base32 ULID, stored as `CHAR(26)`.
    Ulid,
    Date,
    /// A timestamp without time zone, distinct from `Timestamp`'s `WITH
    /// TIME ZONE` rendering.
    DateTime,
    Timestamp,
    TimestampTz,
    Time,
    /// A 4-digit calendar year.
    Year,
    Binary,
    IpAddress,
    MacAddress,
    Point,
    Polygon,
    LineString,
    Geometry,
    Array(Box<ColumnType>),
    /// A fixed-dimension embedding vector (`vector(n)` on Postgres/pgvector).
    Vector(u32),
    Enum(Vec<String>),
    Set(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OnDelete {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
}

impl Default for OnDelete {
    fn default() -> Self {
        Self::NoAction
    }
}

#[derive(Debug, Clone)]
pub struct ForeignKeyDefinition {
    pub columns: Vec<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
    pub on_delete: OnDelete,
    pub on_update: OnDelete,
}

/// A single column in a `Blueprint` table-definition DSL call.
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub default: Option<ColumnDefault>,
    pub comment: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            unique: false,
            primary_key: false,
            auto_increment: false,
            default: None,
            comment: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }
}

/// A column default. `CurrentTimestamp` is a sentinel the Postgres driver
/// renders as `NOW()` rather than a literal, per its migration-rendering
/// rules.
#[derive(Debug, Clone)]
pub enum ColumnDefault {
    CurrentTimestamp,
    Literal(crate::Value),
    Raw(String),
}
